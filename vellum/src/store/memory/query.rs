use crate::common::{Document, Value, FIELD_SEPARATOR};
use crate::errors::{CommandCode, StoreError, StoreResult};
use regex::RegexBuilder;
use smallvec::SmallVec;
use std::cmp::Ordering;

type Candidates<'a> = SmallVec<[&'a Value; 4]>;

/// Evaluates a filter in the native query dialect against a document.
///
/// Supported: implicit equality, dotted paths, array-element equality,
/// `$eq $ne $gt $gte $lt $lte $in $nin $exists $regex` and `$and $or $nor`.
/// Anything else is rejected as a bad value.
pub(crate) fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter.iter() {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(doc, key, condition)?,
            "$nor" => !any_clause(doc, key, condition)?,
            operator if operator.starts_with('$') => {
                return Err(bad_value(&format!("unknown top level operator: {}", operator)))
            }
            path => matches_field(doc, path, condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Checks every clause and operator of a filter without evaluating it, so
/// a malformed filter is rejected whatever the collection holds.
pub(crate) fn validate(filter: &Document) -> StoreResult<()> {
    for (key, condition) in filter.iter() {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                for clause in clauses(key, condition)? {
                    validate(clause)?;
                }
            }
            operator if operator.starts_with('$') => {
                return Err(bad_value(&format!("unknown top level operator: {}", operator)))
            }
            _ => validate_condition(condition)?,
        }
    }
    Ok(())
}

fn validate_condition(condition: &Value) -> StoreResult<()> {
    let Value::Document(operators) = condition else {
        return Ok(());
    };
    if !is_operator_document(operators) {
        return Ok(());
    }
    let none = Candidates::new();
    for (operator, argument) in operators.iter() {
        if operator != "$options" {
            apply_operator(operator, argument, &none, operators)?;
        }
    }
    Ok(())
}

fn any_clause(doc: &Document, key: &str, condition: &Value) -> StoreResult<bool> {
    for clause in clauses(key, condition)? {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn clauses<'a>(key: &str, condition: &'a Value) -> StoreResult<Vec<&'a Document>> {
    let items = condition
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| bad_value(&format!("{} must be a nonempty array", key)))?;
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| bad_value(&format!("{} argument's entries must be objects", key)))
        })
        .collect()
}

fn matches_field(doc: &Document, path: &str, condition: &Value) -> StoreResult<bool> {
    let fields: SmallVec<[&str; 8]> = path.split(FIELD_SEPARATOR).collect();
    let mut candidates = Candidates::new();
    if let Some((first, rest)) = fields.split_first() {
        if let Some(value) = doc.get(first) {
            collect_values(value, rest, &mut candidates);
        }
    }

    match condition {
        Value::Document(operators) if is_operator_document(operators) => {
            for (operator, argument) in operators.iter() {
                if operator == "$options" {
                    continue;
                }
                if !apply_operator(operator, argument, &candidates, operators)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        expected => Ok(equals_any(&candidates, expected)),
    }
}

/// Collects every value reachable at `fields`, fanning out over arrays of
/// documents the way the store does.
fn collect_values<'a>(value: &'a Value, fields: &[&str], out: &mut Candidates<'a>) {
    let Some((field, rest)) = fields.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Document(doc) => {
            if let Some(next) = doc.get(field) {
                collect_values(next, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = field.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    collect_values(next, rest, out);
                }
            }
            for item in items.iter().filter(|item| item.as_document().is_some()) {
                collect_values(item, fields, out);
            }
        }
        _ => {}
    }
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn apply_operator(
    operator: &str,
    argument: &Value,
    candidates: &Candidates<'_>,
    siblings: &Document,
) -> StoreResult<bool> {
    match operator {
        "$eq" => Ok(equals_any(candidates, argument)),
        "$ne" => Ok(!equals_any(candidates, argument)),
        "$gt" => Ok(compares_any(candidates, argument, |o| o == Ordering::Greater)),
        "$gte" => Ok(compares_any(candidates, argument, |o| o != Ordering::Less)),
        "$lt" => Ok(compares_any(candidates, argument, |o| o == Ordering::Less)),
        "$lte" => Ok(compares_any(candidates, argument, |o| o != Ordering::Greater)),
        "$in" => in_any(candidates, argument),
        "$nin" => in_any(candidates, argument).map(|found| !found),
        "$exists" => {
            let wanted = match argument {
                Value::Bool(b) => *b,
                other => other.as_f64().map(|n| n != 0.0).unwrap_or(!other.is_null()),
            };
            Ok(candidates.is_empty() != wanted)
        }
        "$regex" => regex_any(candidates, argument, siblings.get("$options")),
        unknown => Err(bad_value(&format!("unknown operator: {}", unknown))),
    }
}

fn flatten<'a, 'b>(candidates: &'b Candidates<'a>) -> impl Iterator<Item = &'a Value> + 'b {
    candidates.iter().flat_map(|value| {
        let value: &'a Value = *value;
        let elements = value.as_array().map(|items| items.iter());
        std::iter::once(value).chain(elements.into_iter().flatten())
    })
}

fn equals_any(candidates: &Candidates<'_>, expected: &Value) -> bool {
    if expected.is_null() && candidates.is_empty() {
        return true;
    }
    flatten(candidates).any(|value| value.loosely_equals(expected))
}

fn compares_any(candidates: &Candidates<'_>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    flatten(candidates).any(|value| value.compare(bound).is_some_and(&accept))
}

fn in_any(candidates: &Candidates<'_>, argument: &Value) -> StoreResult<bool> {
    let options = argument
        .as_array()
        .ok_or_else(|| bad_value("$in/$nin needs an array"))?;
    Ok(options.iter().any(|option| equals_any(candidates, option)))
}

fn regex_any(candidates: &Candidates<'_>, pattern: &Value, options: Option<&Value>) -> StoreResult<bool> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| bad_value("$regex has to be a string"))?;
    let flags = options.and_then(|o| o.as_str()).unwrap_or("");
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| bad_value(&format!("invalid regular expression: {}", e)))?;
    Ok(flatten(candidates)
        .filter_map(|value| value.as_str())
        .any(|text| regex.is_match(text)))
}

fn bad_value(message: &str) -> StoreError {
    log::error!("Invalid filter: {}", message);
    StoreError::command(message, CommandCode::BadValue)
}
