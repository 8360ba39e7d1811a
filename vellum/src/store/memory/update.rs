use crate::common::{Document, Value, DOC_ID};
use crate::errors::{CommandCode, StoreError, StoreResult};

/// Checks that `update` is a well-formed operator document.
pub(crate) fn validate_update(update: &Document) -> StoreResult<()> {
    if update.is_empty() {
        return Err(bad_value("Update document must not be empty"));
    }
    for (operator, argument) in update.iter() {
        if !operator.starts_with('$') {
            return Err(bad_value(&format!(
                "Invalid update document: field '{}' is not an update operator",
                operator
            )));
        }
        if argument.as_document().is_none() {
            return Err(bad_value(&format!(
                "Modifiers operate on fields but {} was given a {}",
                operator,
                argument.type_name()
            )));
        }
    }
    Ok(())
}

/// Checks that `replacement` is a plain document without update operators.
pub(crate) fn validate_replacement(replacement: &Document) -> StoreResult<()> {
    match replacement.keys().find(|key| key.starts_with('$')) {
        Some(key) => Err(bad_value(&format!(
            "Replacement document must not contain update operators, found '{}'",
            key
        ))),
        None => Ok(()),
    }
}

/// Builds the document that replaces `existing`, carrying its `_id` over.
pub(crate) fn replace(existing: &Document, mut replacement: Document) -> StoreResult<Document> {
    let existing_id = existing.id().cloned().unwrap_or_default();
    match replacement.id() {
        Some(id) if !id.loosely_equals(&existing_id) => Err(immutable_id()),
        Some(_) => Ok(replacement.with_id_first()),
        None => {
            replacement.put(DOC_ID, existing_id);
            Ok(replacement.with_id_first())
        }
    }
}

/// Applies an operator update in place and reports whether anything changed.
///
/// The document is only touched when every operator succeeds.
pub(crate) fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<bool> {
    validate_update(update)?;

    let mut working = doc.clone();
    let mut changed = false;
    for (operator, argument) in update.iter() {
        let Some(fields) = argument.as_document() else {
            continue;
        };
        for (path, value) in fields.iter() {
            guard_id(&working, operator, path, value)?;
            changed |= match operator.as_str() {
                "$set" => set(&mut working, path, value)?,
                "$unset" => working.remove_path(path).is_some(),
                "$inc" => increment(&mut working, path, value)?,
                "$push" => push(&mut working, path, value, false)?,
                "$addToSet" => push(&mut working, path, value, true)?,
                unknown => return Err(bad_value(&format!("Unknown modifier: {}", unknown))),
            };
        }
    }

    if changed {
        *doc = working;
    }
    Ok(changed)
}

fn guard_id(doc: &Document, operator: &str, path: &str, value: &Value) -> StoreResult<()> {
    let touches_id = path == DOC_ID || path.starts_with("_id.");
    if !touches_id {
        return Ok(());
    }
    let unchanged = operator == "$set" && doc.get_path(path).is_some_and(|v| v.loosely_equals(value));
    if unchanged {
        Ok(())
    } else {
        Err(immutable_id())
    }
}

fn set(doc: &mut Document, path: &str, value: &Value) -> StoreResult<bool> {
    if doc.get_path(path).is_some_and(|current| current == value) {
        return Ok(false);
    }
    doc.set_path(path, value.clone())?;
    Ok(true)
}

fn increment(doc: &mut Document, path: &str, amount: &Value) -> StoreResult<bool> {
    if !amount.is_number() {
        return Err(bad_value(&format!("Cannot increment with non-numeric argument: {}", amount)));
    }
    let next = match doc.get_path(path) {
        None => amount.clone(),
        Some(Value::Int(current)) => match amount {
            Value::Int(delta) => current
                .checked_add(*delta)
                .map(Value::Int)
                .unwrap_or(Value::Double(*current as f64 + *delta as f64)),
            _ => Value::Double(*current as f64 + amount.as_f64().unwrap_or_default()),
        },
        Some(Value::Double(current)) => Value::Double(current + amount.as_f64().unwrap_or_default()),
        Some(other) => {
            return Err(bad_value(&format!(
                "Cannot apply $inc to a value of non-numeric type {}",
                other.type_name()
            )))
        }
    };
    doc.set_path(path, next)?;
    Ok(amount.as_f64() != Some(0.0))
}

fn push(doc: &mut Document, path: &str, argument: &Value, unique: bool) -> StoreResult<bool> {
    let values = each_values(argument)?;
    if doc.get_path(path).is_none() {
        doc.set_path(path, Value::Array(Vec::new()))?;
    }

    let operator = if unique { "$addToSet" } else { "$push" };
    let target = doc
        .get_path_mut(path)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| bad_value(&format!("Cannot apply {} to a non-array field '{}'", operator, path)))?;

    let mut changed = false;
    for value in values {
        if unique && target.iter().any(|existing| existing.loosely_equals(&value)) {
            continue;
        }
        target.push(value);
        changed = true;
    }
    Ok(changed)
}

fn each_values(argument: &Value) -> StoreResult<Vec<Value>> {
    match argument.as_document().and_then(|doc| doc.get("$each")) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(bad_value(&format!(
            "The argument to $each must be an array but was {}",
            other.type_name()
        ))),
        None => Ok(vec![argument.clone()]),
    }
}

fn immutable_id() -> StoreError {
    log::error!("Attempt to modify the immutable field '_id'");
    StoreError::command(
        "Performing an update on the path '_id' would modify the immutable field '_id'",
        CommandCode::ImmutableField,
    )
}

fn bad_value(message: &str) -> StoreError {
    log::error!("Invalid update: {}", message);
    StoreError::command(message, CommandCode::BadValue)
}
