use crate::common::{Value, DOC_ID, FIELD_SEPARATOR};
use crate::errors::{CommandCode, ErrorKind, StoreError, StoreResult};
use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};

type FieldVec<'a> = SmallVec<[&'a str; 8]>;

/// A schema-less record: an insertion-ordered mapping from field names to
/// [Value]s, identified within its collection by `_id`.
///
/// Nested fields are addressed with dotted paths such as `"meta.id"`; a
/// numeric segment indexes into an array (`"objects.0"`).
///
/// ```rust,ignore
/// use vellum::doc;
///
/// let doc = doc!{ "_id": "x", meta: { id: "e1" }, objects: ["a", "b"] };
/// assert_eq!(doc.get_path("meta.id").and_then(|v| v.as_str()), Some("e1"));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    data: IndexMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document {
            data: IndexMap::new(),
        }
    }

    /// Parses a JSON object into a document.
    ///
    /// Anything other than a well-formed JSON object is bad input.
    pub fn parse(input: &str) -> StoreResult<Document> {
        let json: serde_json::Value = serde_json::from_str(input)?;
        Document::from_json_value(json)
    }

    pub fn from_json_value(json: serde_json::Value) -> StoreResult<Document> {
        match json {
            serde_json::Value::Object(map) => Document::from_json_map(map),
            other => {
                log::error!("Expected a JSON object but found {}", other);
                Err(StoreError::new(
                    &format!("Expected a JSON object but found {}", other),
                    ErrorKind::BadInputError,
                ))
            }
        }
    }

    pub(crate) fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> StoreResult<Document> {
        let mut data = IndexMap::with_capacity(map.len());
        for (key, value) in map {
            data.insert(key, Value::from_json_value(value)?);
        }
        Ok(Document { data })
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        let map = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json_value()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// Compact JSON rendering of this document.
    pub fn to_json(&self) -> String {
        self.to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Inserts or replaces a top-level field, keeping its original position
    /// when it already exists.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.data.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    pub fn id(&self) -> Option<&Value> {
        self.data.get(DOC_ID)
    }

    pub fn has_id(&self) -> bool {
        self.data.contains_key(DOC_ID)
    }

    /// Moves `_id` to the front, where the store keeps it.
    pub(crate) fn with_id_first(mut self) -> Self {
        if let Some(index) = self.data.get_index_of(DOC_ID) {
            self.data.move_index(index, 0);
        }
        self
    }

    /// Resolves a dotted path, descending into nested documents and arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let fields = split_path(path);
        let (first, rest) = fields.split_first()?;
        let mut current = self.data.get(*first)?;
        for field in rest {
            current = match current {
                Value::Document(doc) => doc.data.get(*field)?,
                Value::Array(items) => items.get(field.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets a dotted path, creating intermediate documents as needed.
    ///
    /// Fails when the path runs through a scalar or past the end of an array.
    pub fn set_path(&mut self, path: &str, value: Value) -> StoreResult<()> {
        let fields = split_path(path);
        let Some((last, parents)) = fields.split_last() else {
            return Err(invalid_path(path));
        };

        let mut current = self;
        for field in parents {
            let slot = current
                .data
                .entry(field.to_string())
                .or_insert_with(|| Value::Document(Document::new()));
            current = match slot {
                Value::Document(doc) => doc,
                _ => return Err(invalid_path(path)),
            };
        }
        current.data.insert(last.to_string(), value);
        Ok(())
    }

    /// Mutable access to the value at a dotted path, if it exists.
    pub fn get_path_mut(&mut self, path: &str) -> Option<&mut Value> {
        let fields = split_path(path);
        let (first, rest) = fields.split_first()?;
        let mut current = self.data.get_mut(*first)?;
        for field in rest {
            current = match current {
                Value::Document(doc) => doc.data.get_mut(*field)?,
                Value::Array(items) => items.get_mut(field.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Removes the value at a dotted path. Missing paths are a no-op.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        match path.rsplit_once(FIELD_SEPARATOR) {
            None => self.remove(path),
            Some((parent, last)) => match self.get_path_mut(parent)? {
                Value::Document(doc) => doc.remove(last),
                _ => None,
            },
        }
    }

    /// Field-by-field equality using [Value::loosely_equals].
    pub fn loosely_equals(&self, other: &Document) -> bool {
        self.data.len() == other.data.len()
            && self
                .data
                .iter()
                .all(|(k, v)| other.data.get(k).is_some_and(|o| v.loosely_equals(o)))
    }
}

fn split_path(path: &str) -> FieldVec<'_> {
    path.split(FIELD_SEPARATOR).collect()
}

fn invalid_path(path: &str) -> StoreError {
    log::error!("Cannot create field at path {}", path);
    StoreError::command(
        &format!("Cannot create field at path '{}'", path),
        CommandCode::BadValue,
    )
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => Err(std::fmt::Error),
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.data.len()))?;
        for (key, value) in &self.data {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Document::from_json_value(json).map_err(de::Error::custom)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

/// Strips the quotes `stringify!` leaves around string-literal keys.
pub fn normalize(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Builds a [Document] from key/value pairs.
///
/// Keys may be bare identifiers or string literals; values may be any
/// expression convertible into a [Value], a nested `{ .. }` document or a
/// `[ .. ]` array.
///
/// ```rust,ignore
/// let lock = doc!{ "_id": "x", lock: "A" };
/// let nested = doc!{ meta: { id: "e1", tags: ["a", "b"] }, count: (1 + 2) };
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::common::Document::new()
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            let mut doc = $crate::common::Document::new();
            $(
                doc.put($crate::common::normalize(stringify!($key)), $crate::doc_value!($value));
            )*
            doc
        }
    };
}

/// Helper macro converting values for [doc!].
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_up() -> Document {
        doc! {
            "_id": "agg-1",
            location: {
                city: "New York",
                address: { zip: 10001 },
            },
            objects: ["e1", "e2"],
            score: 1034,
        }
    }

    #[test]
    fn parse_keeps_insertion_order() {
        let doc = Document::parse(r#"{"b":1,"a":2,"_id":"x"}"#).unwrap();
        let keys: Vec<_> = doc.keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a", "_id"]);
        assert_eq!(doc.to_json(), r#"{"b":1,"a":2,"_id":"x"}"#);
    }

    #[test]
    fn nested_documents_keep_their_order() {
        let input = r#"{"_id":"agg","status":"PASSED","name":"tc1","meta":{"z":1,"y":[{"d":1,"c":2}]}}"#;
        let doc = Document::parse(input).unwrap();
        assert_eq!(doc.to_json(), input);
        assert_eq!(serde_json::to_string(&doc.to_json_value()).unwrap(), input);
    }

    #[test]
    fn parse_rejects_non_objects() {
        assert_eq!(Document::parse("[1,2]").unwrap_err().kind(), &ErrorKind::BadInputError);
        assert_eq!(Document::parse("{\"a\":").unwrap_err().kind(), &ErrorKind::BadInputError);
    }

    #[test]
    fn get_path_descends_documents_and_arrays() {
        let doc = set_up();
        assert_eq!(doc.get_path("location.city"), Some(&Value::from("New York")));
        assert_eq!(doc.get_path("location.address.zip"), Some(&Value::Int(10001)));
        assert_eq!(doc.get_path("objects.1"), Some(&Value::from("e2")));
        assert_eq!(doc.get_path("objects.7"), None);
        assert_eq!(doc.get_path("score.value"), None);
    }

    #[test]
    fn set_path_creates_intermediate_documents() {
        let mut doc = Document::new();
        doc.set_path("meta.source.host", Value::from("h1")).unwrap();
        assert_eq!(doc.to_json(), r#"{"meta":{"source":{"host":"h1"}}}"#);
    }

    #[test]
    fn set_path_through_scalar_fails() {
        let mut doc = set_up();
        let err = doc.set_path("score.value", Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::BadInputError);
    }

    #[test]
    fn remove_path_removes_nested_field() {
        let mut doc = set_up();
        assert_eq!(doc.remove_path("location.city"), Some(Value::from("New York")));
        assert!(doc.get_path("location.city").is_none());
        assert!(doc.remove_path("location.missing").is_none());
        assert!(doc.remove_path("nothing.here").is_none());
    }

    #[test]
    fn with_id_first_moves_identifier() {
        let doc = doc! { a: 1, "_id": "x" }.with_id_first();
        assert_eq!(doc.to_json(), r#"{"_id":"x","a":1}"#);
    }

    #[test]
    fn deserialize_through_serde() {
        let doc: Document = serde_json::from_str(r#"{"t":{"$date":"2024-01-01T00:00:00Z"}}"#).unwrap();
        assert!(doc.get("t").and_then(|v| v.as_date_time()).is_some());
    }

    #[test]
    fn loosely_equals_ignores_number_representation() {
        let a = doc! { n: 1, s: "x" };
        let b = Document::parse(r#"{"s":"x","n":1.0}"#).unwrap();
        assert!(a.loosely_equals(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn macro_supports_expressions() {
        let base = 100;
        let doc = doc! { score: (base * 2), flag: true };
        assert_eq!(doc.get("score"), Some(&Value::Int(200)));
        assert_eq!(doc.get("flag"), Some(&Value::Bool(true)));
    }
}
