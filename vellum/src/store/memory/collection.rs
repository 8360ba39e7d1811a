use super::catalog::Catalog;
use super::server::Session;
use super::{query, update};
use crate::common::{Document, Value, DOC_ID, ID_INDEX_NAME, INDEX_NAME_KEY};
use crate::doc;
use crate::errors::{CommandCode, StoreError, StoreResult};
use crate::store::{CollectionProvider, DeleteResult, IndexModel, UpdateResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    name: String,
    field: String,
    expire_after: Option<Duration>,
}

impl IndexEntry {
    fn from_model(model: &IndexModel) -> Self {
        IndexEntry {
            name: model.name(),
            field: model.field().to_string(),
            expire_after: model.options().expire_after,
        }
    }

    fn describe(&self) -> Document {
        let mut key = Document::new();
        key.put(self.field.clone(), 1);

        let mut description = doc! { v: 2 };
        description.put("key", key);
        description.put(INDEX_NAME_KEY, self.name.clone());
        if let Some(expire_after) = self.expire_after {
            description.put("expireAfterSeconds", expire_after.as_secs() as i64);
        }
        description
    }
}

/// Documents and indexes of one collection.
///
/// Every write holds the document lock for its whole read-modify-write, which
/// is what makes the single-document commands atomic.
pub(crate) struct CollectionState {
    database: String,
    name: String,
    documents: RwLock<Vec<Document>>,
    indexes: RwLock<Vec<IndexEntry>>,
}

impl CollectionState {
    pub(crate) fn new(database: &str, name: &str) -> Self {
        CollectionState {
            database: database.to_string(),
            name: name.to_string(),
            documents: RwLock::new(Vec::new()),
            indexes: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.documents.read().len()
    }

    fn insert(&self, document: Document) -> StoreResult<Value> {
        if let Some(key) = document.keys().find(|key| key.starts_with('$')) {
            log::error!("Rejected document with operator field {} in {}", key, self.namespace());
            return Err(StoreError::command(
                &format!("Document can't have $ prefixed field names: {}", key),
                CommandCode::BadValue,
            ));
        }

        let mut document = document;
        if !document.has_id() {
            document.put(DOC_ID, Uuid::new_v4().to_string());
        }
        let document = document.with_id_first();
        let id = document.id().cloned().unwrap_or_default();

        let mut documents = self.documents.write();
        let duplicate = documents
            .iter()
            .any(|existing| existing.id().is_some_and(|existing_id| existing_id.loosely_equals(&id)));
        if duplicate {
            log::error!("Duplicate _id {} in {}", id, self.namespace());
            return Err(StoreError::command(
                &format!(
                    "E11000 duplicate key error collection: {} index: {} dup key: {{ _id: {} }}",
                    self.namespace(),
                    ID_INDEX_NAME,
                    id
                ),
                CommandCode::DuplicateKey,
            ));
        }
        documents.push(document);
        Ok(id)
    }

    fn find(&self, filter: &Document) -> StoreResult<Vec<Document>> {
        query::validate(filter)?;
        let documents = self.documents.read();
        let mut found = Vec::new();
        for document in documents.iter() {
            if query::matches(document, filter)? {
                found.push(document.clone());
            }
        }
        Ok(found)
    }

    fn find_first(&self, filter: &Document) -> StoreResult<Option<Document>> {
        query::validate(filter)?;
        let documents = self.documents.read();
        Ok(first_match(&documents, filter)?.map(|position| documents[position].clone()))
    }

    fn replace_one(&self, filter: &Document, replacement: Document) -> StoreResult<UpdateResult> {
        query::validate(filter)?;
        update::validate_replacement(&replacement)?;

        let mut documents = self.documents.write();
        let Some(position) = first_match(&documents, filter)? else {
            return Ok(UpdateResult::acknowledged(0, 0));
        };
        let replaced = update::replace(&documents[position], replacement)?;
        let modified = replaced != documents[position];
        documents[position] = replaced;
        Ok(UpdateResult::acknowledged(1, modified as u64))
    }

    fn update_one(&self, filter: &Document, update: &Document) -> StoreResult<UpdateResult> {
        self.modify_first(filter, update)
            .map(|outcome| match outcome {
                Some((_, changed)) => UpdateResult::acknowledged(1, changed as u64),
                None => UpdateResult::acknowledged(0, 0),
            })
    }

    fn find_one_and_update(&self, filter: &Document, update: &Document) -> StoreResult<Option<Document>> {
        self.modify_first(filter, update)
            .map(|outcome| outcome.map(|(before, _)| before))
    }

    /// Applies `update` to the first match and returns its pre-image and
    /// whether it changed.
    fn modify_first(&self, filter: &Document, update: &Document) -> StoreResult<Option<(Document, bool)>> {
        query::validate(filter)?;
        update::validate_update(update)?;

        let mut documents = self.documents.write();
        let Some(position) = first_match(&documents, filter)? else {
            return Ok(None);
        };
        let before = documents[position].clone();
        let changed = update::apply_update(&mut documents[position], update)?;
        Ok(Some((before, changed)))
    }

    fn delete_many(&self, filter: &Document) -> StoreResult<DeleteResult> {
        query::validate(filter)?;

        let mut documents = self.documents.write();
        let mut keep = Vec::with_capacity(documents.len());
        for document in documents.iter() {
            keep.push(!query::matches(document, filter)?);
        }

        let before = documents.len();
        let mut flags = keep.into_iter();
        documents.retain(|_| flags.next().unwrap_or(true));
        Ok(DeleteResult::acknowledged((before - documents.len()) as u64))
    }

    fn list_indexes(&self) -> Vec<Document> {
        let id_index = IndexEntry {
            name: ID_INDEX_NAME.to_string(),
            field: DOC_ID.to_string(),
            expire_after: None,
        };
        std::iter::once(&id_index)
            .chain(self.indexes.read().iter())
            .map(IndexEntry::describe)
            .collect()
    }

    fn create_index(&self, model: &IndexModel) -> StoreResult<String> {
        let requested = IndexEntry::from_model(model);
        if requested.field == DOC_ID && requested.expire_after.is_none() {
            return Ok(ID_INDEX_NAME.to_string());
        }

        let mut indexes = self.indexes.write();
        if let Some(existing) = indexes
            .iter()
            .find(|index| index.name == requested.name || index.field == requested.field)
        {
            if *existing == requested {
                return Ok(requested.name);
            }
            log::error!(
                "Index {} on {} conflicts with existing index {}",
                requested.name,
                self.namespace(),
                existing.name
            );
            let message = if existing.name == requested.name {
                format!(
                    "An existing index has the same name as the requested index. \
                     When index names are not specified, they are auto generated and can cause conflicts. \
                     Requested index: {}, existing index: {}",
                    requested.describe(),
                    existing.describe()
                )
            } else {
                format!(
                    "Index already exists with a different name: {}",
                    existing.name
                )
            };
            return Err(StoreError::command(&message, CommandCode::IndexOptionsConflict));
        }

        log::debug!("Created index {} on {}", requested.name, self.namespace());
        let name = requested.name.clone();
        indexes.push(requested);
        Ok(name)
    }

    fn drop_index(&self, name: &str) -> StoreResult<()> {
        if name == ID_INDEX_NAME {
            log::error!("Refused to drop the _id index of {}", self.namespace());
            return Err(StoreError::command(
                "cannot drop _id index",
                CommandCode::BadValue,
            ));
        }

        let mut indexes = self.indexes.write();
        match indexes.iter().position(|index| index.name == name) {
            Some(position) => {
                indexes.remove(position);
                log::debug!("Dropped index {} on {}", name, self.namespace());
                Ok(())
            }
            None => {
                log::error!("Index {} not found on {}", name, self.namespace());
                Err(StoreError::command(
                    &format!("index not found with name [{}]", name),
                    CommandCode::IndexNotFound,
                ))
            }
        }
    }

    /// Removes documents past the TTL of any expiring index.
    pub(crate) fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let expiring: Vec<(String, Duration)> = self
            .indexes
            .read()
            .iter()
            .filter_map(|index| index.expire_after.map(|after| (index.field.clone(), after)))
            .collect();
        if expiring.is_empty() {
            return 0;
        }

        let mut documents = self.documents.write();
        let before = documents.len();
        documents.retain(|document| {
            !expiring
                .iter()
                .any(|(field, after)| is_expired(document, field, *after, now))
        });

        let purged = before - documents.len();
        if purged > 0 {
            log::debug!("Expired {} documents from {}", purged, self.namespace());
        }
        purged
    }
}

/// A document expires once its earliest date in `field` is `after` in the
/// past. Documents without a date there never expire.
fn is_expired(document: &Document, field: &str, after: Duration, now: DateTime<Utc>) -> bool {
    let earliest = match document.get_path(field) {
        Some(Value::DateTime(date)) => Some(*date),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_date_time).min().copied(),
        _ => None,
    };
    match (earliest, chrono::Duration::from_std(after)) {
        (Some(date), Ok(after)) => date + after <= now,
        _ => false,
    }
}

fn first_match(documents: &[Document], filter: &Document) -> StoreResult<Option<usize>> {
    for (position, document) in documents.iter().enumerate() {
        if query::matches(document, filter)? {
            return Ok(Some(position));
        }
    }
    Ok(None)
}

/// Collection handle bound to one client session.
///
/// The collection is resolved on every command so that a handle stays valid
/// across drops: reads of a dropped collection see nothing and writes
/// recreate it.
pub(crate) struct MemoryCollection {
    catalog: Arc<Catalog>,
    session: Arc<Session>,
    database: String,
    name: String,
}

impl MemoryCollection {
    pub(crate) fn new(catalog: Arc<Catalog>, session: Arc<Session>, database: &str, name: &str) -> Self {
        MemoryCollection {
            catalog,
            session,
            database: database.to_string(),
            name: name.to_string(),
        }
    }

    fn existing(&self) -> StoreResult<Option<Arc<CollectionState>>> {
        self.session.check()?;
        Ok(self.catalog.get(&self.database, &self.name))
    }

    fn writable(&self) -> StoreResult<Arc<CollectionState>> {
        self.session.check()?;
        Ok(self.catalog.get_or_create(&self.database, &self.name))
    }

    fn namespace_not_found(&self) -> StoreError {
        log::error!("Namespace {} not found", self.namespace());
        StoreError::command(
            &format!("ns does not exist: {}", self.namespace()),
            CommandCode::NamespaceNotFound,
        )
    }
}

impl CollectionProvider for MemoryCollection {
    fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    fn insert_one(&self, document: Document) -> StoreResult<Value> {
        self.writable()?.insert(document)
    }

    fn find(&self, filter: &Document) -> StoreResult<Vec<Document>> {
        match self.existing()? {
            Some(state) => state.find(filter),
            None => query::validate(filter).map(|_| Vec::new()),
        }
    }

    fn find_first(&self, filter: &Document) -> StoreResult<Option<Document>> {
        match self.existing()? {
            Some(state) => state.find_first(filter),
            None => query::validate(filter).map(|_| None),
        }
    }

    fn replace_one(&self, filter: &Document, replacement: Document) -> StoreResult<UpdateResult> {
        self.writable()?.replace_one(filter, replacement)
    }

    fn update_one(&self, filter: &Document, update: &Document) -> StoreResult<UpdateResult> {
        self.writable()?.update_one(filter, update)
    }

    fn find_one_and_update(&self, filter: &Document, update: &Document) -> StoreResult<Option<Document>> {
        self.writable()?.find_one_and_update(filter, update)
    }

    fn delete_many(&self, filter: &Document) -> StoreResult<DeleteResult> {
        match self.existing()? {
            Some(state) => state.delete_many(filter),
            None => query::validate(filter).map(|_| DeleteResult::acknowledged(0)),
        }
    }

    fn list_indexes(&self) -> StoreResult<Vec<Document>> {
        match self.existing()? {
            Some(state) => Ok(state.list_indexes()),
            None => Err(self.namespace_not_found()),
        }
    }

    fn create_index(&self, model: &IndexModel) -> StoreResult<String> {
        self.writable()?.create_index(model)
    }

    fn drop_index(&self, name: &str) -> StoreResult<()> {
        match self.existing()? {
            Some(state) => state.drop_index(name),
            None => Err(self.namespace_not_found()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use chrono::TimeZone;

    fn state() -> CollectionState {
        CollectionState::new("db", "events")
    }

    #[test]
    fn insert_assigns_id_first() {
        let state = state();
        let id = state.insert(doc! { name: "a" }).unwrap();
        assert!(Uuid::parse_str(id.as_str().unwrap()).is_ok());

        let stored = state.find(&Document::new()).unwrap();
        assert_eq!(stored[0].keys().next().map(String::as_str), Some(DOC_ID));
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let state = state();
        state.insert(doc! { "_id": "x" }).unwrap();
        let err = state.insert(doc! { "_id": "x", other: 1 }).unwrap_err();
        assert_eq!(err.code(), Some(CommandCode::DuplicateKey));
        assert!(err.message().starts_with("E11000 duplicate key error collection: db.events"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn insert_rejects_operator_fields() {
        let err = state().insert(Document::parse(r#"{"$set":{"a":1}}"#).unwrap()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::BadInputError);
    }

    #[test]
    fn update_one_reports_match_and_modification() {
        let state = state();
        state.insert(doc! { "_id": "x", lock: "A" }).unwrap();

        let set_b = Document::parse(r#"{"$set":{"lock":"B"}}"#).unwrap();
        let result = state.update_one(&doc! { "_id": "x", lock: "A" }, &set_b).unwrap();
        assert_eq!(result, UpdateResult::acknowledged(1, 1));

        let result = state.update_one(&doc! { "_id": "x", lock: "A" }, &set_b).unwrap();
        assert_eq!(result, UpdateResult::acknowledged(0, 0));
        assert!(!result.is_applied());
    }

    #[test]
    fn find_one_and_update_returns_pre_image() {
        let state = state();
        state.insert(doc! { "_id": "x", lock: "A" }).unwrap();

        let before = state
            .find_one_and_update(&doc! { "_id": "x" }, &Document::parse(r#"{"$unset":{"lock":""}}"#).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(before.get("lock"), Some(&Value::from("A")));
        assert_eq!(state.find_first(&doc! { "_id": "x" }).unwrap(), Some(doc! { "_id": "x" }));
    }

    #[test]
    fn replace_one_keeps_id() {
        let state = state();
        state.insert(doc! { "_id": "x", lock: "A" }).unwrap();

        let result = state.replace_one(&doc! { lock: "A" }, doc! { state: "free" }).unwrap();
        assert!(result.is_applied());
        assert_eq!(state.find(&Document::new()).unwrap(), vec![doc! { "_id": "x", state: "free" }]);
    }

    #[test]
    fn delete_many_removes_all_matches() {
        let state = state();
        state.insert(doc! { kind: "a" }).unwrap();
        state.insert(doc! { kind: "b" }).unwrap();
        state.insert(doc! { kind: "a" }).unwrap();

        assert_eq!(state.delete_many(&doc! { kind: "a" }).unwrap().deleted_count, 2);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn malformed_filter_is_bad_input() {
        let state = state();
        let filter = Document::parse(r#"{"a":{"$bogus":1}}"#).unwrap();
        assert_eq!(state.find(&filter).unwrap_err().kind(), &ErrorKind::BadInputError);
    }

    #[test]
    fn index_lifecycle() {
        let state = state();
        let model = IndexModel::ascending("Time").expire_after(Duration::from_secs(60));
        assert_eq!(state.create_index(&model).unwrap(), "Time_1");
        assert_eq!(state.create_index(&model).unwrap(), "Time_1");

        let indexes = state.list_indexes();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].get("name"), Some(&Value::from("_id_")));
        assert_eq!(indexes[1].get("expireAfterSeconds"), Some(&Value::Int(60)));

        let changed = IndexModel::ascending("Time").expire_after(Duration::from_secs(120));
        let err = state.create_index(&changed).unwrap_err();
        assert_eq!(err.code(), Some(CommandCode::IndexOptionsConflict));

        state.drop_index("Time_1").unwrap();
        assert_eq!(state.create_index(&changed).unwrap(), "Time_1");
    }

    #[test]
    fn drop_index_errors() {
        let state = state();
        assert_eq!(state.drop_index("_id_").unwrap_err().code(), Some(CommandCode::BadValue));

        let err = state.drop_index("Time_1").unwrap_err();
        assert_eq!(err.code(), Some(CommandCode::IndexNotFound));
        assert_eq!(err.message(), "index not found with name [Time_1]");
    }

    #[test]
    fn purge_removes_only_expired_dates() {
        let state = state();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        state.insert(doc! { "_id": "old", "Time": (now - chrono::Duration::seconds(120)) }).unwrap();
        state.insert(doc! { "_id": "new", "Time": (now - chrono::Duration::seconds(10)) }).unwrap();
        state.insert(doc! { "_id": "text", "Time": "yesterday" }).unwrap();

        assert_eq!(state.purge_expired(now), 0);

        let model = IndexModel::ascending("Time").expire_after(Duration::from_secs(60));
        state.create_index(&model).unwrap();
        assert_eq!(state.purge_expired(now), 1);

        let ids: Vec<String> = state
            .find(&Document::new())
            .unwrap()
            .iter()
            .filter_map(|doc| doc.id().map(Value::to_plain_string))
            .collect();
        assert_eq!(ids, vec!["new", "text"]);
    }
}
