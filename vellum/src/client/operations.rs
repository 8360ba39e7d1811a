use crate::client::CollectionAccessor;
use crate::common::{elapsed_millis, Document, Value};
use crate::errors::StoreResult;
use chrono::Utc;
use std::time::Instant;

/// Document commands over collections resolved through a [CollectionAccessor].
///
/// Best-effort commands (insert, find, update, delete, add-to-set, exists)
/// never fail: errors are logged and turned into an empty or false result.
/// [DocumentOperations::find_and_modify] and the destructive drops propagate
/// their errors.
#[derive(Clone)]
pub struct DocumentOperations {
    accessor: CollectionAccessor,
    timestamp_field: String,
}

impl DocumentOperations {
    pub fn new(accessor: CollectionAccessor, timestamp_field: &str) -> Self {
        DocumentOperations {
            accessor,
            timestamp_field: timestamp_field.to_string(),
        }
    }

    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    pub(crate) fn set_timestamp_field(&mut self, field: &str) {
        self.timestamp_field = field.to_string();
    }

    pub fn insert(&self, database: &str, collection: &str, input: &str) {
        let inserted = Document::parse(input).and_then(|document| self.try_insert(database, collection, document));
        if let Err(e) = inserted {
            log::error!(
                "Failed to insert Object: {} in collection: {} and database {}. {}",
                input,
                collection,
                database,
                e
            );
        }
    }

    pub fn insert_raw(&self, database: &str, collection: &str, document: Document) {
        let description = document.to_json();
        if let Err(e) = self.try_insert(database, collection, document) {
            log::error!(
                "Failed to insert Object: {} in collection: {} and database {}. {}",
                description,
                collection,
                database,
                e
            );
        }
    }

    fn try_insert(&self, database: &str, collection: &str, document: Document) -> StoreResult<()> {
        let start = Instant::now();
        let handle = self.accessor.ensure_collection(database, collection)?;
        let id = handle.insert_one(document)?;
        log::debug!("#### Response time to insert the document in ms: {}", elapsed_millis(start));
        log::debug!(
            "Document {} was inserted successfully in collection: {} and database {}.",
            id,
            collection,
            database
        );
        Ok(())
    }

    /// Every document of the collection, serialized.
    pub fn find_all(&self, database: &str, collection: &str) -> Vec<String> {
        serialize(self.find_all_documents(database, collection))
    }

    pub fn find_all_documents(&self, database: &str, collection: &str) -> Vec<Document> {
        match self.try_find(database, collection, Document::new()) {
            Ok(documents) => {
                if !documents.is_empty() {
                    log::debug!(
                        "find_all() :: database: {} and collection: {} fetched No of : {}",
                        database,
                        collection,
                        documents.len()
                    );
                }
                documents
            }
            Err(e) => {
                log::error!("Failed to retrieve documents. {}", e);
                Vec::new()
            }
        }
    }

    /// Serialized documents matching `condition`, a filter in the store's
    /// native query dialect.
    pub fn find(&self, database: &str, collection: &str, condition: &str) -> Vec<String> {
        log::debug!(
            "Find and retrieve data from database: {} collection: {} condition: {}",
            database,
            collection,
            condition
        );
        let found = Document::parse(condition).and_then(|filter| self.try_find(database, collection, filter));
        match found {
            Ok(documents) => {
                if documents.is_empty() {
                    log::debug!(
                        "find() :: database: {} and collection: {} documents are not found",
                        database,
                        collection
                    );
                } else {
                    log::debug!(
                        "find() :: database: {} and collection: {} fetched No of : {}",
                        database,
                        collection,
                        documents.len()
                    );
                }
                serialize(documents)
            }
            Err(e) => {
                log::error!("Failed to retrieve documents. {}", e);
                Vec::new()
            }
        }
    }

    fn try_find(&self, database: &str, collection: &str, filter: Document) -> StoreResult<Vec<Document>> {
        self.accessor.ensure_collection(database, collection)?.find(&filter)
    }

    /// Compare-and-swap: replaces the first document matching `filter` with
    /// `replacement` in one atomic step.
    ///
    /// True only when the store acknowledged the write and a document
    /// matched, so of several callers racing on the same lock marker at most
    /// one wins. No retry is attempted.
    pub fn update(&self, database: &str, collection: &str, filter: &str, replacement: &str) -> bool {
        match self.try_update(database, collection, filter, replacement) {
            Ok(applied) => applied,
            Err(e) => {
                log::error!("Failed to update document. {}", e);
                false
            }
        }
    }

    fn try_update(&self, database: &str, collection: &str, filter: &str, replacement: &str) -> StoreResult<bool> {
        let start = Instant::now();
        let handle = self.accessor.ensure_collection(database, collection)?;
        let filter = Document::parse(filter)?;
        let replacement = Document::parse(replacement)?;

        let result = handle.replace_one(&filter, replacement)?;
        log::debug!("#### Response time to update the document in ms: {}", elapsed_millis(start));
        log::debug!(
            "update() :: database: {} and collection: {} is document updated : {}",
            database,
            collection,
            result.is_applied()
        );
        Ok(result.is_applied())
    }

    /// Atomically applies the operator document `update` to the first match
    /// of `filter` and returns that document as it was before the update.
    ///
    /// # Errors
    ///
    /// Propagates connection, malformed-input and store failures so that a
    /// caller claiming a lock can tell "nothing matched" from "store down".
    pub fn find_and_modify(
        &self,
        database: &str,
        collection: &str,
        filter: &str,
        update: &str,
    ) -> StoreResult<Option<Document>> {
        let start = Instant::now();
        let handle = self.accessor.ensure_collection(database, collection)?;
        let filter = Document::parse(filter)?;
        let update = Document::parse(update)?;

        let before = handle.find_one_and_update(&filter, &update).map_err(|e| {
            log::error!("Failed to find and modify document in {}. {}", handle.namespace(), e);
            e
        })?;
        if before.is_some() {
            log::debug!("#### Response time to findAndModify the document in ms: {}", elapsed_millis(start));
            log::debug!(
                "find_and_modify() :: database: {} and collection: {} updated successfully",
                database,
                collection
            );
        }
        Ok(before)
    }

    /// Removes every document matching `condition`; true if any was removed.
    pub fn delete(&self, database: &str, collection: &str, condition: &str) -> bool {
        let deleted = Document::parse(condition).and_then(|filter| {
            self.accessor
                .ensure_collection(database, collection)?
                .delete_many(&filter)
        });
        match deleted {
            Ok(result) if result.deleted_count > 0 => {
                log::debug!(
                    "database: {} and collection: {} deleted No.of records {}",
                    database,
                    collection,
                    result.deleted_count
                );
                true
            }
            Ok(_) => {
                log::debug!("database {} and collection: {} No documents found to delete.", database, collection);
                false
            }
            Err(e) => {
                log::error!("Failed to delete documents. {}", e);
                false
            }
        }
    }

    /// Adds `value` to the array `field` of the first match unless already
    /// present, then refreshes the timestamp field.
    ///
    /// The two writes are separate: the result reflects the set update, and a
    /// failed refresh only leaves the timestamp stale.
    pub fn add_to_set(
        &self,
        database: &str,
        collection: &str,
        condition: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> bool {
        match self.try_add_to_set(database, collection, condition, field, value.into()) {
            Ok(applied) => applied,
            Err(e) => {
                log::error!("Failed to update document. {}", e);
                false
            }
        }
    }

    fn try_add_to_set(
        &self,
        database: &str,
        collection: &str,
        condition: &str,
        field: &str,
        value: Value,
    ) -> StoreResult<bool> {
        let start = Instant::now();
        let handle = self.accessor.ensure_collection(database, collection)?;
        let filter = Document::parse(condition)?;

        let mut set_update = Document::new();
        set_update.put("$addToSet", operand(field, value));
        let result = handle.update_one(&filter, &set_update)?;

        let mut refresh = Document::new();
        refresh.put("$set", operand(&self.timestamp_field, Utc::now()));
        if let Err(e) = handle.update_one(&filter, &refresh) {
            log::warn!(
                "Set update on {} is durable but {} was not refreshed: {}",
                handle.namespace(),
                self.timestamp_field,
                e
            );
        }

        log::debug!("#### Response time to add_to_set in ms: {}", elapsed_millis(start));
        log::debug!(
            "add_to_set() :: database: {} and collection: {} is document updated : {}",
            database,
            collection,
            result.is_applied()
        );
        Ok(result.is_applied())
    }

    /// True if a non-empty document matches `condition`.
    pub fn exists(&self, database: &str, collection: &str, condition: &str) -> bool {
        let start = Instant::now();
        let found = Document::parse(condition).and_then(|filter| {
            self.accessor
                .ensure_collection(database, collection)?
                .find_first(&filter)
        });
        match found {
            Ok(Some(document)) if !document.is_empty() => {
                log::debug!("#### Response time to check document exists in ms: {}", elapsed_millis(start));
                true
            }
            Ok(_) => false,
            Err(e) => {
                log::error!("Something went wrong with the store. {}", e);
                false
            }
        }
    }

    /// Drops a collection with its indexes. Not guarded against live writers.
    pub fn drop_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
        self.accessor
            .connection()
            .client()?
            .drop_collection(database, collection)
    }

    /// Drops a database with every collection in it. Not guarded against live writers.
    pub fn drop_database(&self, database: &str) -> StoreResult<()> {
        self.accessor.connection().client()?.drop_database(database)
    }
}

fn operand(field: &str, value: impl Into<Value>) -> Document {
    let mut document = Document::new();
    document.put(field, value);
    document
}

fn serialize(documents: Vec<Document>) -> Vec<String> {
    documents.iter().map(Document::to_json).collect()
}
