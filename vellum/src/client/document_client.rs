use crate::client::{
    ClientBuilder, ClientConfig, CollectionAccessor, ConnectionManager, DocumentOperations, IndexManager,
    PipelineSettings,
};
use crate::common::{Document, Value};
use crate::errors::StoreResult;
use crate::store::{StoreCollection, StoreDriver};
use std::sync::Arc;
use std::time::Duration;

/// Client of a document store.
///
/// `DocumentClient` bundles connection management, idempotent collection
/// provisioning, document commands and TTL index maintenance behind one
/// handle. Clones are cheap and share the same connection, so a client can be
/// handed to as many threads as needed.
///
/// Commands fall into two groups:
/// - best-effort commands (`insert`, `find`, `update`, `delete`,
///   `add_to_set`, `exists`) log failures and return an empty or false
///   result;
/// - coordination commands (`find_and_modify`, `ensure_ttl_index`,
///   `ensure_collection`, the drops) return a [StoreResult] so that callers
///   can tell "nothing happened" from "store unavailable".
///
/// # Examples
///
/// ```rust,ignore
/// use vellum::client::DocumentClient;
///
/// let client = DocumentClient::builder()
///     .database("eiffel")
///     .open()?;
///
/// client.insert("eiffel", "events", r#"{"_id":"x","lock":"A"}"#);
///
/// // only one of several racing callers gets `true`
/// let claimed = client.update("eiffel", "events", r#"{"_id":"x","lock":"A"}"#, r#"{"_id":"x"}"#);
/// ```
#[derive(Clone)]
pub struct DocumentClient {
    inner: Arc<DocumentClientInner>,
}

struct DocumentClientInner {
    config: ClientConfig,
    connection: Arc<ConnectionManager>,
    accessor: CollectionAccessor,
    operations: DocumentOperations,
    indexes: IndexManager,
}

impl DocumentClient {
    /// Creates a [ClientBuilder] with default settings.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn new(config: ClientConfig, driver: StoreDriver, timestamp_field: &str) -> Self {
        let connection = Arc::new(ConnectionManager::new(
            driver,
            config.connection_options(),
            config.connect_lazily,
        ));
        let accessor = CollectionAccessor::new(Arc::clone(&connection));
        DocumentClient {
            inner: Arc::new(DocumentClientInner {
                operations: DocumentOperations::new(accessor.clone(), timestamp_field),
                indexes: IndexManager::new(accessor.clone()),
                accessor,
                connection,
                config,
            }),
        }
    }

    /// A client sharing this client's connection whose set-union updates
    /// refresh `field` instead.
    pub fn with_timestamp_field(&self, field: &str) -> DocumentClient {
        let mut operations = self.inner.operations.clone();
        operations.set_timestamp_field(field);
        DocumentClient {
            inner: Arc::new(DocumentClientInner {
                config: self.inner.config.clone(),
                connection: Arc::clone(&self.inner.connection),
                accessor: self.inner.accessor.clone(),
                operations,
                indexes: self.inner.indexes.clone(),
            }),
        }
    }

    /// Establishes the connection if there is no live one.
    ///
    /// # Errors
    ///
    /// Returns a `ConnectionError` if the store is unreachable or rejects the
    /// credential. No retry is attempted.
    pub fn connect(&self) -> StoreResult<()> {
        self.inner.connection.connect().map(|_| ())
    }

    /// Closes the connection. Every later command except
    /// [DocumentClient::health_check] fails fast.
    pub fn close(&self) -> StoreResult<()> {
        self.inner.connection.close()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// The configured default database.
    pub fn database(&self) -> &str {
        &self.inner.config.database
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Resolves a collection, creating it if needed. Concurrent creators of
    /// the same collection all succeed.
    pub fn ensure_collection(&self, database: &str, collection: &str) -> StoreResult<StoreCollection> {
        self.inner.accessor.ensure_collection(database, collection)
    }

    /// Makes `field` the key of a TTL index expiring after `expire_after`,
    /// replacing an existing index on the field.
    ///
    /// # Errors
    ///
    /// Any failure is reported as a `ConnectionError`.
    pub fn ensure_ttl_index(
        &self,
        database: &str,
        collection: &str,
        field: &str,
        expire_after: Duration,
    ) -> StoreResult<()> {
        self.inner
            .indexes
            .ensure_ttl_index(database, collection, field, expire_after)
    }

    /// Creates the pipeline's collections in the default database and, when
    /// expiry is enabled, their TTL indexes.
    pub fn provision(&self, settings: &PipelineSettings) -> StoreResult<()> {
        let database = self.database();
        for collection in [&settings.event_object_map_collection, &settings.aggregated_collection] {
            self.ensure_collection(database, collection)?;
            if let Some(ttl) = settings.ttl() {
                self.ensure_ttl_index(database, collection, &settings.ttl_field, ttl)?;
            }
        }
        log::info!("Provisioned pipeline collections in {}", database);
        Ok(())
    }

    /// Parses `input` as a JSON document and inserts it. Failures are logged.
    pub fn insert(&self, database: &str, collection: &str, input: &str) {
        self.inner.operations.insert(database, collection, input)
    }

    /// Inserts an already built document. Failures are logged.
    pub fn insert_raw(&self, database: &str, collection: &str, document: Document) {
        self.inner.operations.insert_raw(database, collection, document)
    }

    /// Every document of the collection serialized as JSON; empty on failure.
    pub fn find_all(&self, database: &str, collection: &str) -> Vec<String> {
        self.inner.operations.find_all(database, collection)
    }

    /// Every document of the collection; empty on failure.
    pub fn find_all_documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.inner.operations.find_all_documents(database, collection)
    }

    /// Documents matching the JSON filter `condition`, serialized; empty on
    /// no match or failure.
    pub fn find(&self, database: &str, collection: &str, condition: &str) -> Vec<String> {
        self.inner.operations.find(database, collection, condition)
    }

    /// Compare-and-swap replacement of the first document matching `filter`.
    ///
    /// Encode the lock marker in `filter` and leave it out of `replacement`:
    /// of all callers racing on the same marker at most one gets `true`.
    /// Losers should re-read and retry.
    pub fn update(&self, database: &str, collection: &str, filter: &str, replacement: &str) -> bool {
        self.inner
            .operations
            .update(database, collection, filter, replacement)
    }

    /// Atomically applies the operator document `update` to the first match
    /// of `filter` and returns the document as it was before; `None` if
    /// nothing matched.
    ///
    /// # Errors
    ///
    /// Propagates connection, malformed-input and store failures.
    pub fn find_and_modify(
        &self,
        database: &str,
        collection: &str,
        filter: &str,
        update: &str,
    ) -> StoreResult<Option<Document>> {
        self.inner
            .operations
            .find_and_modify(database, collection, filter, update)
    }

    /// Removes every match of `condition`; true if at least one was removed.
    pub fn delete(&self, database: &str, collection: &str, condition: &str) -> bool {
        self.inner.operations.delete(database, collection, condition)
    }

    /// Adds `value` to the array `field` of the first match of `condition`
    /// unless present, then refreshes the timestamp field.
    pub fn add_to_set(
        &self,
        database: &str,
        collection: &str,
        condition: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> bool {
        self.inner
            .operations
            .add_to_set(database, collection, condition, field, value)
    }

    /// True if a non-empty document matches `condition`.
    pub fn exists(&self, database: &str, collection: &str, condition: &str) -> bool {
        self.inner.operations.exists(database, collection, condition)
    }

    /// Reconnects if needed and checks that `database` holds collections.
    pub fn health_check(&self, database: &str) -> bool {
        self.inner.connection.health_check(database)
    }

    pub fn drop_collection(&self, database: &str, collection: &str) -> StoreResult<()> {
        self.inner.operations.drop_collection(database, collection)
    }

    pub fn drop_database(&self, database: &str) -> StoreResult<()> {
        self.inner.operations.drop_database(database)
    }

    pub fn timestamp_field(&self) -> &str {
        self.inner.operations.timestamp_field()
    }
}
