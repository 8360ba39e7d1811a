use crate::common::{Document, Value};
use crate::errors::StoreResult;
use crate::store::{ConnectionOptions, DeleteResult, IndexModel, UpdateResult};
use std::ops::Deref;
use std::sync::Arc;

/// Establishes connections to a document store.
///
/// # Thread Safety
/// Implementers must be `Send + Sync`; one driver is shared by every client
/// created from it.
pub trait StoreDriverProvider: Send + Sync {
    /// Opens a connection. Implementations must not retry: an unreachable
    /// store or rejected credentials are reported immediately.
    fn connect(&self, options: &ConnectionOptions) -> StoreResult<StoreClient>;

    /// Short name used in log records.
    fn name(&self) -> &str;
}

/// Operations available over one live connection.
pub trait ClientProvider: Send + Sync {
    /// Resolves an existing collection.
    ///
    /// Fails with `CommandCode::NamespaceNotFound` when the database or the
    /// collection does not exist yet.
    fn collection(&self, database: &str, name: &str) -> StoreResult<StoreCollection>;

    /// Creates a collection, creating its database on the way.
    ///
    /// Fails with `CommandCode::NamespaceExists` when it already exists.
    fn create_collection(&self, database: &str, name: &str) -> StoreResult<()>;

    /// Names of the collections in `database`; empty when it does not exist.
    fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>>;

    /// Drops a collection and its indexes. Dropping a missing collection is a no-op.
    fn drop_collection(&self, database: &str, name: &str) -> StoreResult<()>;

    /// Drops a database with every collection in it. Missing databases are a no-op.
    fn drop_database(&self, database: &str) -> StoreResult<()>;

    /// Releases the connection. Subsequent calls fail with a connection error.
    fn close(&self) -> StoreResult<()>;

    fn is_closed(&self) -> bool;
}

/// Document and index commands against one collection.
///
/// Filters and updates are documents in the store's native query dialect.
pub trait CollectionProvider: Send + Sync {
    /// `<database>.<collection>`
    fn namespace(&self) -> String;

    /// Inserts a document, assigning an `_id` when it has none, and returns the id.
    fn insert_one(&self, document: Document) -> StoreResult<Value>;

    /// All documents matching `filter`, in natural order.
    fn find(&self, filter: &Document) -> StoreResult<Vec<Document>>;

    fn find_first(&self, filter: &Document) -> StoreResult<Option<Document>>;

    /// Atomically replaces the first document matching `filter`.
    fn replace_one(&self, filter: &Document, replacement: Document) -> StoreResult<UpdateResult>;

    /// Atomically applies an operator update to the first document matching `filter`.
    fn update_one(&self, filter: &Document, update: &Document) -> StoreResult<UpdateResult>;

    /// Atomically applies an operator update to the first document matching
    /// `filter` and returns that document as it was before the update.
    fn find_one_and_update(&self, filter: &Document, update: &Document) -> StoreResult<Option<Document>>;

    fn delete_many(&self, filter: &Document) -> StoreResult<DeleteResult>;

    /// Index descriptions: `{"v": 2, "key": {<field>: 1}, "name": .., "expireAfterSeconds": ..}`.
    fn list_indexes(&self) -> StoreResult<Vec<Document>>;

    /// Creates an index and returns its name.
    ///
    /// Fails with `CommandCode::IndexOptionsConflict` when an index with the
    /// same name exists with different options.
    fn create_index(&self, model: &IndexModel) -> StoreResult<String>;

    /// Fails with `CommandCode::IndexNotFound` when no index has this name.
    fn drop_index(&self, name: &str) -> StoreResult<()>;
}

/// Shared handle to a [StoreDriverProvider].
#[derive(Clone)]
pub struct StoreDriver {
    inner: Arc<dyn StoreDriverProvider>,
}

impl StoreDriver {
    pub fn new<T: StoreDriverProvider + 'static>(inner: T) -> Self {
        StoreDriver { inner: Arc::new(inner) }
    }
}

impl Deref for StoreDriver {
    type Target = Arc<dyn StoreDriverProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Shared handle to a live connection.
#[derive(Clone)]
pub struct StoreClient {
    inner: Arc<dyn ClientProvider>,
}

impl StoreClient {
    pub fn new<T: ClientProvider + 'static>(inner: T) -> Self {
        StoreClient { inner: Arc::new(inner) }
    }
}

impl Deref for StoreClient {
    type Target = Arc<dyn ClientProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Shared handle to a resolved collection.
#[derive(Clone)]
pub struct StoreCollection {
    inner: Arc<dyn CollectionProvider>,
}

impl StoreCollection {
    pub fn new<T: CollectionProvider + 'static>(inner: T) -> Self {
        StoreCollection { inner: Arc::new(inner) }
    }
}

impl Deref for StoreCollection {
    type Target = Arc<dyn CollectionProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
