use super::auth::UserRegistry;
use super::catalog::Catalog;
use super::collection::MemoryCollection;
use super::config::MemoryDriverConfig;
use super::ttl::TtlMonitor;
use crate::errors::{CommandCode, StoreError, StoreResult};
use crate::store::{
    ClientProvider, ConnectionOptions, ServerAddress, StoreClient, StoreCollection, StoreDriverProvider,
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// An in-process document store.
///
/// Clones share the same data, so a test can keep one handle to inspect or
/// sabotage the store while clients talk to another. Expired documents are
/// swept by a background task every
/// [MemoryDriverConfig::monitor_interval].
///
/// ```rust,ignore
/// let driver = MemoryDriver::new();
/// driver.add_user("admin", "svc", "s3cret")?;
/// let client = DocumentClient::builder()
///     .driver(StoreDriver::new(driver.clone()))
///     .credentials("svc", "s3cret")
///     .open()?;
/// ```
#[derive(Clone)]
pub struct MemoryDriver {
    inner: Arc<MemoryDriverInner>,
}

struct MemoryDriverInner {
    config: MemoryDriverConfig,
    catalog: Arc<Catalog>,
    users: UserRegistry,
    reachable: Arc<AtomicBool>,
    live_clients: Arc<AtomicUsize>,
    monitor: TtlMonitor,
}

impl MemoryDriver {
    pub fn new() -> Self {
        MemoryDriver::with_config(MemoryDriverConfig::default())
    }

    pub fn with_config(config: MemoryDriverConfig) -> Self {
        let inner = Arc::new(MemoryDriverInner {
            config: config.clone(),
            catalog: Arc::new(Catalog::new()),
            users: UserRegistry::new(),
            reachable: Arc::new(AtomicBool::new(true)),
            live_clients: Arc::new(AtomicUsize::new(0)),
            monitor: TtlMonitor::new(),
        });

        if let Some(interval) = config.monitor_interval() {
            let catalog: Weak<Catalog> = Arc::downgrade(&inner.catalog);
            inner.monitor.start(interval, move || {
                if let Some(catalog) = catalog.upgrade() {
                    catalog.purge_expired(Utc::now());
                }
            });
        }

        MemoryDriver { inner }
    }

    /// Registers a user that may authenticate against `source`.
    pub fn add_user(&self, source: &str, username: &str, password: &str) -> StoreResult<()> {
        self.inner.users.add_user(source, username, password)
    }

    /// Simulates losing or regaining the network path to the store. While
    /// unreachable every command and connection attempt fails.
    pub fn set_reachable(&self, reachable: bool) {
        log::info!("Memory store is now {}", if reachable { "reachable" } else { "unreachable" });
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::SeqCst)
    }

    /// Runs one TTL sweep immediately and returns the number of documents
    /// removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.catalog.purge_expired(Utc::now())
    }

    /// Number of connections opened and not yet closed.
    pub fn connection_count(&self) -> usize {
        self.inner.live_clients.load(Ordering::SeqCst)
    }

    pub fn database_names(&self) -> Vec<String> {
        self.inner.catalog.database_names()
    }

    pub fn config(&self) -> &MemoryDriverConfig {
        &self.inner.config
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        MemoryDriver::new()
    }
}

impl Drop for MemoryDriverInner {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}

impl StoreDriverProvider for MemoryDriver {
    fn connect(&self, options: &ConnectionOptions) -> StoreResult<StoreClient> {
        let address = options.address();
        if !self.is_reachable() {
            log::error!("Memory store at {} is unreachable", address);
            return Err(StoreError::command(
                &format!("Timed out while connecting to server at {}", address),
                CommandCode::HostUnreachable,
            ));
        }

        match options.credential() {
            Some(credential) => self.inner.users.authenticate(credential)?,
            None if self.inner.config.is_auth_required() => {
                log::error!("Memory store at {} requires authentication", address);
                return Err(StoreError::command(
                    "Command requires authentication",
                    CommandCode::AuthenticationFailed,
                ));
            }
            None => {}
        }

        self.inner.live_clients.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session {
            address: address.clone(),
            closed: AtomicBool::new(false),
            reachable: Arc::clone(&self.inner.reachable),
        });
        Ok(StoreClient::new(MemoryClient {
            catalog: Arc::clone(&self.inner.catalog),
            session,
            live_clients: Arc::clone(&self.inner.live_clients),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Liveness of one connection, shared with every collection handle it hands out.
pub(crate) struct Session {
    address: ServerAddress,
    closed: AtomicBool,
    reachable: Arc<AtomicBool>,
}

impl Session {
    pub(crate) fn check(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::command(
                "Client has been closed",
                CommandCode::ClientClosed,
            ));
        }
        if !self.reachable.load(Ordering::SeqCst) {
            log::error!("Lost connection to memory store at {}", self.address);
            return Err(StoreError::command(
                &format!("Connection to {} lost", self.address),
                CommandCode::HostUnreachable,
            ));
        }
        Ok(())
    }

    fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

struct MemoryClient {
    catalog: Arc<Catalog>,
    session: Arc<Session>,
    live_clients: Arc<AtomicUsize>,
}

impl MemoryClient {
    fn release(&self) {
        if self.session.close() {
            self.live_clients.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl ClientProvider for MemoryClient {
    fn collection(&self, database: &str, name: &str) -> StoreResult<StoreCollection> {
        self.session.check()?;
        if self.catalog.get(database, name).is_none() {
            log::debug!("Collection {}.{} does not exist", database, name);
            return Err(StoreError::command(
                &format!("ns does not exist: {}.{}", database, name),
                CommandCode::NamespaceNotFound,
            ));
        }
        Ok(StoreCollection::new(MemoryCollection::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.session),
            database,
            name,
        )))
    }

    fn create_collection(&self, database: &str, name: &str) -> StoreResult<()> {
        self.session.check()?;
        self.catalog.create(database, name).map(|_| ())
    }

    fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        self.session.check()?;
        Ok(self.catalog.collection_names(database))
    }

    fn drop_collection(&self, database: &str, name: &str) -> StoreResult<()> {
        self.session.check()?;
        if self.catalog.drop_collection(database, name) {
            log::debug!("Dropped collection {}.{}", database, name);
        }
        Ok(())
    }

    fn drop_database(&self, database: &str) -> StoreResult<()> {
        self.session.check()?;
        self.catalog.drop_database(database);
        log::debug!("Dropped database {}", database);
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        self.release();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.session.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.release();
    }
}
