use crate::client::ConnectionManager;
use crate::common::is_blank;
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::store::{StoreClient, StoreCollection};
use std::sync::Arc;

/// Resolves collections, creating them on first use.
///
/// Creation races between concurrent callers are expected: the loser's
/// "already exists" conflict is logged and swallowed, and every caller ends
/// up with a handle to the same collection.
#[derive(Clone)]
pub struct CollectionAccessor {
    connection: Arc<ConnectionManager>,
}

impl CollectionAccessor {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        CollectionAccessor { connection }
    }

    /// Returns the named collection, creating it and its database if needed.
    ///
    /// # Errors
    ///
    /// * `ConnectionError` when there is no live connection.
    /// * `BadInputError` for blank names.
    /// * `StoreCommandError` when creation fails for any reason other than
    ///   a concurrent creator winning the race.
    pub fn ensure_collection(&self, database: &str, name: &str) -> StoreResult<StoreCollection> {
        if is_blank(database) || is_blank(name) {
            log::error!("Illegal namespace '{}.{}'", database, name);
            return Err(StoreError::new(
                &format!("Illegal collection namespace '{}.{}'", database, name),
                ErrorKind::BadInputError,
            ));
        }

        let client = self.connection.client()?;
        match client.collection(database, name) {
            Ok(collection) => Ok(collection),
            Err(e) if e.is_namespace_missing() => {
                log::debug!(
                    "The requested database({}) / collection({}) not available, creating",
                    database,
                    name
                );
                self.create(&client, database, name)?;
                client
                    .collection(database, name)
                    .map_err(|e| translate(e, database, name))
            }
            Err(e) => Err(translate(e, database, name)),
        }
    }

    fn create(&self, client: &StoreClient, database: &str, name: &str) -> StoreResult<()> {
        match client.create_collection(database, name) {
            Ok(()) => {
                log::debug!("Created collection {}.{}", database, name);
                Ok(())
            }
            Err(e) if e.is_namespace_conflict() => {
                log::warn!("A {}.", e.message());
                Ok(())
            }
            Err(e) => Err(translate(e, database, name)),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

/// Collapses driver failures into the client's error kinds. Connection and
/// input errors keep their kind; everything else is a command failure.
fn translate(error: StoreError, database: &str, name: &str) -> StoreError {
    match error.kind() {
        ErrorKind::ConnectionError | ErrorKind::BadInputError => error,
        ErrorKind::StoreCommandError => {
            log::error!("Failed to resolve collection {}.{}: {}", database, name, error);
            StoreError::new_with_cause(
                &format!("Failed to resolve collection {}.{}", database, name),
                ErrorKind::StoreCommandError,
                error,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CommandCode;
    use crate::store::memory::MemoryDriver;
    use crate::store::{ConnectionOptions, StoreDriver};
    use std::sync::Barrier;
    use std::thread;

    fn accessor(memory: &MemoryDriver) -> CollectionAccessor {
        let manager = ConnectionManager::new(
            StoreDriver::new(memory.clone()),
            ConnectionOptions::default(),
            true,
        );
        CollectionAccessor::new(Arc::new(manager))
    }

    #[test]
    fn creates_missing_collection() {
        let memory = MemoryDriver::new();
        let accessor = accessor(&memory);
        let collection = accessor.ensure_collection("db", "events").unwrap();
        assert_eq!(collection.namespace(), "db.events");
        assert_eq!(memory.database_names(), vec!["db"]);

        accessor.ensure_collection("db", "events").unwrap();
    }

    #[test]
    fn concurrent_creators_all_succeed() {
        let memory = MemoryDriver::new();
        let barrier = Arc::new(Barrier::new(10));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let accessor = accessor(&memory);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    accessor.ensure_collection("db", "events").map(|_| ())
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        let client = accessor(&memory).connection().client().unwrap();
        assert_eq!(client.list_collection_names("db").unwrap(), vec!["events"]);
    }

    #[test]
    fn closed_connection_fails_before_touching_the_store() {
        let memory = MemoryDriver::new();
        let accessor = accessor(&memory);
        accessor.connection().close().unwrap();

        let err = accessor.ensure_collection("db", "events").err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::ConnectionError);
        assert!(memory.database_names().is_empty());
    }

    #[test]
    fn unreachable_store_keeps_connection_kind() {
        let memory = MemoryDriver::new();
        let accessor = accessor(&memory);
        accessor.ensure_collection("db", "events").unwrap();

        memory.set_reachable(false);
        let err = accessor.ensure_collection("db", "events").err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::ConnectionError);
        assert_eq!(err.code(), Some(CommandCode::HostUnreachable));
    }

    #[test]
    fn blank_names_are_bad_input() {
        let memory = MemoryDriver::new();
        let err = accessor(&memory).ensure_collection("db", " ").err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::BadInputError);
    }
}
