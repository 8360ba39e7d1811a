use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::store::{ConnectionOptions, StoreClient, StoreDriver};

enum ConnectionState {
    Idle,
    Connected(StoreClient),
    Closed,
}

/// Owns the single live connection of a client.
///
/// The manager never retries: a failed connect is reported at once and the
/// next call starts a fresh attempt.
pub struct ConnectionManager {
    driver: StoreDriver,
    options: ConnectionOptions,
    connect_lazily: bool,
    state: Atomic<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(driver: StoreDriver, options: ConnectionOptions, connect_lazily: bool) -> Self {
        ConnectionManager {
            driver,
            options,
            connect_lazily,
            state: atomic(ConnectionState::Idle),
        }
    }

    /// Opens the connection unless a live one already exists.
    ///
    /// Authenticates when the options carry a credential, otherwise connects
    /// anonymously. A previously closed manager is reopened.
    pub fn connect(&self) -> StoreResult<StoreClient> {
        self.state.write_with(|state| {
            if let ConnectionState::Connected(client) = state {
                if !client.is_closed() {
                    return Ok(client.clone());
                }
            }

            let address = self.options.address();
            match self.driver.connect(&self.options) {
                Ok(client) => {
                    log::info!(
                        "Connected to {} store at {} ({})",
                        self.driver.name(),
                        address,
                        if self.options.is_authenticated() { "authenticated" } else { "anonymous" }
                    );
                    *state = ConnectionState::Connected(client.clone());
                    Ok(client)
                }
                Err(e) => {
                    log::error!("Failed to connect to store at {}: {}", address, e);
                    *state = ConnectionState::Idle;
                    Err(StoreError::new_with_cause(
                        &format!("Failed to connect to store at {}", address),
                        ErrorKind::ConnectionError,
                        e,
                    ))
                }
            }
        })
    }

    /// The live connection, established on demand in lazy mode.
    ///
    /// # Errors
    ///
    /// Returns a `ConnectionError` after [ConnectionManager::close], or when
    /// there is no live connection and the manager is not lazy.
    pub fn client(&self) -> StoreResult<StoreClient> {
        let current = self.state.read_with(|state| match state {
            ConnectionState::Connected(client) if !client.is_closed() => Ok(Some(client.clone())),
            ConnectionState::Closed => Err(StoreError::new(
                "Store client has been closed",
                ErrorKind::ConnectionError,
            )),
            _ => Ok(None),
        })?;

        match current {
            Some(client) => Ok(client),
            None if self.connect_lazily => self.connect(),
            None => {
                log::error!("No live connection to store at {}", self.options.address());
                Err(StoreError::new(
                    "Failed to connect to store: no live connection",
                    ErrorKind::ConnectionError,
                ))
            }
        }
    }

    /// Releases the connection. Closing twice is harmless.
    pub fn close(&self) -> StoreResult<()> {
        let previous = self
            .state
            .write_with(|state| std::mem::replace(state, ConnectionState::Closed));
        if let ConnectionState::Connected(client) = previous {
            client.close()?;
            log::info!("Closed connection to store at {}", self.options.address());
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.read_with(|state| match state {
            ConnectionState::Connected(client) => !client.is_closed(),
            _ => false,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .read_with(|state| matches!(state, ConnectionState::Closed))
    }

    /// Liveness probe: reconnects when there is no live connection, then
    /// lists the collections of `database`.
    ///
    /// False on any error and when the database holds no collection.
    pub fn health_check(&self, database: &str) -> bool {
        let client = if self.is_connected() {
            self.client()
        } else {
            self.connect()
        };

        match client.and_then(|client| client.list_collection_names(database)) {
            Ok(names) => !names.is_empty(),
            Err(e) => {
                log::error!("Something went wrong with the store connection. Error: {}", e);
                false
            }
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CommandCode;
    use crate::store::memory::MemoryDriver;

    fn manager(memory: &MemoryDriver, lazily: bool) -> ConnectionManager {
        ConnectionManager::new(
            StoreDriver::new(memory.clone()),
            ConnectionOptions::default(),
            lazily,
        )
    }

    #[test]
    fn connect_reuses_the_live_handle() {
        let memory = MemoryDriver::new();
        let manager = manager(&memory, false);
        manager.connect().unwrap();
        manager.connect().unwrap();
        assert!(manager.is_connected());
        assert_eq!(memory.connection_count(), 1);
    }

    #[test]
    fn eager_manager_without_connection_fails_fast() {
        let memory = MemoryDriver::new();
        let manager = manager(&memory, false);
        let err = manager.client().err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::ConnectionError);
        assert_eq!(memory.connection_count(), 0);
    }

    #[test]
    fn lazy_manager_connects_on_first_use() {
        let memory = MemoryDriver::new();
        let manager = manager(&memory, true);
        assert!(!manager.is_connected());
        manager.client().unwrap();
        assert!(manager.is_connected());
    }

    #[test]
    fn unreachable_store_is_connection_error() {
        let memory = MemoryDriver::new();
        memory.set_reachable(false);
        let err = manager(&memory, false).connect().err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::ConnectionError);
        assert_eq!(err.code(), Some(CommandCode::HostUnreachable));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let memory = MemoryDriver::new();
        let manager = manager(&memory, true);
        manager.connect().unwrap();
        manager.close().unwrap();
        manager.close().unwrap();

        assert!(manager.is_closed());
        assert_eq!(memory.connection_count(), 0);
        assert_eq!(manager.client().err().unwrap().kind(), &ErrorKind::ConnectionError);
    }

    #[test]
    fn health_check_reconnects() {
        let memory = MemoryDriver::new();
        let manager = manager(&memory, false);
        assert!(!manager.health_check("db"));
        assert!(manager.is_connected());

        manager.client().unwrap().create_collection("db", "events").unwrap();
        assert!(manager.health_check("db"));

        manager.close().unwrap();
        assert!(manager.health_check("db"));
    }
}
