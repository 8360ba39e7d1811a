use crate::common::{
    is_blank, DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMESTAMP_FIELD, ENV_DATABASE, ENV_HOST,
    ENV_PASSWORD, ENV_PORT, ENV_USERNAME,
};
use crate::client::DocumentClient;
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::store::memory::MemoryDriver;
use crate::store::{ConnectionOptions, Credential, ServerAddress, StoreDriver};
use secure_string::SecureString;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Connection settings of a [DocumentClient].
///
/// A credential is only used when both the username and the password are
/// non-blank; otherwise the connection is anonymous. The credential is
/// authenticated against `database`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_password")]
    pub password: Option<SecureString>,
    /// Defer connecting until the first operation.
    pub connect_lazily: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            username: None,
            password: None,
            connect_lazily: false,
        }
    }
}

impl ClientConfig {
    /// Reads the configuration from `VELLUM_STORE_*` environment variables,
    /// falling back to the defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns a `BadInputError` if `VELLUM_STORE_PORT` is not a valid port.
    pub fn from_env() -> StoreResult<ClientConfig> {
        let mut config = ClientConfig::default();
        if let Ok(host) = std::env::var(ENV_HOST) {
            config.host = host;
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            config.port = port.trim().parse().map_err(|e| {
                log::error!("Invalid {} value '{}': {}", ENV_PORT, port, e);
                StoreError::new(
                    &format!("Invalid store port '{}'", port),
                    ErrorKind::BadInputError,
                )
            })?;
        }
        if let Ok(database) = std::env::var(ENV_DATABASE) {
            config.database = database;
        }
        config.username = std::env::var(ENV_USERNAME).ok();
        config.password = std::env::var(ENV_PASSWORD).ok().map(SecureString::from);
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if is_blank(&self.host) {
            return Err(invalid("Store host cannot be empty"));
        }
        if self.port == 0 {
            return Err(invalid("Store port cannot be 0"));
        }
        if is_blank(&self.database) {
            return Err(invalid("Database name cannot be empty"));
        }
        Ok(())
    }

    pub fn credential(&self) -> Option<Credential> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !is_blank(username) && !is_blank(password.unsecure()) => {
                Some(Credential::new(username, &self.database, password.clone()))
            }
            _ => None,
        }
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions::new(ServerAddress::new(&self.host, self.port), self.credential())
    }
}

fn deserialize_password<'de, D>(deserializer: D) -> Result<Option<SecureString>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|password| password.map(SecureString::from))
}

fn invalid(message: &str) -> StoreError {
    log::error!("{}", message);
    StoreError::new(message, ErrorKind::BadInputError)
}

/// Collection names and TTL policy of the event pipeline the client serves.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub event_object_map_collection: String,
    pub aggregated_collection: String,
    pub ttl_field: String,
    /// Zero disables expiry.
    pub ttl_seconds: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            event_object_map_collection: "event_object_map".to_string(),
            aggregated_collection: "aggregated_objects".to_string(),
            ttl_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            ttl_seconds: 0,
        }
    }
}

impl PipelineSettings {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_seconds > 0).then(|| Duration::from_secs(self.ttl_seconds))
    }
}

/// Fluent builder for a [DocumentClient].
///
/// The first invalid setting is remembered and reported by [ClientBuilder::open],
/// later settings are ignored once an error is captured.
///
/// # Examples
///
/// ```rust,ignore
/// let client = DocumentClient::builder()
///     .host("db.internal")
///     .port(27017)
///     .database("eiffel")
///     .credentials("svc", "s3cret")
///     .open()?;
/// ```
pub struct ClientBuilder {
    error: Option<StoreError>,
    config: ClientConfig,
    driver: Option<StoreDriver>,
    timestamp_field: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        ClientBuilder {
            error: None,
            config: ClientConfig::default(),
            driver: None,
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
        }
    }

    /// Replaces every connection setting at once.
    pub fn config(mut self, config: ClientConfig) -> Self {
        if self.error.is_none() {
            match config.validate() {
                Ok(()) => self.config = config,
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        if self.error.is_none() {
            if is_blank(host) {
                self.error = Some(invalid("Store host cannot be empty"));
            } else {
                self.config.host = host.to_string();
            }
        }
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        if self.error.is_none() {
            if port == 0 {
                self.error = Some(invalid("Store port cannot be 0"));
            } else {
                self.config.port = port;
            }
        }
        self
    }

    pub fn database(mut self, database: &str) -> Self {
        if self.error.is_none() {
            if is_blank(database) {
                self.error = Some(invalid("Database name cannot be empty"));
            } else {
                self.config.database = database.to_string();
            }
        }
        self
    }

    /// Sets the credential. Blank values fall back to an anonymous connection.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.config.username = Some(username.to_string());
        self.config.password = Some(SecureString::from(password));
        self
    }

    pub fn connect_lazily(mut self, lazily: bool) -> Self {
        self.config.connect_lazily = lazily;
        self
    }

    /// The driver used to reach the store. Defaults to a private embedded
    /// [MemoryDriver].
    pub fn driver(mut self, driver: StoreDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Field refreshed with the current time after every set-union update.
    pub fn timestamp_field(mut self, field: &str) -> Self {
        if self.error.is_none() {
            if is_blank(field) {
                self.error = Some(invalid("Timestamp field cannot be empty"));
            } else {
                self.timestamp_field = field.to_string();
            }
        }
        self
    }

    /// Builds the client and, unless lazy connection was requested, connects it.
    ///
    /// # Errors
    ///
    /// Returns the first captured configuration error, or a `ConnectionError`
    /// if the eager connection fails.
    pub fn open(self) -> StoreResult<DocumentClient> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let driver = self.driver.unwrap_or_else(|| {
            log::info!("No store driver configured, using an embedded memory store");
            StoreDriver::new(MemoryDriver::new())
        });

        let connect_lazily = self.config.connect_lazily;
        let client = DocumentClient::new(self.config, driver, &self.timestamp_field);
        if !connect_lazily {
            client.connect()?;
        }
        Ok(client)
    }
}
