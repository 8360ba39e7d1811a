use crate::common::{ASCENDING_INDEX_SUFFIX, DEFAULT_HOST, DEFAULT_PORT};
use secure_string::SecureString;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Host and port of a store server.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn new(host: &str, port: u16) -> Self {
        ServerAddress {
            host: host.to_string(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        ServerAddress::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Display for ServerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A username/password pair authenticated against an auth database.
#[derive(Clone, Debug)]
pub struct Credential {
    username: String,
    source: String,
    password: SecureString,
}

impl Credential {
    pub fn new(username: &str, source: &str, password: SecureString) -> Self {
        Credential {
            username: username.to_string(),
            source: source.to_string(),
            password,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The database the user is registered in.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn password(&self) -> &SecureString {
        &self.password
    }
}

/// Everything a driver needs to open a connection.
#[derive(Clone, Debug, Default)]
pub struct ConnectionOptions {
    address: ServerAddress,
    credential: Option<Credential>,
}

impl ConnectionOptions {
    pub fn new(address: ServerAddress, credential: Option<Credential>) -> Self {
        ConnectionOptions { address, credential }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }
}

/// Options of a single-field index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub name: Option<String>,
    pub expire_after: Option<Duration>,
}

/// An ascending single-field index specification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexModel {
    field: String,
    options: IndexOptions,
}

impl IndexModel {
    pub fn ascending(field: &str) -> Self {
        IndexModel {
            field: field.to_string(),
            options: IndexOptions::default(),
        }
    }

    /// Turns the index into a TTL index expiring documents `expire_after`
    /// past the date held in the indexed field.
    pub fn expire_after(mut self, expire_after: Duration) -> Self {
        self.options.expire_after = Some(expire_after);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.options.name = Some(name.to_string());
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// The explicit name, or the canonical `<field>_1`.
    pub fn name(&self) -> String {
        self.options
            .name
            .clone()
            .unwrap_or_else(|| ascending_index_name(&self.field))
    }
}

/// Canonical name the store gives an ascending index on `field`.
pub fn ascending_index_name(field: &str) -> String {
    format!("{}{}", field, ASCENDING_INDEX_SUFFIX)
}
