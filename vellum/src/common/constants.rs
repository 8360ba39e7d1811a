use std::time::Duration;

/// The unique identifier field of every document.
pub const DOC_ID: &str = "_id";

/// Name of the implicit index every collection carries on `_id`.
pub const ID_INDEX_NAME: &str = "_id_";

/// Suffix of the canonical name of an ascending single-field index.
pub const ASCENDING_INDEX_SUFFIX: &str = "_1";

/// Key of the index name in an index description.
pub const INDEX_NAME_KEY: &str = "name";

/// Extended-JSON key used to encode date values.
pub const DATE_KEY: &str = "$date";

/// Field refreshed after a set-union update.
pub const DEFAULT_TIMESTAMP_FIELD: &str = "Time";

pub const FIELD_SEPARATOR: char = '.';

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;
pub const DEFAULT_DATABASE: &str = "vellum";

pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TTL_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

pub const ENV_HOST: &str = "VELLUM_STORE_HOST";
pub const ENV_PORT: &str = "VELLUM_STORE_PORT";
pub const ENV_DATABASE: &str = "VELLUM_STORE_DATABASE";
pub const ENV_USERNAME: &str = "VELLUM_STORE_USERNAME";
pub const ENV_PASSWORD: &str = "VELLUM_STORE_PASSWORD";
