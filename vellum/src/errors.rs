use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds surfaced by the client.
///
/// The set is closed: every driver-specific failure is translated
/// into one of these at the connection or collection boundary. The finer
/// store-side category, when there is one, travels separately as a
/// [CommandCode].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ErrorKind {
    /// No live handle, or the store is unreachable, shutting down or
    /// interrupted mid-call.
    ConnectionError,
    /// A malformed filter, update or document payload.
    BadInputError,
    /// A store-side command failure that is not a known idempotent conflict.
    StoreCommandError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ConnectionError => write!(f, "Connection error"),
            ErrorKind::BadInputError => write!(f, "Bad input error"),
            ErrorKind::StoreCommandError => write!(f, "Store command error"),
        }
    }
}

/// Store-side failure categories reported by a driver.
///
/// Numeric values follow the conventional server error codes so that a
/// network driver can map its replies without a lookup table.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum CommandCode {
    BadValue,
    AuthenticationFailed,
    HostUnreachable,
    NamespaceNotFound,
    IndexNotFound,
    NamespaceExists,
    ImmutableField,
    IndexOptionsConflict,
    DuplicateKey,
    ClientClosed,
}

impl CommandCode {
    /// The numeric server code for this category.
    pub fn code(&self) -> i32 {
        match self {
            CommandCode::BadValue => 2,
            CommandCode::AuthenticationFailed => 18,
            CommandCode::HostUnreachable => 6,
            CommandCode::NamespaceNotFound => 26,
            CommandCode::IndexNotFound => 27,
            CommandCode::NamespaceExists => 48,
            CommandCode::ImmutableField => 66,
            CommandCode::IndexOptionsConflict => 85,
            CommandCode::DuplicateKey => 11000,
            CommandCode::ClientClosed => 91,
        }
    }

    /// The error kind a failure with this code belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandCode::BadValue | CommandCode::ImmutableField => ErrorKind::BadInputError,
            CommandCode::AuthenticationFailed
            | CommandCode::HostUnreachable
            | CommandCode::ClientClosed => ErrorKind::ConnectionError,
            _ => ErrorKind::StoreCommandError,
        }
    }
}

impl Display for CommandCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// The client error type.
///
/// `StoreError` carries a message, an [ErrorKind], an optional store-side
/// [CommandCode] and an optional cause, and captures a backtrace on creation.
///
/// ```rust,ignore
/// use vellum::errors::{StoreError, ErrorKind};
///
/// let err = StoreError::new("Failed to connect to the store", ErrorKind::ConnectionError);
/// let wrapped = StoreError::new_with_cause("Store connection down", ErrorKind::ConnectionError, err);
/// ```
#[derive(Clone)]
pub struct StoreError {
    message: String,
    error_kind: ErrorKind,
    code: Option<CommandCode>,
    cause: Option<Box<StoreError>>,
    backtrace: Atomic<Backtrace>,
}

impl StoreError {
    /// Creates a new `StoreError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        StoreError {
            message: message.to_string(),
            error_kind,
            code: None,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `StoreError` wrapping a cause.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: StoreError) -> Self {
        StoreError {
            message: message.to_string(),
            error_kind,
            code: cause.code,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a store-side command failure. The kind is derived from the code.
    pub fn command(message: &str, code: CommandCode) -> Self {
        StoreError {
            message: message.to_string(),
            error_kind: code.kind(),
            code: Some(code),
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn code(&self) -> Option<CommandCode> {
        self.code
    }

    pub fn cause(&self) -> Option<&StoreError> {
        self.cause.as_deref()
    }

    /// Whether this failure is the expected outcome of two callers racing to
    /// create the same collection.
    pub fn is_namespace_conflict(&self) -> bool {
        self.code == Some(CommandCode::NamespaceExists) || self.message.contains("already exists")
    }

    /// Whether the store reported that the namespace does not exist yet.
    pub fn is_namespace_missing(&self) -> bool {
        self.code == Some(CommandCode::NamespaceNotFound)
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// Shorthand for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::new(&format!("Invalid JSON payload: {}", err), ErrorKind::BadInputError)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::new(&format!("IO error: {}", err), ErrorKind::ConnectionError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_new_creates_error() {
        let error = StoreError::new("An error occurred", ErrorKind::ConnectionError);
        assert_eq!(error.message(), "An error occurred");
        assert_eq!(error.kind(), &ErrorKind::ConnectionError);
        assert!(error.code().is_none());
        assert!(error.cause().is_none());
    }

    #[test]
    fn store_error_with_cause_keeps_code() {
        let cause = StoreError::command("index exists", CommandCode::IndexOptionsConflict);
        let error = StoreError::new_with_cause("Store connection down", ErrorKind::ConnectionError, cause);
        assert_eq!(error.kind(), &ErrorKind::ConnectionError);
        assert_eq!(error.code(), Some(CommandCode::IndexOptionsConflict));
        assert_eq!(error.cause().map(|c| c.message()), Some("index exists"));
        assert!(error.source().is_some());
    }

    #[test]
    fn command_kind_is_derived_from_code() {
        assert_eq!(
            StoreError::command("x", CommandCode::AuthenticationFailed).kind(),
            &ErrorKind::ConnectionError
        );
        assert_eq!(
            StoreError::command("x", CommandCode::BadValue).kind(),
            &ErrorKind::BadInputError
        );
        assert_eq!(
            StoreError::command("x", CommandCode::DuplicateKey).kind(),
            &ErrorKind::StoreCommandError
        );
    }

    #[test]
    fn namespace_conflict_is_recognised_by_code_or_message() {
        let by_code = StoreError::command("conflict", CommandCode::NamespaceExists);
        assert!(by_code.is_namespace_conflict());

        let by_message = StoreError::new(
            "collection 'db.events' already exists",
            ErrorKind::StoreCommandError,
        );
        assert!(by_message.is_namespace_conflict());

        let other = StoreError::command("boom", CommandCode::DuplicateKey);
        assert!(!other.is_namespace_conflict());
    }

    #[test]
    fn debug_prints_cause_chain() {
        let cause = StoreError::new("root", ErrorKind::ConnectionError);
        let error = StoreError::new_with_cause("outer", ErrorKind::ConnectionError, cause);
        let text = format!("{:?}", error);
        assert!(text.starts_with("outer\nCaused by: root"));
    }

    #[test]
    fn json_errors_are_bad_input() {
        let err: StoreError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.kind(), &ErrorKind::BadInputError);
    }

    #[test]
    fn command_code_numbers() {
        assert_eq!(CommandCode::NamespaceExists.code(), 48);
        assert_eq!(CommandCode::DuplicateKey.code(), 11000);
        assert_eq!(format!("{}", CommandCode::IndexNotFound), "IndexNotFound(27)");
    }
}
