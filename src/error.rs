// Keyword library error types
use thiserror::Error;

use crate::database::DatabaseError;
use crate::embedded::EmbeddedError;

/// Everything a keyword can fail with. The display message is what Robot
/// Framework shows as the keyword failure.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("error connecting mongodb: {message}")]
    Connection {
        message: String,
        #[source]
        source: DatabaseError,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Embedded(#[from] EmbeddedError),

    // Verification keyword failed
    #[error("{0}")]
    Assertion(String),

    #[error("No keyword with name '{0}' found")]
    UnknownKeyword(String),

    #[error("Keyword '{keyword}' expected {expected} arguments, got {got}")]
    ArgumentCount {
        keyword: String,
        expected: String,
        got: usize,
    },

    #[error("Keyword '{keyword}' got an unexpected named argument '{name}'")]
    UnexpectedNamedArgument { keyword: String, name: String },

    #[error("Keyword '{keyword}' got multiple values for argument '{name}'")]
    DuplicateArgument { keyword: String, name: String },

    #[error("Argument '{name}' must be {expected}, got '{value}'")]
    InvalidArgument {
        name: String,
        expected: &'static str,
        value: String,
    },
}

impl LibraryError {
    pub fn connection(message: impl Into<String>, source: DatabaseError) -> Self {
        LibraryError::Connection {
            message: message.into(),
            source,
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        LibraryError::Assertion(message.into())
    }

    pub fn invalid_argument(name: &str, expected: &'static str, value: impl Into<String>) -> Self {
        LibraryError::InvalidArgument {
            name: name.to_string(),
            expected,
            value: value.into(),
        }
    }

    /// Stable code for logs and the remote traceback field
    pub fn error_code(&self) -> &'static str {
        match self {
            LibraryError::Connection { .. } => "CONNECTION_ERROR",
            LibraryError::Database(DatabaseError::NotConnected) => "NOT_CONNECTED",
            LibraryError::Database(DatabaseError::InvalidJson(_))
            | LibraryError::Database(DatabaseError::InvalidExtendedJson(_))
            | LibraryError::Database(DatabaseError::NotADocument(_))
            | LibraryError::Database(DatabaseError::InvalidIndexOptions(_)) => "INVALID_JSON",
            LibraryError::Database(DatabaseError::InvalidDatabaseName(_))
            | LibraryError::Database(DatabaseError::InvalidCollectionName(_)) => "INVALID_NAME",
            LibraryError::Database(DatabaseError::Driver(_)) => "DRIVER_ERROR",
            LibraryError::Embedded(_) => "EMBEDDED_SERVER_ERROR",
            LibraryError::Assertion(_) => "ASSERTION_FAILED",
            LibraryError::UnknownKeyword(_) => "UNKNOWN_KEYWORD",
            LibraryError::ArgumentCount { .. }
            | LibraryError::UnexpectedNamedArgument { .. }
            | LibraryError::DuplicateArgument { .. }
            | LibraryError::InvalidArgument { .. } => "INVALID_ARGUMENTS",
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, LibraryError::Assertion(_))
    }
}

impl From<mongodb::error::Error> for LibraryError {
    fn from(err: mongodb::error::Error) -> Self {
        LibraryError::Database(DatabaseError::Driver(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_message_is_verbatim() {
        let err = LibraryError::assertion("Collection 'a' does not exist");
        assert_eq!(err.to_string(), "Collection 'a' does not exist");
        assert!(err.is_assertion());
        assert_eq!(err.error_code(), "ASSERTION_FAILED");
    }

    #[test]
    fn database_errors_keep_their_message() {
        let err = LibraryError::from(DatabaseError::NotConnected);
        assert_eq!(err.to_string(), "Not connected to a MongoDB server");
        assert_eq!(err.error_code(), "NOT_CONNECTED");
    }

    #[test]
    fn connection_errors_carry_cause() {
        let err = LibraryError::connection("localhost:27017", DatabaseError::InvalidDatabaseName("a.b".into()));
        assert_eq!(err.to_string(), "error connecting mongodb: localhost:27017");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Invalid database name: 'a.b'"));
    }
}
