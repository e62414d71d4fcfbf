use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::{atomic, Atomic};

/// Error kinds for Halite operations.
///
/// This enum represents all possible error types that can occur during store
/// operations. Each error kind describes a specific category of failure,
/// enabling precise error handling.
///
/// # Examples
///
/// ```rust,ignore
/// use halite::errors::{HaliteError, ErrorKind, HaliteResult};
///
/// fn example() -> HaliteResult<()> {
///     Err(HaliteError::new("Index not found", ErrorKind::IndexNotFound))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Query errors - malformed queries, unknown operators, bad projections
    /// Error during query evaluation or construction
    FilterError,

    // Validation errors - rejected documents and updates
    /// A persisted document contains a forbidden key (`$`-prefixed or dotted)
    InvalidDocument,
    /// An update document is malformed or incompatible with the target
    InvalidUpdate,
    /// A projection mixes inclusion and exclusion
    InconsistentProjection,
    /// A required field is missing
    MissingRequiredField,

    // Indexing errors
    /// Index does not exist
    IndexNotFound,
    /// A unique constraint was violated
    UniqueConstraintViolation,

    // Operation errors
    /// The operation is not valid in the current context
    InvalidOperation,
    /// The store has not been loaded yet
    StoreNotLoaded,

    // Persistence errors - surfaced from the persistence collaborator
    /// Error from the persistence collaborator
    PersistenceError,
    /// Error encoding or decoding data
    EncodingError,

    // Generic/internal errors - used as fallback
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::FilterError => write!(f, "Filter error"),
            ErrorKind::InvalidDocument => write!(f, "Invalid document"),
            ErrorKind::InvalidUpdate => write!(f, "Invalid update"),
            ErrorKind::InconsistentProjection => write!(f, "Inconsistent projection"),
            ErrorKind::MissingRequiredField => write!(f, "Missing required field"),
            ErrorKind::IndexNotFound => write!(f, "Index not found"),
            ErrorKind::UniqueConstraintViolation => write!(f, "Unique constraint violation"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::StoreNotLoaded => write!(f, "Store not loaded"),
            ErrorKind::PersistenceError => write!(f, "Persistence error"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom Halite error type.
///
/// `HaliteError` encapsulates error information including the error message,
/// kind, and optional cause. It supports error chaining and backtraces for
/// debugging.
///
/// # Examples
///
/// ```rust,ignore
/// use halite::errors::{HaliteError, ErrorKind};
///
/// // Create a simple error
/// let err = HaliteError::new("Index not found", ErrorKind::IndexNotFound);
///
/// // Create an error with a cause
/// let cause = HaliteError::new("Encoding failed", ErrorKind::EncodingError);
/// let err = HaliteError::new_with_cause("Load failed", ErrorKind::PersistenceError, cause);
/// ```
#[derive(Clone)]
pub struct HaliteError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<HaliteError>>,
    backtrace: Atomic<Backtrace>,
}

impl HaliteError {
    /// Creates a new `HaliteError` with the specified message and error kind.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        HaliteError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `HaliteError` with a cause error.
    ///
    /// This creates an error chain where the cause error is preserved for
    /// debugging.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    /// * `cause` - The underlying error that caused this error
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: HaliteError) -> Self {
        HaliteError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&HaliteError> {
        self.cause.as_deref()
    }
}

impl Display for HaliteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for HaliteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace.read()),
        }
    }
}

impl Error for HaliteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for Halite operations.
///
/// `HaliteResult<T>` is shorthand for `Result<T, HaliteError>`.
/// All fallible operations return this type.
pub type HaliteResult<T> = Result<T, HaliteError>;

impl From<serde_json::Error> for HaliteError {
    fn from(err: serde_json::Error) -> Self {
        HaliteError::new(
            &format!("Serialization error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}
