use figgy_core_types::{FileId, ResourceId};
use thiserror::Error;

/// Result type alias using FiggyError
pub type Result<T> = std::result::Result<T, FiggyError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that callers (and log consumers)
/// can branch on without matching on the full `FiggyError` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Persistence
    StaleObject,
    NotFound,
    FileNotFound,
    ReadOnly,
    Persistence,

    // Integration/IO
    TransientIo,
    Io,
    Timeout,
    Serialization,

    // Input/handlers
    InvalidInput,
    HandlerFailed,
    Config,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::StaleObject => "ERR_STALE_OBJECT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::FileNotFound => "ERR_FILE_NOT_FOUND",
            ExErrorKind::ReadOnly => "ERR_READ_ONLY",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::TransientIo => "ERR_TRANSIENT_IO",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::HandlerFailed => "ERR_HANDLER_FAILED",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Classification fields for programmatic handling plus context for
/// debugging. Produced from `FiggyError` at logging boundaries.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context (resource id or file id)
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

const EPIPE: i32 = 32;
const EAGAIN: i32 = 11;
const EIO: i32 = 5;

fn is_transient(kind: std::io::ErrorKind, raw_os_error: Option<i32>) -> bool {
    match raw_os_error {
        Some(code) => matches!(code, EPIPE | EAGAIN | EIO),
        None => matches!(
            kind,
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::WouldBlock
        ),
    }
}

/// Error taxonomy for persistence pipeline operations
///
/// Adapters and handlers return these unchanged through every layer of the
/// pipeline; the only variant the pipeline raises on its own is `ReadOnly`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FiggyError {
    /// Optimistic lock conflict: the stored copy moved on since it was read
    #[error("Stale object: resource {id} was modified by another writer (expected lock version {expected:?}, found {actual:?})")]
    StaleObject {
        id: ResourceId,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    /// Resource id not present in the backend
    #[error("Object not found: {id}")]
    ObjectNotFound { id: String },

    /// Stored binary not present in the storage adapter
    #[error("File not found: {id}")]
    FileNotFound { id: FileId },

    /// Mutation attempted through a read-only adapter
    #[error("Adapter is read-only: {op} is not permitted")]
    ReadOnly { op: String },

    /// I/O failure, keeping the errno so callers can classify it
    #[error("I/O error during {op}: {message}")]
    Io {
        op: String,
        kind: std::io::ErrorKind,
        raw_os_error: Option<i32>,
        message: String,
    },

    /// Bounded wait expired
    #[error("Timed out after {after_ms}ms during {op}")]
    Timeout { op: String, after_ms: u64 },

    /// Backend failure that is not one of the typed conditions above
    #[error("Persistence error in {op}: {message}")]
    Persistence { op: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Raised by a lifecycle handler
    #[error("Handler {handler} failed: {reason}")]
    Handler { handler: String, reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FiggyError {
    /// Build an `Io` error from a `std::io::Error`
    pub fn io(op: impl Into<String>, err: &std::io::Error) -> Self {
        FiggyError::Io {
            op: op.into(),
            kind: err.kind(),
            raw_os_error: err.raw_os_error(),
            message: err.to_string(),
        }
    }

    /// Whether this is a pipe/again/io condition worth retrying immediately
    pub fn is_transient_io(&self) -> bool {
        match self {
            FiggyError::Io {
                kind, raw_os_error, ..
            } => is_transient(*kind, *raw_os_error),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FiggyError::ObjectNotFound { .. } | FiggyError::FileNotFound { .. }
        )
    }

    pub fn handler(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        FiggyError::Handler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}

impl From<FiggyError> for ExError {
    fn from(err: FiggyError) -> Self {
        match err {
            FiggyError::StaleObject { id, .. } => ExError::new(ExErrorKind::StaleObject)
                .with_entity_id(id.as_str())
                .with_message("Resource was modified by another writer"),

            FiggyError::ObjectNotFound { id } => ExError::new(ExErrorKind::NotFound)
                .with_entity_id(id)
                .with_message("Object not found"),

            FiggyError::FileNotFound { id } => ExError::new(ExErrorKind::FileNotFound)
                .with_entity_id(id.as_str())
                .with_message("File not found"),

            FiggyError::ReadOnly { op } => ExError::new(ExErrorKind::ReadOnly)
                .with_op(op)
                .with_message("Adapter is read-only"),

            FiggyError::Io {
                op,
                kind,
                raw_os_error,
                message,
            } => {
                let kind = if is_transient(kind, raw_os_error) {
                    ExErrorKind::TransientIo
                } else {
                    ExErrorKind::Io
                };
                ExError::new(kind).with_op(op).with_message(message)
            }

            FiggyError::Timeout { op, after_ms } => ExError::new(ExErrorKind::Timeout)
                .with_op(op)
                .with_message(format!("Timed out after {}ms", after_ms)),

            FiggyError::Persistence { op, message } => ExError::new(ExErrorKind::Persistence)
                .with_op(op)
                .with_message(message),

            FiggyError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            FiggyError::InvalidInput { reason } => {
                ExError::new(ExErrorKind::InvalidInput).with_message(reason)
            }

            FiggyError::Handler { handler, reason } => ExError::new(ExErrorKind::HandlerFailed)
                .with_op(handler)
                .with_message(reason),

            FiggyError::Config { message } => {
                ExError::new(ExErrorKind::Config).with_message(message)
            }

            FiggyError::Internal { message } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for FiggyError {
    fn from(err: serde_json::Error) -> Self {
        FiggyError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<::config::ConfigError> for FiggyError {
    fn from(err: ::config::ConfigError) -> Self {
        FiggyError::Config {
            message: err.to_string(),
        }
    }
}
