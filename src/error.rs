use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Remote source error: {0}")]
    Remote(String),

    #[error("Batch {batch} of {} failed: {source}", .file.display())]
    Batch {
        file: PathBuf,
        batch: usize,
        #[source]
        source: StoreError,
    },

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<StoreError> for ProcessingError {
    fn from(err: StoreError) -> Self {
        if err.is_cancelled() {
            ProcessingError::Cancelled
        } else {
            ProcessingError::Store(err)
        }
    }
}

impl From<config::ConfigError> for ProcessingError {
    fn from(err: config::ConfigError) -> Self {
        ProcessingError::Config(err.to_string())
    }
}

/// Failure to decode one source line. Never fatal for the file being read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("line does not match the fixed-width station layout")]
    StationLayout,

    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("invalid station code: '{0}'")]
    StationCode(String),

    #[error("invalid {field}: '{value}'")]
    Number { field: &'static str, value: String },

    #[error("invalid {field}: '{value}'")]
    Date { field: &'static str, value: String },

    #[error("value out of range: {0}")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Expected to succeed when re-executed (lock timeout, deadlock victim, throttling, lost connection).
    Transient,
    Fatal,
    /// The run was cancelled while the operation waited to be re-executed.
    Cancelled,
}

#[derive(Error, Debug, Clone)]
#[error("{kind:?} store failure: {message}")]
pub struct StoreError {
    pub kind: FaultKind,
    pub message: String,
}

impl StoreError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Fatal,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Cancelled,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FaultKind::Transient
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == FaultKind::Cancelled
    }
}
