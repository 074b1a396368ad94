//! Error handling for nifty-components
//!
//! This module defines the error taxonomy shared by every node and a Result
//! alias for use throughout the crate. Every variant surfaces to the host
//! scheduler as a node failure; nothing here is retried or recovered locally.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for component operations
#[derive(Error, Debug)]
pub enum NiftyError {
    /// Too few input slots were bound to a node
    #[error("{node} has {bound} input slots but requires at least {required}")]
    InputCount {
        node: String,
        bound: usize,
        required: usize,
    },

    /// Malformed or unsupported array payload
    #[error("Codec error: {0}")]
    Codec(String),

    /// Missing or invalid persistent store
    #[error("Store not found: {}", path.display())]
    StoreNotFound { path: PathBuf },

    /// Unknown column or incompatible column shape
    #[error("Column error on '{column}': {message}")]
    Column { column: String, message: String },

    /// Row window outside the table bounds
    #[error("Row range {start}..{end} is outside table with {n_rows} rows")]
    Range { start: u64, end: u64, n_rows: u64 },

    /// The numeric kernel rejected its inputs or failed
    #[error("Kernel error: {0}")]
    Kernel(String),

    /// Invalid or unknown configuration parameter
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store backend failure not covered by the other variants
    #[error("Store error: {0}")]
    Store(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<NiftyError>,
    },
}

/// Coarse error classification reported to the host alongside the node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InputCount,
    Codec,
    StoreNotFound,
    Column,
    Range,
    Kernel,
    Config,
    Store,
    Io,
    Serialization,
}

impl NiftyError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        NiftyError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify the error, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NiftyError::InputCount { .. } => ErrorKind::InputCount,
            NiftyError::Codec(_) => ErrorKind::Codec,
            NiftyError::StoreNotFound { .. } => ErrorKind::StoreNotFound,
            NiftyError::Column { .. } => ErrorKind::Column,
            NiftyError::Range { .. } => ErrorKind::Range,
            NiftyError::Kernel(_) => ErrorKind::Kernel,
            NiftyError::Config(_) => ErrorKind::Config,
            NiftyError::Store(_) => ErrorKind::Store,
            NiftyError::Io(_) => ErrorKind::Io,
            NiftyError::Serialization(_) => ErrorKind::Serialization,
            NiftyError::WithContext { source, .. } => source.kind(),
        }
    }

    /// Shorthand for a column error
    pub fn column(column: impl Into<String>, message: impl Into<String>) -> Self {
        NiftyError::Column {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a codec error
    pub fn codec(message: impl Into<String>) -> Self {
        NiftyError::Codec(message.into())
    }
}

impl From<serde_json::Error> for NiftyError {
    fn from(err: serde_json::Error) -> Self {
        NiftyError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for NiftyError {
    fn from(err: toml::de::Error) -> Self {
        NiftyError::Serialization(err.to_string())
    }
}

/// Result type alias for component operations
pub type Result<T> = std::result::Result<T, NiftyError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
