use std::fmt;

use common::metrics::STORE_OPERATION_FAILURES_TOTAL;
use thiserror::Error;
use tracing::error;

/// Backend a store adapter talks to. Also the fixed connect order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreKind {
    Relational,
    Cache,
    Directory,
    Object,
}

impl StoreKind {
    pub const CONNECT_ORDER: [StoreKind; 4] =
        [StoreKind::Relational, StoreKind::Cache, StoreKind::Directory, StoreKind::Object];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Relational => "relational",
            StoreKind::Cache => "cache",
            StoreKind::Directory => "directory",
            StoreKind::Object => "object",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid {store} configuration: {message}")]
    Config { store: StoreKind, message: String },
    #[error("{store} connect failed: {message}")]
    Connect { store: StoreKind, message: String },
    #[error("schema {path} could not be applied: {message}")]
    Schema { path: String, message: String },
    #[error("{0} store is not connected")]
    Unavailable(StoreKind),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("{store} operation failed: {message}")]
    Operation { store: StoreKind, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn config(store: StoreKind, e: impl fmt::Display) -> Self {
        Self::Config { store, message: e.to_string() }
    }

    pub fn connect(store: StoreKind, e: impl fmt::Display) -> Self {
        Self::Connect { store, message: e.to_string() }
    }

    /// Log and count a failed operation, then hand it back to the caller as a value.
    pub(crate) fn operation(store: StoreKind, e: impl fmt::Display) -> Self {
        let message = e.to_string();
        error!(%store, error = %message, "store operation failed");
        STORE_OPERATION_FAILURES_TOTAL.with_label_values(&[store.as_str()]).inc();
        Self::Operation { store, message }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, StoreError::Config { .. })
    }
}
