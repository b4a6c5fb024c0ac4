use stores::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn not_found(name: &str) -> Self { Self::NotFound(format!("service {} not found", name)) }
}
