use thiserror::Error;

use truthwatch_core::monitor::StoreError;

pub mod memory;
pub mod monitor;

pub use memory::InMemoryMonitorRepository;
pub use monitor::SqlMonitorRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Storage(error.to_string())
    }
}
