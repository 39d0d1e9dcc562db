use thiserror::Error;

use crate::record::ValidationError;

#[derive(Debug, Error)]
pub enum KirokuError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("rank {order} is already taken by another show")]
    OrderTaken { order: u32 },

    #[error("store is closed")]
    StoreClosed,

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid show: {0}")]
    Validation(ValidationError),

    #[error("import failed: {0}")]
    Import(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for KirokuError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}
