use thiserror::Error;
use std::io;

use crate::store::StoreError;
use crate::transfer::ImportError;

pub type ServiceResult<T> = core::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("api error: {0}")]
    ApiError(String),
    #[error("{0}")]
    IoError(#[from] io::Error),
    #[error("{0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// True for errors caused by what the user typed rather than by the system.
    pub fn is_user_input(&self) -> bool {
        match self {
            ServiceError::Store(e) => e.is_user_input(),
            _ => false,
        }
    }
}
