use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] anyhow::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
