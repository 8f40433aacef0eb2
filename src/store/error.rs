use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization/deserialization error in {entry}: {reason}")]
    Serialization { entry: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
