use thiserror::Error;

/// Errors that can occur within the store subsystem.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A store must be constructed with a non-empty owner name.
    #[error("Store owner name must not be empty")]
    InvalidOwner,

    /// The underlying medium rejected a write.
    #[error("Medium error: {0}")]
    Medium(#[from] cogs_core::CoreError),

    /// A value could not be serialized for the medium.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
