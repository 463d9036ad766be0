use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A controller must be constructed with a non-empty name.
    #[error("Controller name must not be empty")]
    InvalidName,

    /// No task with the given name is registered on this controller.
    #[error("Unknown task: {name}")]
    UnknownTask { name: String },

    /// The step machine cannot start with an empty step list.
    #[error("No steps registered")]
    NoSteps,

    /// The backing durable store failed.
    #[error("Store error: {0}")]
    Store(#[from] cogs_store::StoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
