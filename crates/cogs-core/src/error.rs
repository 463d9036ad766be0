use thiserror::Error;

/// Errors from the core abstractions (medium writes, configuration).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration file or environment override failed to load.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single medium entry exceeded the per-entry size ceiling.
    #[error("Entry too large: {size} bytes (max {max})")]
    EntryTooLarge { size: usize, max: usize },

    /// A write string the medium could not parse (e.g. missing `name=`).
    #[error("Malformed medium entry: {0}")]
    MalformedEntry(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
