use super::config::ConfigError;
use crate::core::chemistry::ParamLoadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Element table error: {source}")]
    Elements {
        #[from]
        source: ParamLoadError,
    },

    #[error("Entity capacity of {capacity} reached")]
    Capacity { capacity: usize },

    #[error("Unknown element: {0}")]
    UnknownElement(String),

    #[error("Entity index {index} is out of range (have {len})")]
    EntityOutOfRange { index: usize, len: usize },

    #[error("Malformed snapshot: {0}")]
    Snapshot(String),

    #[error("Chemistry worker error: {0}")]
    Worker(String),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
