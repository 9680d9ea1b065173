use nfproxy_core::error::{ConfigurationError, DispatchError};
use nfproxy_script::ScriptError;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Invalid trace: {0}")]
    Trace(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Replay task failed: {0}")]
    Join(#[from] JoinError),
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Trace(err.to_string())
    }
}
