use thiserror::Error;

/// Raised while reading a filter script, before anything is compiled.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid script document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Name {0} is bound more than once")]
    DuplicateName(String),

    #[error("Invalid rule {rule} in filter {filter}: {reason}")]
    InvalidRule {
        filter: String,
        rule: usize,
        reason: String,
    },

    #[error("Invalid global {name}: {reason}")]
    InvalidGlobal { name: String, reason: String },
}
