use thiserror::Error;

/// Raised while compiling a filter script. Always detected before any packet
/// is processed; the previously compiled configuration stays in service.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Invalid protocol '{0}'")]
    UnknownProtocol(String),

    #[error("Filter {0} not found")]
    FilterNotFound(String),

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("Invalid type annotation {annotation} for parameter '{param}' of function {filter}")]
    InvalidAnnotation {
        filter: String,
        param: String,
        annotation: String,
    },

    #[error("Missing type annotation for parameter '{param}' of function {filter}")]
    MissingAnnotation { filter: String, param: String },

    #[error("Invalid value for {name}: {reason}")]
    InvalidOverride { name: String, reason: String },
}

/// Raised by a dispatch when a filter or extractor breaks its contract.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Invalid result from function {handler}: {reason}")]
    InvalidFilterResult { handler: String, reason: String },
}
