use thiserror::Error;

/// The library's member set could not be turned into a mirror.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("stream library '{library}' cannot be enumerated: {reason}")]
    Unavailable { library: String, reason: String },
    #[error("stream library '{library}' exposes no members")]
    Empty { library: String },
    #[error("stream library '{library}' reports member '{name}' more than once")]
    DuplicateMember { library: String, name: String },
}

/// Failure raised by a library operation itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("{operation}: invalid arguments: {reason}")]
    InvalidArguments { operation: String, reason: String },
    #[error("{operation} failed: {reason}")]
    Failed { operation: String, reason: String },
}

impl OperationError {
    pub fn invalid_arguments(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        OperationError::InvalidArguments {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        OperationError::Failed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of a call made through a factory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("no member named '{0}'")]
    UnknownMember(String),
    #[error("member '{0}' is a value, not an operation")]
    NotAnOperation(String),
    #[error("member '{0}' is an operation, not a value")]
    NotAValue(String),
    #[error(transparent)]
    Operation(#[from] OperationError),
}
