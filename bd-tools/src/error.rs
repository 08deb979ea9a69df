use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("approval denied: {0}")]
    ApprovalDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl From<bd_core::Error> for ToolError {
    fn from(e: bd_core::Error) -> Self {
        match e {
            bd_core::Error::InvalidInput(msg) => Self::InvalidArguments(msg),
            bd_core::Error::NotFound(msg) => Self::NotFound(msg),
            bd_core::Error::Conflict(msg) => Self::Conflict(msg),
            bd_core::Error::PermissionDenied(msg) => Self::PermissionDenied(msg),
            bd_core::Error::ApprovalDenied(msg) => Self::ApprovalDenied(msg),
            other => Self::ExecutionFailed(other.to_string()),
        }
    }
}
