use std::error::Error as StdError;

/// Common error type for the BoardPilot workspace.
///
/// Backend implementations (sqlite, external authorization services, ...)
/// should preserve the underlying error chain via `Error::backend`.
///
/// "Approval required" is deliberately absent: a gated call that is
/// waiting on a human is a normal dispatcher outcome, not an error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("approval denied: {0}")]
    ApprovalDenied(String),

    #[error("rate limit exceeded; retry after {retry_after_seconds}s")]
    LimitExceeded { retry_after_seconds: u64 },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("backend error: {0}")]
    BackendMessage(String),
}

impl Error {
    pub fn backend(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
