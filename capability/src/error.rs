use thiserror::Error;

/// Token-layer failures.
///
/// `Integrity`, `IdentityMismatch` and `Expired` must all surface to clients
/// as the same authorization failure; distinguishing them would leak which
/// check rejected the token. The variants exist for logs and tests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("server configuration error: {0}")]
    Config(&'static str),

    #[error("capability token failed verification")]
    Integrity,

    #[error("capability token was issued to a different caller")]
    IdentityMismatch,

    #[error("capability token has expired")]
    Expired,
}

/// Upstream resource creation failed. Carries the provider's message, which
/// is acceptable to pass through to the caller.
#[derive(Debug, Error)]
#[error("upstream provisioning failed: {message}")]
pub struct ProvisionError {
    pub message: String,
}

impl ProvisionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failures of the issuance path as a whole.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Token(#[from] TokenError),
}
