use thiserror::Error;

/// Errors raised while constructing the hosted backend clients
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid backend url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build http client: {0}")]
    Client(String),
}
