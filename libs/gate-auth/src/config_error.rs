use thiserror::Error;

/// Fatal problems in the route table, detected before the gate starts serving
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("rule #{index} ({pattern}) is misconfigured: {reason}")]
    MisconfiguredRule {
        index: usize,
        pattern: String,
        reason: String,
    },

    #[error(
        "rule #{index} ({pattern}) redirects to {target}, which rule #{target_index} ({target_pattern}) denies to the same caller"
    )]
    RedirectLoop {
        index: usize,
        pattern: String,
        target: String,
        target_index: usize,
        target_pattern: String,
    },
}

impl ConfigError {
    pub(crate) fn misconfigured(index: usize, pattern: &str, reason: impl Into<String>) -> Self {
        ConfigError::MisconfiguredRule {
            index,
            pattern: pattern.to_owned(),
            reason: reason.into(),
        }
    }
}
