use thiserror::Error;

/// Errors raised by the safety controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A destructive operation was attempted while the store requires an
    /// explicit confirmation token that was not supplied or did not match.
    #[error("confirmation required: {0}")]
    ConfirmationRequired(String),

    /// An environment variable held a value that could not be parsed into
    /// the expected type.
    #[error("invalid safety configuration for {key}: {reason}")]
    InvalidConfig {
        /// The environment variable name.
        key: String,
        /// Why parsing failed.
        reason: String,
    },
}

/// Result alias for safety-controller operations.
pub type Result<T> = std::result::Result<T, Error>;
