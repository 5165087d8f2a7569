use thiserror::Error;

/// Errors produced by the ingestion, detection, remediation and planning
/// stages of the core pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required business-rules or remediation-logic config key was
    /// missing or malformed. Unrecoverable: the session aborts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A CSV header did not match the expected schema for its tier.
    #[error("header mismatch in {file}: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        /// The CSV file being read.
        file: String,
        /// Expected column names.
        expected: Vec<String>,
        /// Column names actually present.
        found: Vec<String>,
    },

    /// Underlying CSV parsing failure.
    #[error("csv error reading {file}: {source}")]
    Csv {
        /// The CSV file being read.
        file: String,
        /// The underlying parse error.
        #[source]
        source: csv::Error,
    },

    /// I/O failure reading an input file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A rule referenced a JSON pointer path that did not resolve against
    /// the snapshot or event evidence.
    #[error("undefined template token `{0}`")]
    UndefinedToken(String),

    /// Remediation templates for one integration formed a dependency cycle.
    #[error("circular dependency among remediation actions for integration {0}")]
    CircularDependency(String),

    /// serde_json (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout `auditor-core`.
pub type Result<T> = std::result::Result<T, Error>;
