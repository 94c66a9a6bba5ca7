use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The path string could not be split into segments.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A filter formula failed to compile or evaluate. Only ever handed to
    /// the diagnostic hook; matching treats it as "no match".
    #[error("formula error: {0}")]
    Formula(String),

    /// A special selector operation was missing or failed.
    #[error("operation error: {0}")]
    Operation(String),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
