use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

/// Every condition that stops a run. Per-row problems are not errors; they are
/// collected as [`crate::data::model::RowIssue`] and the row is dropped.
#[derive(Debug, Error)]
pub enum Error {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("could not parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("credential file not found or empty: {}", .0.display())]
    CredentialNotFound(PathBuf),

    #[error("text-generation service failed: {0}")]
    Service(String),

    #[error("anomaly model error: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn parse(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Error::Parse {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
