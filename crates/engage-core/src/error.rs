//! Error types for engage-core

use thiserror::Error;

/// Result type alias using engage-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Engage
#[derive(Error, Debug)]
pub enum Error {
    /// Settings or database file not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Two resources share an id
    #[error("Duplicate resource id: {id}")]
    DuplicateResource { id: String },
}

impl Error {
    /// Create a file not found error
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a duplicate resource error
    pub fn duplicate_resource(id: impl Into<String>) -> Self {
        Self::DuplicateResource { id: id.into() }
    }
}
