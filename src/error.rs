use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LanternError {
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Failed to open generation at {path}: {message}")]
    IndexOpen { path: PathBuf, message: String },

    #[error("Index is closed: {0}")]
    IndexClosed(String),

    #[error("Stale snapshot: cached result was built against version {cached}, active version is {active}")]
    StaleSnapshot { cached: u64, active: u64 },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Tantivy error: {0}")]
    Tantivy(String),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("JSON error: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, LanternError>;

impl From<std::io::Error> for LanternError {
    fn from(e: std::io::Error) -> Self {
        LanternError::Io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for LanternError {
    fn from(e: tantivy::TantivyError) -> Self {
        LanternError::Tantivy(e.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for LanternError {
    fn from(e: tantivy::query::QueryParserError) -> Self {
        LanternError::QueryParse(e.to_string())
    }
}

impl From<serde_json::Error> for LanternError {
    fn from(e: serde_json::Error) -> Self {
        LanternError::Json(e.to_string())
    }
}
