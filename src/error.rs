use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Language model error: {0}")]
    Llm(String),

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Documents directory not found: {0}")]
    DocsDirMissing(PathBuf),

    #[error(
        "No documents found in {dir}. Add {kinds} files to that folder and start again."
    )]
    EmptyCorpus { dir: PathBuf, kinds: String },

    #[error(
        "Could not load the vector index from {path}: {reason}. Delete the index directory to rebuild it."
    )]
    IndexLoad { path: PathBuf, reason: String },

    #[error("Embedding dimension mismatch: index holds {expected}-d vectors, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl RagError {
    pub fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RagError::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for RagError {
    fn from(e: reqwest::Error) -> Self {
        RagError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
