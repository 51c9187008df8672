use std::fmt;

#[derive(Debug)]
pub enum BackfillError {
    DocumentStore(String),
    Database(String),
    Config(String),
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Other(String),
}

impl fmt::Display for BackfillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackfillError::DocumentStore(e) => write!(f, "Document store request failed: {}", e),
            BackfillError::Database(e) => write!(f, "Postgresql request failed: {}", e),
            BackfillError::Config(e) => write!(f, "Configuration error: {}", e),
            BackfillError::Io(e) => write!(f, "IO error: {}", e),
            BackfillError::Serialization(e) => write!(f, "Serialization error: {}", e),
            BackfillError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for BackfillError {}

impl From<tokio_postgres::Error> for BackfillError {
    fn from(err: tokio_postgres::Error) -> Self {
        BackfillError::Database(err.to_string())
    }
}

impl From<bb8::RunError<tokio_postgres::Error>> for BackfillError {
    fn from(err: bb8::RunError<tokio_postgres::Error>) -> Self {
        match err {
            bb8::RunError::User(e) => BackfillError::Database(e.to_string()),
            bb8::RunError::TimedOut => BackfillError::Database("timed out waiting for a pooled connection".to_string()),
        }
    }
}

impl From<reqwest::Error> for BackfillError {
    fn from(err: reqwest::Error) -> Self {
        BackfillError::DocumentStore(err.to_string())
    }
}

impl From<std::io::Error> for BackfillError {
    fn from(err: std::io::Error) -> Self {
        BackfillError::Io(err)
    }
}

impl From<serde_json::Error> for BackfillError {
    fn from(err: serde_json::Error) -> Self {
        BackfillError::Serialization(err)
    }
}

impl From<String> for BackfillError {
    fn from(err: String) -> Self {
        BackfillError::Other(err)
    }
}

impl From<&str> for BackfillError {
    fn from(err: &str) -> Self {
        BackfillError::Other(err.to_string())
    }
}
