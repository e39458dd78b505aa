use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True for failures of the generative-language or embedding service.
    pub fn is_service_error(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Inference(_) | Error::Embedding(_))
    }

    /// True for failures of the record store.
    pub fn is_persistence_error(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(Error::Inference("quota".to_string()).is_service_error());
        assert!(Error::Embedding("timeout".to_string()).is_service_error());
        assert!(!Error::Storage("locked".to_string()).is_service_error());
        assert!(Error::Database("constraint".to_string()).is_persistence_error());
        assert_eq!(
            Error::Config("missing key".to_string()).to_string(),
            "Configuration error: missing key"
        );
    }
}
