//! Error handling and custom error types
//!
//! Provides unified error handling across the media layer using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage backend error [{bucket}/{key}]: {message}")]
    Backend {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Upload exceeds maximum size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),
}

impl Error {
    pub fn backend(bucket: &str, key: &str, message: impl Into<String>) -> Self {
        Error::Backend {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn missing_bucket(bucket: &str, key: &str) -> Self {
        Self::backend(bucket, key, format!("bucket {} does not exist", bucket))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_names_bucket_and_key() {
        let err = Error::missing_bucket("images", "cat.png");
        let message = err.to_string();
        assert!(message.contains("images/cat.png"));
        assert!(message.contains("bucket images does not exist"));
    }

    #[test]
    fn test_configuration_error_display() {
        let err = Error::Configuration("CDN URL not configured".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: CDN URL not configured"
        );
    }
}
