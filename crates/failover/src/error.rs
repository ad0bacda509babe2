//! Failover error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FailoverError {
    #[error("Invalid primary URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported primary URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
