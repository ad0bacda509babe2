//! Model Error Types

use thiserror::Error;

/// Errors raised while building model values from text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Identifier is empty or contains a non-numeric arc
    #[error("Invalid OID: {0:?}")]
    InvalidOid(String),
}
