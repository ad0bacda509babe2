//! Group Error Types

use thiserror::Error;
use trap_model::ModelError;

/// Errors building a match group from configuration
#[derive(Debug, Error)]
pub enum GroupError {
    /// A `var.regex` or `find` pattern failed to compile
    #[error("[{group}] invalid {field} pattern: {source}")]
    InvalidPattern {
        group: String,
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    /// A `var.oid` or `rename` key is not a dotted OID
    #[error("[{group}] {source}")]
    InvalidOid {
        group: String,
        #[source]
        source: ModelError,
    },
}
