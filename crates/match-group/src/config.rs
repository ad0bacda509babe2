//! Group configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default rolling window size in minutes
pub const DEFAULT_MINUTES: u32 = 15;

/// Default number of traps forwarded per window before consolidating
pub const DEFAULT_LIMIT: u32 = 3;

/// Configuration for a single match group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Sender host names or IPs; `%` marks a textual prefix wildcard
    pub sender: Vec<String>,

    /// Variable predicate
    pub var: Option<VarConfig>,

    /// Regex searched for in the newline-joined values
    pub find: Option<String>,

    /// Window size in minutes (also the minimum spacing of schedule digests)
    pub minutes: u32,

    /// Traps allowed per window before consolidating; 0 disables consolidation
    pub limit: u32,

    /// Comma-separated `HH:MM` digest times
    pub schedule: Option<String>,

    /// OID to placeholder name
    pub rename: HashMap<String, String>,

    /// Notification destinations
    pub forward: Vec<ForwardConfig>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            sender: Vec::new(),
            var: None,
            find: None,
            minutes: DEFAULT_MINUTES,
            limit: DEFAULT_LIMIT,
            schedule: None,
            rename: HashMap::new(),
            forward: Vec::new(),
        }
    }
}

/// `var.oid` / `var.regex`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarConfig {
    pub oid: String,
    #[serde(default)]
    pub regex: Option<String>,
}

/// One notification destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    /// Recipient addresses
    pub address: Vec<String>,

    /// Template path; first rendered line is the subject unless `no_subject`
    #[serde(default)]
    pub template: Option<String>,

    #[serde(default)]
    pub no_subject: bool,

    /// Domain used for the sender address
    #[serde(default = "default_domain")]
    pub domain: String,
}

fn default_domain() -> String {
    "localhost".to_string()
}
