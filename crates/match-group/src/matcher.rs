//! Sender and variable filters

use regex::Regex;
use std::net::{IpAddr, ToSocketAddrs};
use trap_model::{Oid, TrapEvent};
use tracing::{debug, error};

/// Wildcard marker in sender patterns
const WILDCARD: char = '%';

/// One entry of a group's `sender` list
#[derive(Debug, Clone)]
pub enum SenderPattern {
    /// Matches senders whose textual address starts with the prefix
    Prefix(String),
    /// Exact host, resolved when the group is built. An empty address list
    /// means resolution failed and the pattern never matches.
    Host { host: String, addrs: Vec<IpAddr> },
}

impl SenderPattern {
    /// Parse a pattern, resolving host names through the system resolver
    pub fn parse(group: &str, pattern: &str) -> Self {
        let pattern = pattern.trim();
        if let Some(at) = pattern.find(WILDCARD) {
            return SenderPattern::Prefix(pattern[..at].to_string());
        }

        let addrs = match pattern.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => resolve(group, pattern),
        };

        SenderPattern::Host {
            host: pattern.to_string(),
            addrs,
        }
    }

    /// Whether `sender` satisfies this pattern
    pub fn matches(&self, sender: &IpAddr) -> bool {
        match self {
            SenderPattern::Prefix(prefix) => sender.to_string().starts_with(prefix.as_str()),
            SenderPattern::Host { addrs, .. } => addrs.contains(sender),
        }
    }
}

fn resolve(group: &str, host: &str) -> Vec<IpAddr> {
    match (host, 0u16).to_socket_addrs() {
        Ok(resolved) => {
            let mut addrs: Vec<IpAddr> = resolved.map(|a| a.ip()).collect();
            addrs.dedup();
            if addrs.is_empty() {
                error!("[{}] bad sender: {} resolved to no addresses", group, host);
            } else {
                debug!("[{}] sender {} resolved to {:?}", group, host, addrs);
            }
            addrs
        }
        Err(e) => {
            error!("[{}] bad sender: {} ({})", group, host, e);
            Vec::new()
        }
    }
}

/// `var.oid` with an optional whole-value regex
#[derive(Debug, Clone)]
pub struct VarPredicate {
    oid: Oid,
    value: Option<Regex>,
    source: Option<String>,
}

impl VarPredicate {
    /// Build a predicate; `pattern` must match the entire bound value
    pub fn new(oid: Oid, pattern: Option<&str>) -> Result<Self, regex::Error> {
        let value = pattern
            .map(|p| Regex::new(&format!("^(?:{})$", p)))
            .transpose()?;
        Ok(Self {
            oid,
            value,
            source: pattern.map(str::to_string),
        })
    }

    /// The first binding with our OID decides; without one the predicate fails
    pub fn matches(&self, event: &TrapEvent) -> bool {
        match event.binding(&self.oid) {
            Some(binding) => match &self.value {
                Some(re) => re.is_match(&binding.value.to_string()),
                None => true,
            },
            None => false,
        }
    }
}

impl std::fmt::Display for VarPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.oid)?;
        if let Some(source) = &self.source {
            write!(f, "={}", source)?;
        }
        Ok(())
    }
}
