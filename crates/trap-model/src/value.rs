//! Variable binding values

use crate::Oid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Value bound to an OID in a trap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// No value (e.g. a bare OID in a request)
    Null,
    /// Signed 32/64-bit integer
    Integer(i64),
    /// Unsigned integer / gauge
    Unsigned(u64),
    /// Monotonic counter
    Counter(u64),
    /// Hundredths of a second since some epoch
    TimeTicks(u64),
    /// Octet string rendered as text
    Text(String),
    /// Object identifier value
    Oid(Oid),
    /// IP address value
    IpAddress(IpAddr),
}

impl Value {
    /// Whether this value is the null placeholder
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Unsigned(v) | Value::Counter(v) => write!(f, "{}", v),
            Value::TimeTicks(ticks) => {
                let total_secs = ticks / 100;
                let days = total_secs / 86_400;
                let hours = (total_secs % 86_400) / 3600;
                let minutes = (total_secs % 3600) / 60;
                let seconds = total_secs % 60;
                let hundredths = ticks % 100;
                write!(
                    f,
                    "{} days, {}:{:02}:{:02}.{:02}",
                    days, hours, minutes, seconds, hundredths
                )
            }
            Value::Text(s) => f.write_str(s),
            Value::Oid(oid) => write!(f, "{}", oid),
            Value::IpAddress(ip) => write!(f, "{}", ip),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}
