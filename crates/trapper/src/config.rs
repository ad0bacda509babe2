//! Service configuration

use consolidation::DEFAULT_SWEEP_INTERVAL;
use failover::DEFAULT_CHECK_INTERVAL;
use match_group::GroupConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Listen address used when none is configured
pub const DEFAULT_ADDRESS: &str = "udp://127.0.0.1:162";

/// Standard SNMP trap port, assumed for UDP addresses without one
pub const DEFAULT_UDP_PORT: u16 = 162;

/// Environment variable prefix, e.g. `TRAPPER__PRIMARY`
pub const ENV_PREFIX: &str = "TRAPPER";

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ingress listen address, `udp://host[:port]` or `tcp://host:port`
    pub address: String,

    /// TCP port of the liveness endpoint
    pub liveness: u16,

    /// Traps classified concurrently
    pub threads: usize,

    /// Liveness URL of the primary; setting it makes this instance a secondary
    pub primary: Option<String>,

    /// Seconds a primary probe result is trusted
    pub check_seconds: u64,

    /// Per-probe timeout; unbounded when unset
    pub probe_timeout_seconds: Option<u64>,

    /// Seconds between sweeps
    pub sweep_seconds: u64,

    /// Log output format
    pub log_format: LogFormat,

    /// Maximum log level
    pub log_level: String,

    /// Accept group names, in priority order
    pub accept: Vec<String>,

    /// Ignore group names, in priority order
    pub ignore: Vec<String>,

    /// Group sections by name
    pub groups: HashMap<String, GroupConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            liveness: 163,
            threads: 2,
            primary: None,
            check_seconds: DEFAULT_CHECK_INTERVAL.as_secs(),
            probe_timeout_seconds: None,
            sweep_seconds: DEFAULT_SWEEP_INTERVAL.as_secs(),
            log_format: LogFormat::Pretty,
            log_level: "info".to_string(),
            accept: Vec::new(),
            ignore: Vec::new(),
            groups: HashMap::new(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl AppConfig {
    /// Load a TOML file, then apply `TRAPPER__*` environment overrides
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    /// Parse configuration from TOML text, without environment overrides
    pub fn from_toml(text: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Parsed ingress address
    pub fn endpoint(&self) -> Result<Endpoint, AddressError> {
        Endpoint::parse(&self.address)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_seconds)
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_seconds.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_seconds.max(1))
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("accept")
        .with_list_parse_key("ignore")
}

/// Ingress address errors; all of them stop startup
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("Bad address {address}: {reason}")]
    Invalid { address: String, reason: String },

    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),

    #[error("Port must be specified for TCP: {0}")]
    MissingTcpPort(String),
}

/// Transport and bind address of the trap listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Udp { host: String, port: u16 },
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    pub fn parse(address: &str) -> Result<Self, AddressError> {
        let url = Url::parse(address).map_err(|e| AddressError::Invalid {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AddressError::Invalid {
                address: address.to_string(),
                reason: "missing host".to_string(),
            })?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        match url.scheme().to_ascii_lowercase().as_str() {
            "udp" => Ok(Endpoint::Udp {
                host,
                port: url.port().unwrap_or(DEFAULT_UDP_PORT),
            }),
            "tcp" => match url.port() {
                Some(port) => Ok(Endpoint::Tcp { host, port }),
                None => Err(AddressError::MissingTcpPort(address.to_string())),
            },
            _ => Err(AddressError::UnknownScheme(address.to_string())),
        }
    }

    pub fn host(&self) -> &str {
        match self {
            Endpoint::Udp { host, .. } | Endpoint::Tcp { host, .. } => host,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Endpoint::Udp { port, .. } | Endpoint::Tcp { port, .. } => *port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Udp { host, port } => write!(f, "udp://{}:{}", host, port),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}
