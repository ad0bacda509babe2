//! Peer liveness probes

use crate::error::FailoverError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, warn};

/// Answers whether the peer instance is up
#[async_trait]
pub trait PeerProbe: Send + Sync {
    /// Never fails; any error means the peer is not alive
    async fn is_alive(&self) -> bool;
}

#[async_trait]
impl<P> PeerProbe for std::sync::Arc<P>
where
    P: PeerProbe + ?Sized,
{
    async fn is_alive(&self) -> bool {
        (**self).is_alive().await
    }
}

/// Probes the peer's liveness endpoint with an HTTP GET; any 2xx is alive
#[derive(Debug, Clone)]
pub struct HttpPeerProbe {
    client: Client,
    url: Url,
}

impl HttpPeerProbe {
    /// Parse `url` and build a client. `timeout` bounds each probe; without
    /// one a hanging peer stalls the gate until the connection gives up.
    pub fn new(url: &str, timeout: Option<Duration>) -> Result<Self, FailoverError> {
        let parsed = Url::parse(url).map_err(|e| FailoverError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(FailoverError::UnsupportedScheme(other.to_string())),
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            url: parsed,
        })
    }
}

#[async_trait]
impl PeerProbe for HttpPeerProbe {
    async fn is_alive(&self) -> bool {
        match self.client.get(self.url.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("primary {} is alive", self.url);
                true
            }
            Ok(response) => {
                warn!("primary gave non-2xx response: {}", response.status());
                false
            }
            Err(e) => {
                warn!("error contacting primary: {}", e);
                false
            }
        }
    }
}
