//! Failover gate

use crate::probe::PeerProbe;
use async_trait::async_trait;
use consolidation::{Classification, EventClassifier};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use trap_model::TrapEvent;
use tracing::{debug, info};

/// How long a probe result is trusted when none is configured
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct ProbeState {
    alive: bool,
    last_check: Option<Instant>,
}

/// Defers every trap to the peer while it is alive, otherwise hands the
/// trap to the wrapped classifier
pub struct FailoverGate<C, P> {
    inner: C,
    probe: P,
    check_interval: Duration,
    state: Mutex<ProbeState>,
}

impl<C, P> FailoverGate<C, P>
where
    C: EventClassifier,
    P: PeerProbe,
{
    pub fn new(inner: C, probe: P, check_interval: Duration) -> Self {
        info!("Failover gate enabled, checking primary every {:?}", check_interval);
        Self {
            inner,
            probe,
            check_interval,
            state: Mutex::new(ProbeState::default()),
        }
    }

    /// Cached peer state, re-probed once `check_interval` has passed.
    /// Concurrent callers wait for the single in-flight probe.
    pub async fn peer_alive(&self) -> bool {
        let mut state = self.state.lock().await;

        let stale = state
            .last_check
            .map_or(true, |at| at.elapsed() > self.check_interval);
        if stale {
            let alive = self.probe.is_alive().await;
            if alive != state.alive {
                info!("primary is {}", if alive { "alive" } else { "not alive" });
            }
            state.alive = alive;
            state.last_check = Some(Instant::now());
        }

        state.alive
    }
}

#[async_trait]
impl<C, P> EventClassifier for FailoverGate<C, P>
where
    C: EventClassifier,
    P: PeerProbe,
{
    async fn classify(&self, event: &TrapEvent) -> Classification {
        if self.peer_alive().await {
            debug!("deferring trap from {} to primary", event.sender);
            event.mark_handled();
            metrics::counter!("trapper_deferred_total").increment(1);
            return Classification::Deferred;
        }

        info!("secondary: processing trap from {}", event.sender);
        self.inner.classify(event).await
    }
}
