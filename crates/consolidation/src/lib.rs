//! Trap Consolidation Engine
//!
//! Routes traps through ignore and accept groups, then forwards them,
//! folds them into a rolling-window consolidation, or accumulates them
//! into a scheduled digest. A background sweeper flushes what is due.

mod clock;
mod engine;
mod sink;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::ConsolidationEngine;
pub use sink::{MemorySink, Notification, NotificationSink, TracingSink};
pub use sweeper::{Sweeper, SweeperHandle, DEFAULT_SWEEP_INTERVAL};

use async_trait::async_trait;
use std::sync::Arc;
use trap_model::TrapEvent;

/// What happened to an accepted trap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Sent on individually
    Forwarded,
    /// Counted into an active rolling-window consolidation
    Absorbed,
    /// Added to a schedule digest below its limit
    Accumulated,
    /// Digest limit reached but the last send was too recent
    Withheld,
    /// Digest limit reached and the digest went out
    DigestSent,
}

/// Result of classifying one trap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Matched an ignore group
    Ignored { group: String },
    /// Matched an accept group
    Accepted { group: String, outcome: Outcome },
    /// Left to a healthy peer
    Deferred,
    /// No group matched; the trap stays unhandled
    Unmatched,
}

impl Classification {
    /// Short label for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Ignored { .. } => "ignored",
            Classification::Accepted { outcome, .. } => match outcome {
                Outcome::Forwarded => "forwarded",
                Outcome::Absorbed => "absorbed",
                Outcome::Accumulated => "accumulated",
                Outcome::Withheld => "withheld",
                Outcome::DigestSent => "digest_sent",
            },
            Classification::Deferred => "deferred",
            Classification::Unmatched => "unmatched",
        }
    }
}

/// Anything that can take responsibility for an inbound trap
#[async_trait]
pub trait EventClassifier: Send + Sync {
    /// Classify the trap, marking it handled unless nothing matched
    async fn classify(&self, event: &TrapEvent) -> Classification;
}

#[async_trait]
impl<C> EventClassifier for Arc<C>
where
    C: EventClassifier + ?Sized,
{
    async fn classify(&self, event: &TrapEvent) -> Classification {
        (**self).classify(event).await
    }
}
