//! Notification sinks

use chrono::{DateTime, Local};
use match_group::{MatchGroup, Placeholders};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Outbound side of the engine.
///
/// Called with engine locks held, so implementations must not block on
/// delivery. Failures are the sink's own business; the engine never
/// rolls back its accounting.
pub trait NotificationSink: Send + Sync {
    /// Individual trap or schedule digest, rendered from `placeholders`
    fn send(&self, group: &MatchGroup, placeholders: &Placeholders);

    /// Rolling-window summary: `count` traps since `start`
    fn send_consolidated(&self, group: &MatchGroup, start: DateTime<Local>, count: usize);
}

/// Logs every notification once per configured destination
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn send(&self, group: &MatchGroup, placeholders: &Placeholders) {
        if group.forwarders().is_empty() {
            debug!("[{}] no destinations configured", group.name());
        }

        for forward in group.forwarders() {
            info!(
                group = group.name(),
                to = ?forward.address,
                template = forward.template.as_deref().unwrap_or("-"),
                sender = placeholders.get("sender").map(String::as_str).unwrap_or(""),
                count = placeholders.get("count").map(String::as_str).unwrap_or("1"),
                body = placeholders.get("body").map(String::as_str).unwrap_or(""),
                "notification"
            );
        }
    }

    fn send_consolidated(&self, group: &MatchGroup, start: DateTime<Local>, count: usize) {
        for forward in group.forwarders() {
            let subject = (!forward.no_subject).then(|| format!("{} {}", group.name(), count));
            info!(
                group = group.name(),
                to = ?forward.address,
                subject = subject.as_deref().unwrap_or("-"),
                "{} {} since {}",
                group.name(),
                count,
                start
            );
        }
    }
}

/// A notification as captured by [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Individual {
        group: String,
        placeholders: Placeholders,
    },
    Consolidated {
        group: String,
        start: DateTime<Local>,
        count: usize,
    },
}

impl Notification {
    pub fn group(&self) -> &str {
        match self {
            Notification::Individual { group, .. } | Notification::Consolidated { group, .. } => {
                group
            }
        }
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything captured so far
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, notification: Notification) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

impl NotificationSink for MemorySink {
    fn send(&self, group: &MatchGroup, placeholders: &Placeholders) {
        self.push(Notification::Individual {
            group: group.name().to_string(),
            placeholders: placeholders.clone(),
        });
    }

    fn send_consolidated(&self, group: &MatchGroup, start: DateTime<Local>, count: usize) {
        self.push(Notification::Consolidated {
            group: group.name().to_string(),
            start,
            count,
        });
    }
}
