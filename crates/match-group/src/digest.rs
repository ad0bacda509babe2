//! Digest accumulator

use trap_model::TrapEvent;

/// Most recent trap plus the number of traps folded in since the last flush
#[derive(Debug, Default)]
pub struct Digest {
    latest: Option<TrapEvent>,
    count: usize,
}

impl Digest {
    /// Fold one more trap in
    pub fn record(&mut self, event: &TrapEvent) {
        self.latest = Some(event.clone());
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_none()
    }

    pub fn latest(&self) -> Option<&TrapEvent> {
        self.latest.as_ref()
    }

    /// Take the snapshot and count, leaving the accumulator empty.
    /// Returns `None` (and changes nothing) when nothing was recorded.
    pub fn take(&mut self) -> Option<(TrapEvent, usize)> {
        let latest = self.latest.take()?;
        let count = std::mem::take(&mut self.count);
        Some((latest, count))
    }
}
