//! Daily digest schedule

use chrono::NaiveTime;
use std::fmt;
use tracing::{error, warn};

/// Ascending, duplicate-free list of daily `HH:MM` slots
///
/// Each slot is in effect from its own time up to (but excluding) the next
/// slot; the last slot runs until midnight. Times before the first slot still
/// belong to the previous day's last slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleIndex {
    slots: Vec<NaiveTime>,
}

impl ScheduleIndex {
    /// Build from arbitrary slots (sorted and deduplicated)
    pub fn new(mut slots: Vec<NaiveTime>) -> Self {
        slots.sort();
        slots.dedup();
        Self { slots }
    }

    /// Parse a comma-separated `HH:MM` list.
    ///
    /// Malformed entries are logged and skipped, duplicates are logged and
    /// dropped. `group` only labels the log lines.
    pub fn parse(group: &str, spec: &str) -> Self {
        let mut slots: Vec<NaiveTime> = Vec::new();

        for item in spec.split(',') {
            let entry = item.trim();
            if entry.is_empty() && spec.trim().is_empty() {
                continue;
            }

            match parse_hhmm(entry) {
                Some(slot) if slots.contains(&slot) => {
                    warn!("[{}] Ignoring duplicate schedule ({})", group, entry);
                }
                Some(slot) => slots.push(slot),
                None => {
                    error!(
                        "[{}] The format of {:?} is invalid, HH:MM is expected; entry ignored",
                        group, item
                    );
                }
            }
        }

        Self::new(slots)
    }

    /// Index of the slot in effect at `time`, `None` for an empty schedule
    pub fn index_at(&self, time: NaiveTime) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }

        // number of slots starting at or before `time`
        let started = self.slots.partition_point(|slot| *slot <= time);
        if started == 0 {
            Some(self.slots.len() - 1)
        } else {
            Some(started - 1)
        }
    }

    /// Slot time at `index`
    pub fn slot(&self, index: usize) -> Option<NaiveTime> {
        self.slots.get(index).copied()
    }

    pub fn slots(&self) -> &[NaiveTime] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// A single slot never changes index, so only the first sweep flushes
    pub fn is_degenerate(&self) -> bool {
        self.slots.len() == 1
    }
}

impl fmt::Display for ScheduleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for slot in &self.slots {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}", slot.format("%H:%M"))?;
            first = false;
        }
        Ok(())
    }
}

fn parse_hhmm(entry: &str) -> Option<NaiveTime> {
    let bytes = entry.as_bytes();
    let shaped = bytes.len() == 5
        && bytes[2] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveTime::parse_from_str(entry, "%H:%M").ok()
}
