//! Match group implementation

use crate::config::{ForwardConfig, GroupConfig};
use crate::digest::Digest;
use crate::error::GroupError;
use crate::matcher::{SenderPattern, VarPredicate};
use crate::schedule::ScheduleIndex;
use crate::START_DATE_FORMAT;
use chrono::{DateTime, Duration, Local};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};
use trap_model::{Oid, TrapEvent};
use tracing::{info, warn};

/// Template placeholders handed to notification sinks
pub type Placeholders = BTreeMap<String, String>;

/// How a group consolidates its traps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// Forward until more than `limit` traps land in a trailing window
    RollingWindow,
    /// Accumulate into a digest flushed at fixed daily times
    Schedule(ScheduleIndex),
}

/// Mutable per-group state, guarded by the group's own lock
#[derive(Debug, Default)]
pub struct GroupRuntime {
    /// Schedule digest accumulator
    pub digest: Digest,
    last_sent: Option<DateTime<Local>>,
    last_processed_slot: Option<usize>,
}

impl GroupRuntime {
    /// When a notification for this group last went out
    pub fn last_sent(&self) -> Option<DateTime<Local>> {
        self.last_sent
    }

    pub fn mark_sent(&mut self, at: DateTime<Local>) {
        self.last_sent = Some(at);
    }

    /// Whole minutes since the last send, `None` if nothing was sent yet
    pub fn minutes_since_sent(&self, now: DateTime<Local>) -> Option<i64> {
        self.last_sent.map(|sent| (now - sent).num_minutes())
    }

    /// Slot handled by the last sweep; `None` until the first one
    pub fn last_processed_slot(&self) -> Option<usize> {
        self.last_processed_slot
    }

    pub fn set_last_processed_slot(&mut self, slot: Option<usize>) {
        self.last_processed_slot = slot;
    }
}

/// A named rule set with its consolidation policy and runtime state
pub struct MatchGroup {
    name: String,
    minutes: u32,
    limit: u32,
    senders: Vec<SenderPattern>,
    var: Option<VarPredicate>,
    find: Option<Regex>,
    rename: HashMap<Oid, String>,
    forwarders: Vec<ForwardConfig>,
    policy: Policy,
    runtime: Mutex<GroupRuntime>,
}

impl MatchGroup {
    /// Build a group from its configuration section
    pub fn from_config(name: &str, config: &GroupConfig) -> Result<Self, GroupError> {
        let senders = config
            .sender
            .iter()
            .map(|pattern| SenderPattern::parse(name, pattern))
            .collect();

        let var = match &config.var {
            Some(var) => {
                let oid = var.oid.parse().map_err(|source| GroupError::InvalidOid {
                    group: name.to_string(),
                    source,
                })?;
                let predicate = VarPredicate::new(oid, var.regex.as_deref()).map_err(|source| {
                    GroupError::InvalidPattern {
                        group: name.to_string(),
                        field: "var.regex",
                        source,
                    }
                })?;
                Some(predicate)
            }
            None => None,
        };

        let find = config
            .find
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|source| GroupError::InvalidPattern {
                group: name.to_string(),
                field: "find",
                source,
            })?;

        let mut rename = HashMap::new();
        for (key, renamed) in &config.rename {
            let oid: Oid = key.parse().map_err(|source| GroupError::InvalidOid {
                group: name.to_string(),
                source,
            })?;
            rename.insert(oid, renamed.clone());
        }

        let schedule = config
            .schedule
            .as_deref()
            .map(|spec| ScheduleIndex::parse(name, spec))
            .unwrap_or_default();

        if schedule.is_degenerate() {
            warn!(
                "[{}] A single daily schedule only flushes on the first sweep; configure at least two",
                name
            );
        }

        let policy = if schedule.is_empty() {
            Policy::RollingWindow
        } else {
            info!("[{}] schedule is used", name);
            Policy::Schedule(schedule)
        };

        let group = Self {
            name: name.to_string(),
            minutes: config.minutes,
            limit: config.limit,
            senders,
            var,
            find,
            rename,
            forwarders: config.forward.clone(),
            policy,
            runtime: Mutex::new(GroupRuntime::default()),
        };

        info!("Group created: {}", group);
        Ok(group)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    /// Window length as a duration
    pub fn window(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn schedule(&self) -> Option<&ScheduleIndex> {
        match &self.policy {
            Policy::Schedule(schedule) => Some(schedule),
            Policy::RollingWindow => None,
        }
    }

    pub fn has_schedule(&self) -> bool {
        self.schedule().is_some()
    }

    /// Whether this group may ever hold traps back
    pub fn consolidates(&self) -> bool {
        self.limit > 0
    }

    pub fn forwarders(&self) -> &[ForwardConfig] {
        &self.forwarders
    }

    /// True iff the sender, variable and body filters all pass
    pub fn matches(&self, event: &TrapEvent) -> bool {
        self.matches_sender(event) && self.matches_var(event) && self.matches_find(event)
    }

    fn matches_sender(&self, event: &TrapEvent) -> bool {
        self.senders.is_empty() || self.senders.iter().any(|p| p.matches(&event.sender))
    }

    fn matches_var(&self, event: &TrapEvent) -> bool {
        self.var.as_ref().map_or(true, |var| var.matches(event))
    }

    fn matches_find(&self, event: &TrapEvent) -> bool {
        self.find.as_ref().map_or(true, |re| re.is_match(&event.body()))
    }

    /// Placeholders for an individual trap.
    ///
    /// Every non-null value is present under its OID, and again under its
    /// renamed key if one is configured. `remainder` holds the values that
    /// were not renamed.
    pub fn placeholders(&self, event: &TrapEvent) -> Placeholders {
        let mut map = Placeholders::new();
        let mut body = String::new();
        let mut remainder = String::new();

        for binding in event.bindings.iter().filter(|b| !b.value.is_null()) {
            let value = binding.value.to_string();
            map.insert(binding.oid.to_string(), value.clone());

            match self.rename.get(&binding.oid) {
                Some(renamed) => {
                    map.insert(renamed.clone(), value.clone());
                }
                None => {
                    remainder.push_str(&value);
                    remainder.push('\n');
                }
            }

            body.push_str(&value);
            body.push('\n');
        }

        map.insert("name".to_string(), self.name.clone());
        map.insert("body".to_string(), body);
        map.insert("remainder".to_string(), remainder);
        map.insert("sender".to_string(), event.sender_display());
        map
    }

    /// Placeholders for a schedule digest built around its latest trap
    pub fn digest_placeholders(
        &self,
        latest: &TrapEvent,
        count: usize,
        start: DateTime<Local>,
    ) -> Placeholders {
        let mut map = self.placeholders(latest);
        map.insert("count".to_string(), count.to_string());
        map.insert(
            "start_date".to_string(),
            start.format(START_DATE_FORMAT).to_string(),
        );
        map
    }

    /// Lock the runtime state
    pub fn state(&self) -> MutexGuard<'_, GroupRuntime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule slot in effect at `now`
    pub fn current_slot(&self, now: DateTime<Local>) -> Option<usize> {
        self.schedule()
            .and_then(|schedule| schedule.index_at(now.time()))
    }

    /// True when no slot has been processed yet or the slot has changed
    pub fn on_schedule(&self, state: &GroupRuntime, now: DateTime<Local>) -> bool {
        match state.last_processed_slot() {
            None => true,
            Some(last) => self.current_slot(now) != Some(last),
        }
    }

    /// Record the slot in effect at `now` as processed
    pub fn mark_schedule_processed(&self, state: &mut GroupRuntime, now: DateTime<Local>) {
        let slot = self.current_slot(now);
        state.set_last_processed_slot(slot);

        if let Some(time) = slot.and_then(|i| self.schedule().and_then(|s| s.slot(i))) {
            info!("[{}] mark schedule {} processed", self.name, time.format("%H:%M"));
        }
    }

    /// Whether the digest holds at least `limit` traps
    pub fn limit_reached(&self, state: &GroupRuntime) -> bool {
        state.digest.count() >= self.limit as usize
    }
}

impl PartialEq for MatchGroup {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for MatchGroup {}

impl Hash for MatchGroup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for MatchGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchGroup")
            .field("name", &self.name)
            .field("limit", &self.limit)
            .field("minutes", &self.minutes)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for MatchGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.name, self.limit, self.minutes)?;

        if !self.senders.is_empty() {
            let senders: Vec<&str> = self
                .senders
                .iter()
                .map(|p| match p {
                    SenderPattern::Prefix(prefix) => prefix.as_str(),
                    SenderPattern::Host { host, .. } => host.as_str(),
                })
                .collect();
            write!(f, ", sender: {:?}", senders)?;
        }
        if let Some(find) = &self.find {
            write!(f, ", find: {}", find)?;
        }
        if let Some(var) = &self.var {
            write!(f, ", var: {}", var)?;
        }
        if let Some(schedule) = self.schedule() {
            write!(f, ", schedules: {}", schedule)?;
        }
        Ok(())
    }
}
