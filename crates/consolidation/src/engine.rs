//! Consolidation Engine Implementation

use crate::clock::{Clock, SystemClock};
use crate::sink::NotificationSink;
use crate::{Classification, EventClassifier, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use match_group::{GroupRuntime, MatchGroup, Policy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use trap_model::TrapEvent;
use tracing::{debug, info};

/// Engine-wide consolidation bookkeeping, keyed by group name
#[derive(Debug, Default)]
struct ConsolidationState {
    /// Start of the current consolidation (rolling) or digest cycle (schedule)
    consolidating: HashMap<String, DateTime<Local>>,
    /// Ascending arrival times of rolling-window groups
    active: HashMap<String, Vec<DateTime<Local>>>,
}

/// Classifies traps against ignore and accept groups and consolidates them.
///
/// Locking: the engine lock is always taken before a group lock, and no
/// lock is held across an await point.
pub struct ConsolidationEngine {
    accept: Vec<MatchGroup>,
    ignore: Vec<MatchGroup>,
    state: Mutex<ConsolidationState>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl ConsolidationEngine {
    /// Create an engine over the configured groups, in priority order
    pub fn new(
        accept: Vec<MatchGroup>,
        ignore: Vec<MatchGroup>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        info!(
            "Creating consolidation engine with {} accept and {} ignore groups",
            accept.len(),
            ignore.len()
        );
        Self {
            accept,
            ignore,
            state: Mutex::new(ConsolidationState::default()),
            sink,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Look up an accept group by name
    pub fn group(&self, name: &str) -> Option<&MatchGroup> {
        self.accept.iter().find(|g| g.name() == name)
    }

    /// Start of the running consolidation or digest cycle for a group
    pub fn consolidating_since(&self, name: &str) -> Option<DateTime<Local>> {
        self.lock_state().consolidating.get(name).copied()
    }

    pub fn is_consolidating(&self, name: &str) -> bool {
        self.consolidating_since(name).is_some()
    }

    /// Number of arrival times still held for a rolling-window group
    pub fn history_len(&self, name: &str) -> usize {
        self.lock_state().active.get(name).map_or(0, Vec::len)
    }

    /// Classify using the engine clock
    pub fn classify_event(&self, event: &TrapEvent) -> Classification {
        self.classify_at(event, self.clock.now())
    }

    /// Classify as if the trap arrived at `now`
    pub fn classify_at(&self, event: &TrapEvent, now: DateTime<Local>) -> Classification {
        let classification = self.route(event, now);
        metrics::counter!("trapper_events_total", "outcome" => classification.label())
            .increment(1);
        classification
    }

    fn route(&self, event: &TrapEvent, now: DateTime<Local>) -> Classification {
        if let Some(group) = self.ignore.iter().find(|g| g.matches(event)) {
            info!("ignored, group: {}, sender: {}", group.name(), event.sender);
            event.mark_handled();
            return Classification::Ignored {
                group: group.name().to_string(),
            };
        }

        if let Some(group) = self.accept.iter().find(|g| g.matches(event)) {
            debug!("accepted, group: {}, sender: {}", group.name(), event.sender);
            let outcome = self.accept(group, event, now);
            event.mark_handled();
            return Classification::Accepted {
                group: group.name().to_string(),
                outcome,
            };
        }

        debug!("no group matched trap from {}", event.sender);
        Classification::Unmatched
    }

    fn accept(&self, group: &MatchGroup, event: &TrapEvent, now: DateTime<Local>) -> Outcome {
        if !group.consolidates() {
            return self.forward(group, event, now);
        }

        match group.policy() {
            Policy::Schedule(_) => self.accumulate(group, event, now),
            Policy::RollingWindow => self.record_arrival(group, event, now),
        }
    }

    fn forward(&self, group: &MatchGroup, event: &TrapEvent, now: DateTime<Local>) -> Outcome {
        let placeholders = group.placeholders(event);
        debug!("{} forwarding trap from {}", group.name(), event.sender);
        self.sink.send(group, &placeholders);
        group.state().mark_sent(now);
        Outcome::Forwarded
    }

    /// Schedule policy: fold into the digest, flushing early once the limit
    /// is reached, but never sooner than `minutes` after the previous send.
    fn accumulate(&self, group: &MatchGroup, event: &TrapEvent, now: DateTime<Local>) -> Outcome {
        let name = group.name();
        let mut shared = self.lock_state();
        let since = *shared
            .consolidating
            .entry(name.to_string())
            .or_insert(now);

        let mut state = group.state();
        state.digest.record(event);

        if !group.limit_reached(&state) {
            return Outcome::Accumulated;
        }

        debug!(
            "[{}] limit reached ({} >= {})",
            name,
            state.digest.count(),
            group.limit()
        );

        match state.minutes_since_sent(now) {
            Some(elapsed) if elapsed < i64::from(group.minutes()) => {
                debug!(
                    "[{}] {} minutes since last sent, waiting until {} have elapsed",
                    name,
                    elapsed,
                    group.minutes()
                );
                Outcome::Withheld
            }
            _ => {
                let start = state.last_sent().unwrap_or(since);
                self.flush_digest(group, &mut state, start, now);
                shared.consolidating.remove(name);
                Outcome::DigestSent
            }
        }
    }

    /// Rolling-window policy: record the arrival and decide whether to
    /// forward it or hold it back as part of a consolidation.
    fn record_arrival(
        &self,
        group: &MatchGroup,
        event: &TrapEvent,
        now: DateTime<Local>,
    ) -> Outcome {
        let name = group.name();
        let mut shared = self.lock_state();
        let ConsolidationState {
            consolidating,
            active,
        } = &mut *shared;

        let history = active.entry(name.to_string()).or_default();
        // clocks are read before the lock, keep the history ascending anyway
        let latest = history.last().map_or(now, |last| now.max(*last));
        history.push(latest);

        if consolidating.contains_key(name) {
            debug!(
                "continuing consolidation for {}, history size {}",
                name,
                history.len()
            );
            return Outcome::Absorbed;
        }

        let cutoff = latest - group.window();
        let stale = history.partition_point(|t| *t < cutoff);
        history.drain(..stale);

        let in_window = window_count(history, Some(cutoff), latest);
        if in_window > group.limit() as usize {
            info!(
                "consolidating {}: {} between {} and {}",
                name, in_window, cutoff, latest
            );
            // only the latest trap counts towards the consolidation,
            // everything before it was forwarded individually
            consolidating.insert(name.to_string(), latest);
            return Outcome::Absorbed;
        }

        drop(shared);
        self.forward(group, event, now)
    }

    /// Flush whatever is due, using the engine clock
    pub fn sweep(&self) {
        self.sweep_at(self.clock.now());
    }

    /// Flush scheduled digests whose slot changed and rolling-window
    /// consolidations whose window has closed
    pub fn sweep_at(&self, now: DateTime<Local>) {
        let mut shared = self.lock_state();

        for group in &self.accept {
            match group.policy() {
                Policy::Schedule(_) => self.sweep_schedule(group, &mut shared, now),
                Policy::RollingWindow => {
                    if shared.consolidating.contains_key(group.name()) {
                        self.sweep_window(group, &mut shared, now);
                    }
                }
            }
        }
    }

    fn sweep_schedule(
        &self,
        group: &MatchGroup,
        shared: &mut ConsolidationState,
        now: DateTime<Local>,
    ) {
        let mut state = group.state();
        if !group.on_schedule(&state, now) {
            return;
        }

        if let Some(start) = shared.consolidating.remove(group.name()) {
            self.flush_digest(group, &mut state, start, now);
        }
        group.mark_schedule_processed(&mut state, now);
    }

    fn sweep_window(
        &self,
        group: &MatchGroup,
        shared: &mut ConsolidationState,
        now: DateTime<Local>,
    ) {
        let name = group.name();
        let Some(start) = shared.consolidating.get(name).copied() else {
            return;
        };

        let window = group.window();
        if start >= now - window {
            // window opened at `start` has not closed yet
            return;
        }

        let end = start + window;
        debug!("checking consolidation window for {} {} to {}", name, start, end);

        let history = shared.active.entry(name.to_string()).or_default();
        let count = window_count(history, Some(start), end);
        if count != 0 {
            self.sink.send_consolidated(group, start, count);
            group.state().mark_sent(now);
            metrics::counter!("trapper_digests_total", "kind" => "window").increment(1);

            // nothing at or before `end` needs examining again
            let removable = window_count(history, None, end);
            info!(
                "sending consolidation of {} for {}, removing {} before {}",
                count, name, removable, end
            );
            history.drain(..removable);
        }

        if count < group.limit() as usize {
            debug!("stopping consolidation of {}", name);
            shared.consolidating.remove(name);
        } else {
            shared.consolidating.insert(name.to_string(), end);
        }
    }

    /// Send the pending digest, if any. Returns whether anything was sent.
    fn flush_digest(
        &self,
        group: &MatchGroup,
        state: &mut GroupRuntime,
        start: DateTime<Local>,
        now: DateTime<Local>,
    ) -> bool {
        let Some((latest, count)) = state.digest.take() else {
            return false;
        };

        let placeholders = group.digest_placeholders(&latest, count, start);
        info!(
            "[{}] sending a digest of {} since {} to {} destination(s)",
            group.name(),
            count,
            start.format(match_group::START_DATE_FORMAT),
            group.forwarders().len()
        );
        self.sink.send(group, &placeholders);
        state.mark_sent(now);
        metrics::counter!("trapper_digests_total", "kind" => "schedule").increment(1);
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, ConsolidationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventClassifier for ConsolidationEngine {
    async fn classify(&self, event: &TrapEvent) -> Classification {
        self.classify_event(event)
    }
}

/// Count of ascending `times` within `[start, end]`; no `start` means no
/// lower bound
fn window_count(
    times: &[DateTime<Local>],
    start: Option<DateTime<Local>>,
    end: DateTime<Local>,
) -> usize {
    times
        .iter()
        .take_while(|t| **t <= end)
        .filter(|t| start.map_or(true, |s| **t >= s))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sink::{MemorySink, Notification};
    use chrono::{Duration, TimeZone};
    use match_group::{GroupConfig, VarConfig};
    use std::net::{IpAddr, Ipv4Addr};
    use trap_model::{Oid, VarBinding};

    const STACK: &str = "1.3.6.1.4.1.29449.1";

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap()
    }

    fn next_day(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 16, h, m, 0).unwrap()
    }

    /// Minutes after 10:00 on the test day
    fn t(minutes: i64) -> DateTime<Local> {
        at(10, 0) + Duration::minutes(minutes)
    }

    fn trap(stack: &str) -> TrapEvent {
        let oid: Oid = STACK.parse().unwrap();
        TrapEvent::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            vec![VarBinding::new(oid, stack)],
        )
    }

    fn stack_group(name: &str, stack: &str, config: GroupConfig) -> MatchGroup {
        let config = GroupConfig {
            var: Some(VarConfig {
                oid: STACK.to_string(),
                regex: Some(stack.to_string()),
            }),
            ..config
        };
        MatchGroup::from_config(name, &config).unwrap()
    }

    fn rolling(name: &str, limit: u32, minutes: u32) -> MatchGroup {
        let config = GroupConfig {
            limit,
            minutes,
            ..Default::default()
        };
        MatchGroup::from_config(name, &config).unwrap()
    }

    fn scheduled(name: &str, spec: &str, limit: u32, minutes: u32) -> MatchGroup {
        let config = GroupConfig {
            limit,
            minutes,
            schedule: Some(spec.to_string()),
            ..Default::default()
        };
        MatchGroup::from_config(name, &config).unwrap()
    }

    fn engine(accept: Vec<MatchGroup>, ignore: Vec<MatchGroup>) -> (ConsolidationEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let engine = ConsolidationEngine::new(accept, ignore, sink.clone());
        (engine, sink)
    }

    fn accepted(outcome: Outcome, group: &str) -> Classification {
        Classification::Accepted {
            group: group.to_string(),
            outcome,
        }
    }

    #[test]
    fn test_ignore_wins_over_accept() {
        let (engine, sink) = engine(
            vec![rolling("all", 3, 15)],
            vec![stack_group("noise", "junit", GroupConfig::default())],
        );

        let event = trap("junit");
        let result = engine.classify_at(&event, t(0));

        assert_eq!(result, Classification::Ignored { group: "noise".to_string() });
        assert!(event.is_handled());
        assert!(sink.is_empty());
        assert_eq!(engine.history_len("all"), 0);
    }

    #[test]
    fn test_first_matching_accept_group_wins() {
        let (engine, sink) = engine(
            vec![
                stack_group("billing", "billing", GroupConfig::default()),
                rolling("catch-all", 3, 15),
            ],
            vec![],
        );

        assert_eq!(
            engine.classify_at(&trap("billing"), t(0)),
            accepted(Outcome::Forwarded, "billing")
        );
        assert_eq!(
            engine.classify_at(&trap("crm"), t(0)),
            accepted(Outcome::Forwarded, "catch-all")
        );

        let groups: Vec<String> = sink.take().iter().map(|n| n.group().to_string()).collect();
        assert_eq!(groups, vec!["billing", "catch-all"]);
    }

    #[test]
    fn test_unmatched_stays_unhandled() {
        let (engine, sink) = engine(vec![stack_group("billing", "billing", GroupConfig::default())], vec![]);
        let event = trap("other");

        assert_eq!(engine.classify_at(&event, t(0)), Classification::Unmatched);
        assert!(!event.is_handled());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_limit_zero_always_forwards() {
        let (engine, sink) = engine(vec![rolling("loud", 0, 15)], vec![]);

        for minute in 0..20 {
            let result = engine.classify_at(&trap("x"), t(minute));
            assert_eq!(result, accepted(Outcome::Forwarded, "loud"));
        }
        engine.sweep_at(t(60));

        assert_eq!(sink.len(), 20);
        assert!(!engine.is_consolidating("loud"));
        assert_eq!(engine.history_len("loud"), 0);
    }

    #[test]
    fn test_limit_zero_schedule_group_forwards() {
        let (engine, sink) = engine(vec![scheduled("loud", "08:00,16:00", 0, 15)], vec![]);

        for minute in 0..5 {
            assert_eq!(
                engine.classify_at(&trap("x"), t(minute)),
                accepted(Outcome::Forwarded, "loud")
            );
        }
        assert_eq!(sink.len(), 5);
        assert!(!engine.is_consolidating("loud"));
        assert!(engine.group("loud").unwrap().state().digest.is_empty());
    }

    #[test]
    fn test_forward_stamps_last_sent() {
        let (engine, _sink) = engine(vec![rolling("billing", 3, 15)], vec![]);
        engine.classify_at(&trap("x"), t(4));
        assert_eq!(engine.group("billing").unwrap().state().last_sent(), Some(t(4)));
    }

    #[test]
    fn test_scenario_a_rolling_window() {
        let (engine, sink) = engine(vec![rolling("billing", 3, 15)], vec![]);

        for minute in [0, 5, 10] {
            assert_eq!(
                engine.classify_at(&trap("x"), t(minute)),
                accepted(Outcome::Forwarded, "billing")
            );
        }
        assert_eq!(
            engine.classify_at(&trap("x"), t(12)),
            accepted(Outcome::Absorbed, "billing")
        );
        assert_eq!(engine.consolidating_since("billing"), Some(t(12)));
        assert_eq!(sink.take().len(), 3);

        // window [12, 27] is still open at 27
        engine.sweep_at(t(27));
        assert!(sink.is_empty());

        engine.sweep_at(t(27) + Duration::seconds(30));
        assert_eq!(
            sink.take(),
            vec![Notification::Consolidated {
                group: "billing".to_string(),
                start: t(12),
                count: 1,
            }]
        );
        assert!(!engine.is_consolidating("billing"));
        assert_eq!(engine.history_len("billing"), 0);

        // back to individual forwarding
        assert_eq!(
            engine.classify_at(&trap("x"), t(30)),
            accepted(Outcome::Forwarded, "billing")
        );
    }

    #[test]
    fn test_consolidation_absorbs_until_sweep() {
        let (engine, sink) = engine(vec![rolling("billing", 3, 15)], vec![]);
        for minute in [0, 1, 2] {
            engine.classify_at(&trap("x"), t(minute));
        }
        sink.take();

        for minute in 3..10 {
            assert_eq!(
                engine.classify_at(&trap("x"), t(minute)),
                accepted(Outcome::Absorbed, "billing")
            );
        }
        assert!(sink.is_empty());
        assert_eq!(engine.consolidating_since("billing"), Some(t(3)));
    }

    #[test]
    fn test_busy_window_slides_forward() {
        let (engine, sink) = engine(vec![rolling("billing", 3, 15)], vec![]);
        for minute in [0, 1, 2, 3] {
            engine.classify_at(&trap("x"), t(minute));
        }
        sink.take();
        // storm continues inside [3, 18]
        for minute in [4, 6, 8] {
            engine.classify_at(&trap("x"), t(minute));
        }
        // and into the next window
        for minute in [20, 25] {
            engine.classify_at(&trap("x"), t(minute));
        }

        engine.sweep_at(t(19));
        assert_eq!(
            sink.take(),
            vec![Notification::Consolidated {
                group: "billing".to_string(),
                start: t(3),
                count: 4,
            }]
        );
        assert_eq!(engine.consolidating_since("billing"), Some(t(18)));
        assert_eq!(engine.history_len("billing"), 2);

        // 2 traps in [18, 33] is below the limit: one summary, then stop
        engine.sweep_at(t(34));
        assert_eq!(
            sink.take(),
            vec![Notification::Consolidated {
                group: "billing".to_string(),
                start: t(18),
                count: 2,
            }]
        );
        assert!(!engine.is_consolidating("billing"));
    }

    #[test]
    fn test_trailing_window_forgets_old_arrivals() {
        let (engine, sink) = engine(vec![rolling("billing", 3, 15)], vec![]);
        for minute in [0, 10, 20, 30, 40] {
            assert_eq!(
                engine.classify_at(&trap("x"), t(minute)),
                accepted(Outcome::Forwarded, "billing")
            );
        }
        assert_eq!(sink.len(), 5);
        assert!(engine.history_len("billing") <= 2);
    }

    #[test]
    fn test_out_of_order_clock_keeps_history_ascending() {
        let (engine, _sink) = engine(vec![rolling("billing", 1, 15)], vec![]);
        engine.classify_at(&trap("x"), t(5));
        engine.classify_at(&trap("x"), t(4));
        // second arrival is stamped at 5 so the window holds 2 > 1
        assert_eq!(engine.consolidating_since("billing"), Some(t(5)));
    }

    #[test]
    fn test_schedule_accumulates_below_limit() {
        let (engine, sink) = engine(vec![scheduled("daily", "08:00,16:00", 100, 15)], vec![]);
        for minute in 0..10 {
            assert_eq!(
                engine.classify_at(&trap("x"), t(minute)),
                accepted(Outcome::Accumulated, "daily")
            );
        }
        assert!(sink.is_empty());
        assert_eq!(engine.group("daily").unwrap().state().digest.count(), 10);
        assert_eq!(engine.consolidating_since("daily"), Some(t(0)));
    }

    #[test]
    fn test_schedule_limit_flushes_first_digest() {
        let (engine, sink) = engine(vec![scheduled("daily", "08:00,16:00", 2, 15)], vec![]);

        engine.classify_at(&trap("first"), t(0));
        assert_eq!(
            engine.classify_at(&trap("second"), t(1)),
            accepted(Outcome::DigestSent, "daily")
        );

        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Notification::Individual { placeholders, .. } => {
                assert_eq!(placeholders["count"], "2");
                assert_eq!(placeholders["start_date"], "01-15 10:00");
                assert_eq!(placeholders["body"], "second\n");
            }
            other => panic!("unexpected notification {:?}", other),
        }

        let group = engine.group("daily").unwrap();
        assert!(group.state().digest.is_empty());
        assert_eq!(group.state().last_sent(), Some(t(1)));
        assert!(!engine.is_consolidating("daily"));
    }

    #[test]
    fn test_schedule_limit_rate_limited_by_minutes() {
        let (engine, sink) = engine(vec![scheduled("daily", "08:00,16:00", 2, 15)], vec![]);
        engine.classify_at(&trap("x"), t(0));
        engine.classify_at(&trap("x"), t(1));
        sink.take();

        engine.classify_at(&trap("x"), t(5));
        assert_eq!(
            engine.classify_at(&trap("x"), t(6)),
            accepted(Outcome::Withheld, "daily")
        );
        assert_eq!(
            engine.classify_at(&trap("x"), t(15)),
            accepted(Outcome::Withheld, "daily")
        );
        assert!(sink.is_empty());

        // 15 whole minutes after the send at t(1)
        assert_eq!(
            engine.classify_at(&trap("x"), t(16)),
            accepted(Outcome::DigestSent, "daily")
        );
        match &sink.take()[0] {
            Notification::Individual { placeholders, .. } => {
                assert_eq!(placeholders["count"], "4");
                // start is the previous send, not the cycle start
                assert_eq!(placeholders["start_date"], "01-15 10:01");
            }
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[test]
    fn test_scenario_b_schedule_slots() {
        let (engine, sink) = engine(vec![scheduled("daily", "08:00,16:00", 100, 15)], vec![]);

        // startup sweep processes the current slot
        engine.sweep_at(at(7, 0));
        assert!(sink.is_empty());

        for minute in 0..5 {
            engine.classify_at(&trap("x"), at(7, 10) + Duration::minutes(minute));
        }

        // still yesterday's 16:00 slot
        engine.sweep_at(at(7, 59));
        assert!(sink.is_empty());

        engine.sweep_at(at(8, 1));
        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Notification::Individual { placeholders, .. } => {
                assert_eq!(placeholders["count"], "5");
                assert_eq!(placeholders["start_date"], "01-15 07:10");
            }
            other => panic!("unexpected notification {:?}", other),
        }

        // same slot again: nothing
        engine.sweep_at(at(8, 2));
        engine.classify_at(&trap("x"), at(9, 0));
        engine.sweep_at(at(15, 59));
        assert!(sink.is_empty());

        // crossing 16:00 flushes the single pending trap
        engine.sweep_at(at(16, 0));
        assert_eq!(sink.take().len(), 1);

        // quiet slot crossing: no digest
        engine.sweep_at(next_day(8, 0));
        assert!(sink.is_empty());
        assert_eq!(engine.group("daily").unwrap().state().last_processed_slot(), Some(0));
    }

    #[test]
    fn test_first_sweep_flushes_pending_digest() {
        let (engine, sink) = engine(vec![scheduled("daily", "08:00,16:00", 100, 15)], vec![]);
        engine.classify_at(&trap("x"), at(9, 0));
        engine.sweep_at(at(9, 0));
        assert_eq!(sink.take().len(), 1);
        assert_eq!(engine.group("daily").unwrap().state().last_processed_slot(), Some(0));
    }

    #[test]
    fn test_flush_on_empty_digest_is_noop() {
        let (engine, sink) = engine(vec![scheduled("daily", "08:00,16:00", 100, 15)], vec![]);
        let group = engine.group("daily").unwrap();
        let mut state = group.state();

        assert!(!engine.flush_digest(group, &mut state, t(0), t(1)));
        assert!(sink.is_empty());
        assert_eq!(state.last_sent(), None);

        state.digest.record(&trap("x"));
        assert!(engine.flush_digest(group, &mut state, t(0), t(1)));
        assert!(state.digest.is_empty());
        assert_eq!(state.digest.count(), 0);
        assert!(!engine.flush_digest(group, &mut state, t(0), t(2)));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_sweep_uses_engine_clock() {
        let clock = Arc::new(ManualClock::new(t(0)));
        let sink = Arc::new(MemorySink::new());
        let engine = ConsolidationEngine::new(vec![rolling("billing", 0, 15)], vec![], sink.clone())
            .with_clock(clock.clone());

        engine.classify_event(&trap("x"));
        clock.advance(Duration::minutes(3));
        engine.sweep();

        assert_eq!(engine.group("billing").unwrap().state().last_sent(), Some(t(0)));
    }

    #[test]
    fn test_concurrent_arrivals_all_accounted() {
        let sink = Arc::new(MemorySink::new());
        let engine = Arc::new(ConsolidationEngine::new(
            vec![rolling("billing", 3, 15)],
            vec![],
            sink.clone(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        engine.classify_at(&trap("x"), t(0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // exactly `limit` forwarded, the rest absorbed
        assert_eq!(sink.take().len(), 3);
        assert_eq!(engine.consolidating_since("billing"), Some(t(0)));
        assert_eq!(engine.history_len("billing"), 200);

        engine.sweep_at(t(16));
        assert_eq!(
            sink.take(),
            vec![Notification::Consolidated {
                group: "billing".to_string(),
                start: t(0),
                count: 200,
            }]
        );
    }

    #[tokio::test]
    async fn test_classifier_trait_delegates() {
        let (engine, sink) = engine(vec![rolling("billing", 3, 15)], vec![]);
        let classifier: Arc<dyn EventClassifier> = Arc::new(engine);

        let event = trap("x");
        let result = classifier.classify(&event).await;

        assert_eq!(result, accepted(Outcome::Forwarded, "billing"));
        assert!(event.is_handled());
        assert_eq!(sink.len(), 1);
    }
}
