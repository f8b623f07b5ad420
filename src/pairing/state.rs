//! The quick-pair state machine.
//!
//! ```text
//! Idle ──E──▶ Pending(E)
//! Pending(P) ──E same kind──▶ Pending(E)              replacement, no move
//! Pending(P) ──E other kind, within window──▶ Idle     MoveIntent
//! Pending(P) ──window elapsed──▶ Idle                  PairingTimeout
//! ```
//!
//! Expiry is evaluated before every event, so a late complement first times the
//! pending scan out and then opens a fresh window on itself. A periodic
//! [`CorrelationEngine::expire`] call reaches the same state with the same notice.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scan::{ScanEvent, ScanKind};

/// A spool/location pair produced inside the window. Not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveIntent {
    pub spool_id: String,
    pub location_id: String,
    pub triggered_at: Instant,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    /// The window is now open on `event`. `replaced` is the same-kind scan it superseded.
    Pending {
        event: ScanEvent,
        replaced: Option<ScanEvent>,
    },
    Paired(MoveIntent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Pending scan dropped because its window ran out before this event arrived.
    pub expired: Option<ScanEvent>,
    pub correlation: Correlation,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PairingSnapshot {
    Idle,
    Pending {
        kind: ScanKind,
        code: String,
        #[serde(rename = "remainingMs")]
        remaining_ms: u64,
    },
}

/// Single-slot pairing window. Owns no registry state.
#[derive(Debug)]
pub struct CorrelationEngine {
    window: Duration,
    pending: Option<ScanEvent>,
}

impl CorrelationEngine {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> Option<&ScanEvent> {
        self.pending.as_ref()
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }

    /// Feeds the next admitted scan. `event.observed_at` is the engine's notion of now.
    pub fn observe(&mut self, event: ScanEvent) -> Observation {
        let expired = self.expire(event.observed_at);

        let correlation = match self.pending.take() {
            None => {
                self.pending = Some(event.clone());
                Correlation::Pending {
                    event,
                    replaced: None,
                }
            }
            Some(previous) if previous.kind == event.kind => {
                self.pending = Some(event.clone());
                Correlation::Pending {
                    event,
                    replaced: Some(previous),
                }
            }
            Some(previous) => Correlation::Paired(pair(previous, event)),
        };

        Observation {
            expired,
            correlation,
        }
    }

    /// Drops the pending scan if its window has run out at `now`.
    pub fn expire(&mut self, now: Instant) -> Option<ScanEvent> {
        let elapsed = now.saturating_duration_since(self.pending.as_ref()?.observed_at);
        if elapsed > self.window {
            self.pending.take()
        } else {
            None
        }
    }

    /// Operator cancel; also used to reset after a failed commit.
    pub fn cancel(&mut self) -> Option<ScanEvent> {
        self.pending.take()
    }

    /// A scan past its window reads as Idle even before `expire` drops it.
    pub fn snapshot(&self, now: Instant) -> PairingSnapshot {
        match &self.pending {
            None => PairingSnapshot::Idle,
            Some(event) => {
                let elapsed = now.saturating_duration_since(event.observed_at);
                if elapsed > self.window {
                    return PairingSnapshot::Idle;
                }
                PairingSnapshot::Pending {
                    kind: event.kind,
                    code: event.code.clone(),
                    remaining_ms: self.window.saturating_sub(elapsed).as_millis() as u64,
                }
            }
        }
    }
}

fn pair(previous: ScanEvent, current: ScanEvent) -> MoveIntent {
    let triggered_at = current.observed_at;
    let captured_at = current.captured_at;
    let (spool, location) = match current.kind {
        ScanKind::Spool => (current, previous),
        ScanKind::Location => (previous, current),
    };

    MoveIntent {
        spool_id: spool.code,
        location_id: location.code,
        triggered_at,
        captured_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    fn at(t0: Instant, secs: f64) -> Instant {
        t0 + Duration::from_secs_f64(secs)
    }

    fn spool(code: &str, when: Instant) -> ScanEvent {
        ScanEvent::new(ScanKind::Spool, code, when)
    }

    fn location(code: &str, when: Instant) -> ScanEvent {
        ScanEvent::new(ScanKind::Location, code, when)
    }

    fn intent_of(observation: &Observation) -> Option<&MoveIntent> {
        match &observation.correlation {
            Correlation::Paired(intent) => Some(intent),
            Correlation::Pending { .. } => None,
        }
    }

    #[test]
    fn spool_then_location_pairs() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);

        let first = engine.observe(spool("S1", t0));
        assert!(intent_of(&first).is_none());
        assert!(!engine.is_idle());

        let second = engine.observe(location("L2", at(t0, 4.0)));
        let intent = intent_of(&second).expect("paired");
        assert_eq!(intent.spool_id, "S1");
        assert_eq!(intent.location_id, "L2");
        assert_eq!(intent.triggered_at, at(t0, 4.0));
        assert!(engine.is_idle());
    }

    #[test]
    fn location_then_spool_pairs() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);

        engine.observe(location("L1", t0));
        let observation = engine.observe(spool("S9", at(t0, 9.5)));
        let intent = intent_of(&observation).expect("paired");
        assert_eq!(intent.spool_id, "S9");
        assert_eq!(intent.location_id, "L1");
    }

    #[test]
    fn exactly_at_window_edge_still_pairs() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);

        engine.observe(spool("S1", t0));
        let observation = engine.observe(location("L2", t0 + WINDOW));
        assert!(intent_of(&observation).is_some());
        assert_eq!(observation.expired, None);
    }

    #[test]
    fn late_complement_times_out_and_opens_new_window() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);

        engine.observe(spool("S1", t0));
        let observation = engine.observe(location("L2", at(t0, 12.0)));

        assert!(intent_of(&observation).is_none());
        assert_eq!(observation.expired.map(|e| e.code), Some("S1".to_string()));
        assert_eq!(engine.pending().map(|e| e.code.as_str()), Some("L2"));
    }

    #[test]
    fn same_kind_replaces_pending() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);

        engine.observe(spool("S1", t0));
        let replaced = engine.observe(spool("S2", at(t0, 2.0)));
        match &replaced.correlation {
            Correlation::Pending { event, replaced } => {
                assert_eq!(event.code, "S2");
                assert_eq!(replaced.as_ref().map(|e| e.code.as_str()), Some("S1"));
            }
            other => panic!("expected replacement, got {other:?}"),
        }

        let observation = engine.observe(location("L2", at(t0, 3.0)));
        let intent = intent_of(&observation).expect("paired");
        assert_eq!(intent.spool_id, "S2");
    }

    #[test]
    fn replacement_restarts_the_window() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);

        engine.observe(spool("S1", t0));
        engine.observe(spool("S2", at(t0, 8.0)));
        let observation = engine.observe(location("L2", at(t0, 15.0)));
        assert_eq!(intent_of(&observation).map(|i| i.spool_id.as_str()), Some("S2"));
    }

    #[test]
    fn same_kind_runs_never_emit_intents() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);

        for (i, code) in ["L1", "L2", "L3", "L1"].iter().enumerate() {
            let observation = engine.observe(location(code, at(t0, i as f64)));
            assert!(intent_of(&observation).is_none());
        }
        assert_eq!(engine.pending().map(|e| e.code.as_str()), Some("L1"));
        assert_eq!(engine.pending().map(|e| e.observed_at), Some(at(t0, 3.0)));
    }

    #[test]
    fn repeated_pairs_each_emit_an_intent() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);

        let mut intents = 0;
        for step in 0..3 {
            let base = step as f64 * 2.0;
            engine.observe(spool("S1", at(t0, base)));
            if intent_of(&engine.observe(location("L2", at(t0, base + 1.0)))).is_some() {
                intents += 1;
            }
        }
        assert_eq!(intents, 3);
    }

    #[test]
    fn tick_expiry_matches_lazy_expiry() {
        let t0 = Instant::now();
        let s1 = spool("S1", t0);
        let l2 = location("L2", at(t0, 12.0));

        let mut lazy = CorrelationEngine::new(WINDOW);
        lazy.observe(s1.clone());
        let lazy_observation = lazy.observe(l2.clone());

        let mut ticked = CorrelationEngine::new(WINDOW);
        ticked.observe(s1);
        assert_eq!(ticked.expire(at(t0, 5.0)), None);
        let dropped = ticked.expire(at(t0, 11.0));
        assert!(ticked.is_idle());
        let ticked_observation = ticked.observe(l2);

        assert_eq!(lazy_observation.expired, dropped);
        assert_eq!(ticked_observation.expired, None);
        assert_eq!(lazy_observation.correlation, ticked_observation.correlation);
        assert_eq!(lazy.pending(), ticked.pending());
    }

    #[test]
    fn cancel_discards_pending() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);

        engine.observe(spool("S1", t0));
        assert_eq!(engine.cancel().map(|e| e.code), Some("S1".to_string()));
        assert!(engine.is_idle());
        assert_eq!(engine.cancel(), None);

        let observation = engine.observe(location("L2", at(t0, 1.0)));
        assert!(intent_of(&observation).is_none());
    }

    #[test]
    fn snapshot_reports_remaining_time() {
        let t0 = Instant::now();
        let mut engine = CorrelationEngine::new(WINDOW);
        assert_eq!(engine.snapshot(t0), PairingSnapshot::Idle);

        engine.observe(spool("S1", t0));
        assert_eq!(
            engine.snapshot(at(t0, 4.0)),
            PairingSnapshot::Pending {
                kind: ScanKind::Spool,
                code: "S1".into(),
                remaining_ms: 6000,
            }
        );
        assert!(matches!(
            engine.snapshot(at(t0, 10.0)),
            PairingSnapshot::Pending { remaining_ms: 0, .. }
        ));
        assert_eq!(engine.snapshot(at(t0, 30.0)), PairingSnapshot::Idle);
    }
}
