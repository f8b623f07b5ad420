use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use super::event::ScanEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted(ScanEvent),
    /// Same code seen again inside its quiet period.
    Suppressed(ScanEvent),
}

/// Collapses a code held in front of the scanner into one logical scan.
///
/// State is kept per code, so alternating between two different codes is never
/// suppressed. A suppressed repeat pushes its code's quiet period forward.
#[derive(Debug)]
pub struct Debouncer {
    quiet_period: Duration,
    last_seen: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            last_seen: HashMap::new(),
        }
    }

    pub fn admit(&mut self, event: ScanEvent) -> Admission {
        let now = event.observed_at;
        self.prune(now);

        let repeat = self
            .last_seen
            .get(&event.code)
            .is_some_and(|last| now.saturating_duration_since(*last) <= self.quiet_period);

        self.last_seen.insert(event.code.clone(), now);

        if repeat {
            Admission::Suppressed(event)
        } else {
            Admission::Admitted(event)
        }
    }

    /// Number of codes currently inside their quiet period.
    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
    }

    fn prune(&mut self, now: Instant) {
        let quiet_period = self.quiet_period;
        self.last_seen
            .retain(|_, last| now.saturating_duration_since(*last) <= quiet_period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::event::ScanKind;

    const QUIET: Duration = Duration::from_millis(1500);

    fn spool(code: &str, at: Instant) -> ScanEvent {
        ScanEvent::new(ScanKind::Spool, code, at)
    }

    fn admitted(admission: &Admission) -> bool {
        matches!(admission, Admission::Admitted(_))
    }

    #[test]
    fn held_code_yields_one_event() {
        let mut debouncer = Debouncer::new(QUIET);
        let t0 = Instant::now();

        let admitted_count = (0..20)
            .map(|frame| debouncer.admit(spool("fs://spool/a", t0 + Duration::from_millis(frame * 50))))
            .filter(admitted)
            .count();

        assert_eq!(admitted_count, 1);
    }

    #[test]
    fn holding_keeps_refreshing_the_quiet_period() {
        let mut debouncer = Debouncer::new(QUIET);
        let t0 = Instant::now();

        assert!(admitted(&debouncer.admit(spool("fs://spool/a", t0))));
        // Each repeat lands inside the previous one's quiet period.
        for step in 1..=4 {
            let at = t0 + Duration::from_millis(step * 1000);
            assert!(!admitted(&debouncer.admit(spool("fs://spool/a", at))));
        }
        let after_release = t0 + Duration::from_millis(4000) + QUIET + Duration::from_millis(1);
        assert!(admitted(&debouncer.admit(spool("fs://spool/a", after_release))));
    }

    #[test]
    fn different_codes_do_not_suppress_each_other() {
        let mut debouncer = Debouncer::new(QUIET);
        let t0 = Instant::now();

        assert!(admitted(&debouncer.admit(spool("fs://spool/a", t0))));
        assert!(admitted(&debouncer.admit(ScanEvent::new(
            ScanKind::Location,
            "fs://loc/ams-1",
            t0 + Duration::from_millis(100),
        ))));
        assert!(admitted(&debouncer.admit(spool("fs://spool/b", t0 + Duration::from_millis(200)))));
    }

    #[test]
    fn rescan_after_quiet_period_is_admitted() {
        let mut debouncer = Debouncer::new(QUIET);
        let t0 = Instant::now();

        assert!(admitted(&debouncer.admit(spool("fs://spool/a", t0))));
        assert!(admitted(&debouncer.admit(spool("fs://spool/a", t0 + Duration::from_secs(2)))));
    }

    #[test]
    fn stale_codes_are_pruned() {
        let mut debouncer = Debouncer::new(QUIET);
        let t0 = Instant::now();

        debouncer.admit(spool("fs://spool/a", t0));
        debouncer.admit(spool("fs://spool/b", t0));
        assert_eq!(debouncer.tracked(), 2);

        debouncer.admit(spool("fs://spool/c", t0 + Duration::from_secs(5)));
        assert_eq!(debouncer.tracked(), 1);
    }
}
