use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};

/// Wall clock for ingestion timestamps that never goes backwards within a process
///
/// If the system clock steps back, the last issued instant is reused until
/// wall time catches up.
#[derive(Debug)]
pub struct IngestClock {
    last: Mutex<DateTime<Utc>>,
}

impl Default for IngestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.stamp(Utc::now())
    }

    fn stamp(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let stamped = wall.max(*last);
        *last = stamped;
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_tracks_wall_clock() {
        let clock = IngestClock::new();
        let before = Utc::now();
        let stamped = clock.now();
        let after = Utc::now();

        assert!(before <= stamped && stamped <= after);
    }

    #[test]
    fn test_clock_step_back_is_clamped() {
        let clock = IngestClock::new();
        let t0 = Utc::now();

        assert_eq!(clock.stamp(t0), t0);
        assert_eq!(clock.stamp(t0 - Duration::seconds(5)), t0);
        assert_eq!(clock.stamp(t0 + Duration::seconds(1)), t0 + Duration::seconds(1));
    }

    #[test]
    fn test_successive_stamps_are_non_decreasing() {
        let clock = IngestClock::new();
        let mut previous = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next >= previous);
            previous = next;
        }
    }
}
