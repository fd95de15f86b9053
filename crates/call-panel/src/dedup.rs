//! Optional suppression of re-delivered call events.
//!
//! The call server delivers at least once, so a reconnect can replay a call. A doctor
//! may also call the same patient twice on purpose, and that second call must be announced.
//! The filter therefore only drops an event that repeats the same attendance and office
//! within a short window. Panels run without it unless configured.

use clinic_core::CallEvent;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RedeliveryFilter {
    window: Duration,
    seen: HashMap<(i64, Option<u32>), Instant>,
}

impl RedeliveryFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if the event should be shown and announced.
    pub fn admit(&mut self, event: &CallEvent, now: Instant) -> bool {
        let window = self.window;
        self.seen
            .retain(|_, at| now.saturating_duration_since(*at) < window);

        let key = (event.attendance_id, event.office_number);
        if self.seen.contains_key(&key) {
            tracing::debug!(
                "dropping re-delivered call for attendance {}",
                event.attendance_id
            );
            return false;
        }
        self.seen.insert(key, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::Patient;

    fn call(attendance_id: i64, office: Option<u32>) -> CallEvent {
        CallEvent {
            sequence: 0,
            attendance_id,
            patient: Patient {
                id: 1,
                full_name: "MARIA".into(),
                cpf: "52998224725".into(),
                birth_date: "1990-05-17".into(),
            },
            office_number: office,
        }
    }

    #[test]
    fn test_drops_repeat_inside_window_only() {
        let mut filter = RedeliveryFilter::new(Duration::from_secs(3));
        let t0 = Instant::now();

        assert!(filter.admit(&call(1, Some(2)), t0));
        assert!(!filter.admit(&call(1, Some(2)), t0 + Duration::from_secs(1)));
        assert!(filter.admit(&call(1, Some(3)), t0 + Duration::from_secs(1)));
        assert!(filter.admit(&call(2, Some(2)), t0 + Duration::from_secs(1)));
        assert!(filter.admit(&call(1, Some(2)), t0 + Duration::from_secs(4)));
    }
}
