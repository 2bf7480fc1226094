//! Rolling window of recently admitted event timestamps
//!
//! Slack may redeliver a message (socket reconnects, retries). High resolution
//! message timestamps are unique enough to key on, so a repeat `ts` inside the
//! horizon is treated as a redelivery and dropped. The window lives only in
//! memory: after a restart, or once an entry ages past the horizon, the same
//! event is admitted again.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub struct DedupWindow {
    horizon: Duration,
    seen: Mutex<HashSet<u64>>,
}

impl DedupWindow {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// True if `timestamp` has not been admitted within the horizon.
    pub fn admit(&self, timestamp: f64) -> bool {
        self.admit_at(timestamp, now_unix_secs())
    }

    /// Same as [`admit`](Self::admit) with an explicit wall clock reading.
    ///
    /// Pruning, the membership check and the insert happen under one lock, so
    /// two concurrent deliveries of the same `ts` admit at most one of them.
    pub fn admit_at(&self, timestamp: f64, now: f64) -> bool {
        let cutoff = now - self.horizon.as_secs_f64();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());

        seen.retain(|bits| f64::from_bits(*bits) > cutoff);
        seen.insert(timestamp.to_bits())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn now_unix_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn repeat_within_horizon_is_rejected() {
        let window = DedupWindow::new(HOUR);
        let ts = 1_712_345_678.000_1;
        assert!(window.admit_at(ts, ts));
        assert!(!window.admit_at(ts, ts + 1.0));
        assert!(!window.admit_at(ts, ts + 3599.0));
    }

    #[test]
    fn repeat_after_horizon_is_admitted_again() {
        let window = DedupWindow::new(HOUR);
        let ts = 1_712_345_678.5;
        assert!(window.admit_at(ts, ts));
        assert!(window.admit_at(ts, ts + 3600.5));
    }

    #[test]
    fn distinct_sub_second_timestamps_are_distinct_events() {
        let window = DedupWindow::new(HOUR);
        assert!(window.admit_at(100.000_001, 100.0));
        assert!(window.admit_at(100.000_002, 100.0));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn old_entries_are_pruned() {
        let window = DedupWindow::new(HOUR);
        assert!(window.admit_at(10.0, 10.0));
        assert!(window.admit_at(20.0, 20.0));
        assert!(window.admit_at(5000.0, 5000.0));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn concurrent_admits_of_same_timestamp_admit_once() {
        let window = Arc::new(DedupWindow::new(HOUR));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let window = Arc::clone(&window);
                std::thread::spawn(move || window.admit_at(42.0, 42.0))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn admit_uses_wall_clock() {
        let window = DedupWindow::new(HOUR);
        let now = now_unix_secs();
        assert!(window.admit(now));
        assert!(!window.admit(now));
        assert_eq!(window.len(), 1);
    }
}
