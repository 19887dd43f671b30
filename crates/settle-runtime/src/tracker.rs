use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A decrement was requested while the count was already zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    Unbalanced { resource: String },
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbalanced { resource } => write!(
                f,
                "unbalanced finish on idle resource {resource:?}: active count is already 0 \
                 (a finish was reported without a matching start)"
            ),
        }
    }
}

impl Error for TrackerError {}

/// Live count of active asynchronous operations.
///
/// Every mutation is a single atomic read-modify-write that also yields the
/// new value, so exactly one caller observes the transition to zero.
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    active: AtomicUsize,
}

impl SubscriptionTracker {
    pub const fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
        }
    }

    /// Adds one active operation and returns the new count.
    pub fn increment(&self) -> usize {
        self.active.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Removes one active operation and returns the new count.
    ///
    /// At zero the count stays at zero and `Unbalanced` is returned.
    pub fn decrement(&self) -> Result<usize, Unbalanced> {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| Unbalanced)
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_idle_now(&self) -> bool {
        self.active_count() == 0
    }
}

/// Marker returned by [`SubscriptionTracker::decrement`] on underflow; the
/// resource turns it into a [`TrackerError`] carrying its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unbalanced;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_report_new_count() {
        let tracker = SubscriptionTracker::new();
        assert!(tracker.is_idle_now());
        assert_eq!(tracker.increment(), 1);
        assert_eq!(tracker.increment(), 2);
        assert_eq!(tracker.active_count(), 2);
        assert!(!tracker.is_idle_now());
    }

    #[test]
    fn decrement_reports_new_count() {
        let tracker = SubscriptionTracker::new();
        tracker.increment();
        tracker.increment();
        assert_eq!(tracker.decrement(), Ok(1));
        assert_eq!(tracker.decrement(), Ok(0));
        assert!(tracker.is_idle_now());
    }

    #[test]
    fn decrement_at_zero_is_detected_and_clamped() {
        let tracker = SubscriptionTracker::new();
        assert_eq!(tracker.decrement(), Err(Unbalanced));
        assert_eq!(tracker.active_count(), 0);

        // Still usable afterwards.
        assert_eq!(tracker.increment(), 1);
        assert_eq!(tracker.decrement(), Ok(0));
    }

    #[test]
    fn exactly_one_thread_sees_zero() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 1000;

        let tracker = SubscriptionTracker::new();
        for _ in 0..THREADS * PER_THREAD {
            tracker.increment();
        }

        let zeros = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..PER_THREAD {
                        if tracker.decrement() == Ok(0) {
                            zeros.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(zeros.load(Ordering::SeqCst), 1);
        assert!(tracker.is_idle_now());
    }

    #[test]
    fn no_lost_updates_under_contention() {
        let tracker = SubscriptionTracker::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..500 {
                        tracker.increment();
                    }
                });
            }
        });
        assert_eq!(tracker.active_count(), 2000);
    }

    #[test]
    fn idle_query_is_a_pure_read() {
        let tracker = SubscriptionTracker::new();
        tracker.increment();
        for _ in 0..10 {
            assert!(!tracker.is_idle_now());
        }
        assert_eq!(tracker.active_count(), 1);
    }
}
