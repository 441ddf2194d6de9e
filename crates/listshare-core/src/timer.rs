//! Single-shot deadlines owned by the component that armed them.
//!
//! Nothing here spawns or sleeps: the session loop asks every component for
//! its earliest deadline, sleeps until then, and hands the current instant
//! back. Dropping a component releases its timer with it.

use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerSlot {
    deadline: Option<Instant>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the slot to fire `after` from `now`.
    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    /// Disarms the slot. Safe to call when already idle or already fired.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consumes the deadline if it has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

pub fn earliest<I>(deadlines: I) -> Option<Instant>
where
    I: IntoIterator<Item = Option<Instant>>,
{
    deadlines.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_deadline() {
        let start = Instant::now();
        let mut slot = TimerSlot::new();
        slot.arm(start, Duration::from_millis(100));

        assert!(!slot.fire(start + Duration::from_millis(99)));
        assert!(slot.fire(start + Duration::from_millis(100)));
        assert!(!slot.fire(start + Duration::from_millis(500)));
    }

    #[test]
    fn cancel_is_idempotent() {
        let start = Instant::now();
        let mut slot = TimerSlot::new();
        assert!(!slot.cancel());

        slot.arm(start, Duration::from_millis(10));
        assert!(slot.cancel());
        assert!(!slot.cancel());
        assert!(!slot.fire(start + Duration::from_secs(1)));
    }

    #[test]
    fn earliest_ignores_idle_slots() {
        let start = Instant::now();
        let later = start + Duration::from_secs(5);
        assert_eq!(earliest([None, Some(later), Some(start)]), Some(start));
        assert_eq!(earliest([None, None]), None);
    }
}
