use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::timer::TimerSlot;

pub const DEFAULT_IDLE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintState {
    Hidden,
    /// Terminal for the lifetime of the displayed list.
    Revealed,
}

/// Reveals the popular-items hint once a list has stayed empty for `idle`.
#[derive(Debug, Clone)]
pub struct IdleHint {
    idle: Duration,
    state: HintState,
    timer: TimerSlot,
}

impl Default for IdleHint {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE)
    }
}

impl IdleHint {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            state: HintState::Hidden,
            timer: TimerSlot::new(),
        }
    }

    pub fn state(&self) -> HintState {
        self.state
    }

    pub fn is_revealed(&self) -> bool {
        self.state == HintState::Revealed
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Feeds the current emptiness of the list. An already pending timer is
    /// left alone so the idle period is measured from when emptiness began.
    pub fn observe(&mut self, is_empty: bool, now: Instant) {
        if self.is_revealed() {
            return;
        }
        if !is_empty {
            if self.timer.cancel() {
                debug!("list filled before idle hint fired");
            }
            return;
        }
        if !self.timer.is_armed() {
            self.timer.arm(now, self.idle);
        }
    }

    /// Returns true exactly once, on the transition to `Revealed`.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.is_revealed() || !self.timer.fire(now) {
            return false;
        }
        self.state = HintState::Revealed;
        debug!("idle hint revealed");
        true
    }

    /// Drops any pending timer; called when the displayed list goes away.
    pub fn teardown(&mut self) {
        self.timer.cancel();
    }
}
