//! Rate-limited suggestion lookups for the add-item input.

use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::RemoteError;
use crate::timer::TimerSlot;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(150);
pub const DEFAULT_MIN_CHARS: usize = 2;

/// A lookup the caller should issue. `generation` must be handed back with
/// the result so stale answers can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub generation: u64,
    pub query: String,
}

#[derive(Debug, Clone)]
pub struct QueryDebouncer {
    quiet: Duration,
    min_chars: usize,
    input: String,
    timer: TimerSlot,
    generation: u64,
    results: Vec<String>,
}

impl Default for QueryDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD, DEFAULT_MIN_CHARS)
    }
}

impl QueryDebouncer {
    pub fn new(quiet: Duration, min_chars: usize) -> Self {
        Self {
            quiet,
            min_chars,
            input: String::new(),
            timer: TimerSlot::new(),
            generation: 0,
            results: Vec::new(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn results(&self) -> &[String] {
        &self.results
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Records a new input value. Every change supersedes whatever lookup is
    /// in flight; short inputs clear the results right away.
    pub fn on_input(&mut self, text: impl Into<String>, now: Instant) {
        self.input = text.into();
        self.generation += 1;

        if self.input.chars().count() < self.min_chars {
            self.timer.cancel();
            self.results.clear();
            trace!(generation = self.generation, "input below minimum; suggestions cleared");
            return;
        }

        self.timer.arm(now, self.quiet);
        trace!(generation = self.generation, "quiet period restarted");
    }

    /// Emits the lookup once the input has been stable for the quiet period.
    pub fn poll(&mut self, now: Instant) -> Option<LookupRequest> {
        if !self.timer.fire(now) {
            return None;
        }
        debug!(generation = self.generation, query = %self.input, "issuing suggestion lookup");
        Some(LookupRequest {
            generation: self.generation,
            query: self.input.clone(),
        })
    }

    /// Applies a lookup result unless a newer input has superseded it.
    /// Failures clear to an empty set.
    pub fn on_result(&mut self, generation: u64, result: Result<Vec<String>, RemoteError>) -> bool {
        if generation != self.generation {
            debug!(
                stale = generation,
                current = self.generation,
                "discarding superseded suggestions"
            );
            return false;
        }
        self.results = match result {
            Ok(names) => names,
            Err(error) => {
                debug!(%error, "suggestion lookup failed; clearing");
                Vec::new()
            }
        };
        true
    }

    /// Empties the input and the suggestions, e.g. after an item was added.
    pub fn clear(&mut self) {
        self.input.clear();
        self.generation += 1;
        self.timer.cancel();
        self.results.clear();
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_of_changes_issues_one_lookup_with_final_value() {
        let start = Instant::now();
        let mut debouncer = QueryDebouncer::default();
        let mut issued = Vec::new();

        for (offset, text) in [(0, "mi"), (30, "mil"), (60, "milk"), (90, "milk "), (120, "milky")] {
            let now = start + ms(offset);
            debouncer.on_input(text, now);
            issued.extend(debouncer.poll(now));
        }
        for step in (130..=400).step_by(10) {
            issued.extend(debouncer.poll(start + ms(step)));
        }

        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].query, "milky");
        assert_eq!(issued[0].generation, debouncer.generation());
    }

    #[test]
    fn lookup_waits_for_full_quiet_period() {
        let start = Instant::now();
        let mut debouncer = QueryDebouncer::default();
        debouncer.on_input("br", start);

        assert!(debouncer.poll(start + ms(149)).is_none());
        assert!(debouncer.poll(start + ms(150)).is_some());
        assert!(debouncer.poll(start + ms(300)).is_none());
    }

    #[test]
    fn short_input_clears_immediately_without_lookup() {
        let start = Instant::now();
        let mut debouncer = QueryDebouncer::default();
        debouncer.on_input("mi", start);
        let request = debouncer.poll(start + ms(150)).expect("lookup");
        assert!(debouncer.on_result(request.generation, Ok(vec!["Молоко".into()])));
        assert_eq!(debouncer.results().len(), 1);

        debouncer.on_input("m", start + ms(200));
        assert!(debouncer.results().is_empty());
        assert_eq!(debouncer.deadline(), None);
        assert!(debouncer.poll(start + ms(1000)).is_none());
    }

    #[test]
    fn late_results_from_superseded_query_are_discarded() {
        let start = Instant::now();
        let mut debouncer = QueryDebouncer::default();

        debouncer.on_input("ch", start);
        let first = debouncer.poll(start + ms(150)).expect("first lookup");

        debouncer.on_input("cheese", start + ms(200));
        let second = debouncer.poll(start + ms(350)).expect("second lookup");

        assert!(debouncer.on_result(second.generation, Ok(vec!["cheese".into()])));
        assert!(!debouncer.on_result(first.generation, Ok(vec!["cherries".into()])));
        assert_eq!(debouncer.results(), ["cheese".to_string()]);
    }

    #[test]
    fn failures_clear_results_silently() {
        let start = Instant::now();
        let mut debouncer = QueryDebouncer::default();
        debouncer.on_input("ap", start);
        let first = debouncer.poll(start + ms(150)).expect("lookup");
        debouncer.on_result(first.generation, Ok(vec!["apples".into()]));

        debouncer.on_input("app", start + ms(200));
        let second = debouncer.poll(start + ms(350)).expect("lookup");
        assert!(debouncer.on_result(second.generation, Err(RemoteError::Status(502))));
        assert!(debouncer.results().is_empty());
    }

    #[test]
    fn clear_and_cancel_are_safe_to_repeat() {
        let start = Instant::now();
        let mut debouncer = QueryDebouncer::default();
        debouncer.on_input("eggs", start);
        debouncer.clear();
        debouncer.clear();
        debouncer.cancel();

        assert_eq!(debouncer.input(), "");
        assert!(debouncer.poll(start + ms(500)).is_none());
    }
}
