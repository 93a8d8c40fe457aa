use rand::{thread_rng, Rng};
use std::time::Duration;

/// Backoff schedule for repeated discovery/join cycles.
///
/// The budget counts whole cycles, not delays: a policy with `attempts = 3`
/// permits three cycles separated by two delays.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter_fraction: f64,
}

impl RetryPolicy {
    pub fn exponential(attempts: usize, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(60),
            jitter_fraction: 0.0,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        if !max_delay.is_zero() {
            self.max_delay = max_delay;
        }
        self
    }

    /// Randomize each delay within `±fraction` of its nominal value.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn handle(&self) -> RetryHandle {
        RetryHandle {
            policy: self.clone(),
            completed: 0,
        }
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let shift = attempt.saturating_sub(1).min(31);
        let scaled = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << shift)
            .min(u128::from(u64::MAX));
        let bounded = Duration::from_millis(scaled as u64).min(self.max_delay);
        if bounded.is_zero() || self.jitter_fraction <= 0.0 {
            return bounded;
        }
        let factor = thread_rng().gen_range(1.0 - self.jitter_fraction..=1.0 + self.jitter_fraction);
        let jittered = (bounded.as_millis() as f64 * factor).round().max(0.0);
        Duration::from_millis(jittered.min(u128::from(u64::MAX) as f64) as u64)
    }
}

pub struct RetryHandle {
    policy: RetryPolicy,
    completed: usize,
}

impl RetryHandle {
    /// Delay before the next cycle, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.completed + 1 >= self.policy.attempts {
            return None;
        }
        self.completed += 1;
        Some(self.policy.delay_for_attempt(self.completed))
    }

    /// Cycles started so far, counting the initial one.
    pub fn cycles(&self) -> usize {
        self.completed + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_cycles_not_delays() {
        let mut handle = RetryPolicy::exponential(3, Duration::from_millis(10)).handle();
        assert!(handle.next_delay().is_some());
        assert!(handle.next_delay().is_some());
        assert!(handle.next_delay().is_none());
        assert_eq!(handle.cycles(), 3);
    }

    #[test]
    fn single_attempt_never_delays() {
        let mut handle = RetryPolicy::exponential(1, Duration::from_millis(10)).handle();
        assert!(handle.next_delay().is_none());
    }

    #[test]
    fn delays_grow_until_capped() {
        let policy = RetryPolicy::exponential(16, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(400));
        let mut handle = policy.handle();
        let delays: Vec<_> = std::iter::from_fn(|| handle.next_delay()).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert!(delays[3..].iter().all(|d| *d == Duration::from_millis(400)));
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let policy = RetryPolicy::exponential(64, Duration::from_millis(100)).with_jitter(0.2);
        let mut handle = policy.handle();
        let first = handle.next_delay().unwrap();
        assert!(first >= Duration::from_millis(80) && first <= Duration::from_millis(120));
    }

    #[test]
    fn unbounded_budget_keeps_yielding() {
        let mut handle = RetryPolicy::exponential(usize::MAX, Duration::from_millis(1)).handle();
        for _ in 0..10_000 {
            assert!(handle.next_delay().is_some());
        }
    }
}
