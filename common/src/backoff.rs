use std::time::Duration;

use crate::config::SchedulerConfig;

/// Failure-adaptive spacing of poll cycles.
///
/// After `n` consecutive failures the next poll waits
/// `min(initial * factor^n, ceiling)`, truncated to whole milliseconds. A
/// success resets the failure count and the next poll waits the nominal interval.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    nominal: Duration,
    initial: Duration,
    ceiling: Duration,
    factor: f64,
    consecutive_failures: u32,
    current: Duration,
}

impl PollBackoff {
    pub fn new(config: &SchedulerConfig) -> Self {
        let mut config = config.clone();
        config.sanitize();

        let initial = Duration::from_millis(config.min_error_interval_ms);
        Self {
            nominal: config.poll_interval(),
            initial,
            ceiling: Duration::from_millis(config.max_error_interval_ms),
            factor: config.error_interval_multiplier,
            consecutive_failures: 0,
            current: initial,
        }
    }

    /// Records a successful cycle and returns the delay before the next one.
    pub fn on_success(&mut self) -> Duration {
        self.consecutive_failures = 0;
        self.current = self.initial;
        self.nominal
    }

    /// Records a failed cycle and returns the widened delay before the next one.
    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current = self.interval_after(self.consecutive_failures);
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Error backoff interval; equals the minimum while no failures are recorded.
    pub fn current(&self) -> Duration {
        self.current
    }

    fn interval_after(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let ceiling_ms = self.ceiling.as_millis() as f64;
        let scaled_ms = self.initial.as_millis() as f64 * self.factor.powi(exponent);
        Duration::from_millis(scaled_ms.min(ceiling_ms).floor() as u64)
    }
}
