//! Exponential backoff keyed by operation class.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    Publish,
    Subscribe,
    BatchSubscribe,
    Unsubscribe,
}

/// Delay before the next attempt is `base * 2^(failures - 1)`, capped at
/// `max`. Any success resets the class.
pub struct ConditionalExponentialBackoffStrategy {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<OperationClass, u32>>,
}

impl ConditionalExponentialBackoffStrategy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// How long to wait before the next attempt, `None` when the last attempt
    /// did not fail.
    pub fn should_backoff(&self, class: OperationClass) -> Option<Duration> {
        let failures = self.failures(class);
        if failures == 0 {
            return None;
        }

        let exponent = (failures - 1).min(31);
        let delay = self.base.saturating_mul(1u32 << exponent);
        Some(delay.min(self.max))
    }

    pub fn on_failure(&self, class: OperationClass) {
        match self.failures.lock() {
            Ok(mut failures) => {
                let count = failures.entry(class).or_insert(0);
                *count = count.saturating_add(1);
            }
            Err(e) => log::error!("backoff state poisoned: {e}"),
        }
    }

    pub fn on_success(&self, class: OperationClass) {
        match self.failures.lock() {
            Ok(mut failures) => {
                failures.remove(&class);
            }
            Err(e) => log::error!("backoff state poisoned: {e}"),
        }
    }

    pub fn failures(&self, class: OperationClass) -> u32 {
        self.failures
            .lock()
            .map(|failures| failures.get(&class).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Default for ConditionalExponentialBackoffStrategy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_and_reset() {
        let backoff = ConditionalExponentialBackoffStrategy::new(
            Duration::from_millis(100),
            Duration::from_millis(1000),
        );
        let class = OperationClass::Publish;

        assert_eq!(backoff.should_backoff(class), None);

        backoff.on_failure(class);
        assert_eq!(backoff.should_backoff(class), Some(Duration::from_millis(100)));
        backoff.on_failure(class);
        assert_eq!(backoff.should_backoff(class), Some(Duration::from_millis(200)));
        backoff.on_failure(class);
        assert_eq!(backoff.should_backoff(class), Some(Duration::from_millis(400)));
        for _ in 0..40 {
            backoff.on_failure(class);
        }
        assert_eq!(backoff.should_backoff(class), Some(Duration::from_millis(1000)));

        backoff.on_success(class);
        assert_eq!(backoff.should_backoff(class), None);
    }

    #[test]
    fn test_classes_are_independent() {
        let backoff = ConditionalExponentialBackoffStrategy::default();
        backoff.on_failure(OperationClass::BatchSubscribe);
        backoff.on_failure(OperationClass::BatchSubscribe);

        assert!(backoff.should_backoff(OperationClass::BatchSubscribe).is_some());
        assert_eq!(backoff.should_backoff(OperationClass::Publish), None);

        backoff.on_success(OperationClass::Publish);
        assert_eq!(backoff.failures(OperationClass::BatchSubscribe), 2);
    }
}
