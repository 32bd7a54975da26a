//! The canonical retry driver (§4.5).

use std::thread;
use std::time::Duration;

use stm_core::{Error, Result};
use tracing::{debug, warn};

use crate::current;

/// Bounded exponential backoff between retry attempts, resetting on
/// success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 50,
            base_delay_ms: 1,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Capped exponential backoff for `attempt` (0-based). Overflow-safe: a
    /// shift past 63 bits saturates instead of panicking or wrapping.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(63);
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        let delay_ms = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Runs `body` inside a fresh transaction, retrying on `Conflict` with
/// [`RetryConfig::default`] backoff, until it commits or fails for another
/// reason (§4.5). `body` reads/writes [`crate::Variable`]s ambiently
/// through the current thread's transaction — it takes no transaction
/// argument.
pub fn retry<T>(body: impl Fn() -> Result<T>) -> Result<T> {
    retry_with(&RetryConfig::default(), body)
}

/// As [`retry`], with an explicit backoff configuration.
pub fn retry_with<T>(config: &RetryConfig, body: impl Fn() -> Result<T>) -> Result<T> {
    let mut attempt = 0u32;
    loop {
        let txn = current::begin();
        let outcome = body().and_then(|value| txn.commit().map(|()| value));
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() => {
                if attempt >= config.max_retries {
                    warn!(attempt, "giving up after repeated conflicts");
                    return Err(e);
                }
                let delay = config.calculate_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "conflict, retrying");
                attempt += 1;
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn calculate_delay_caps_and_does_not_overflow() {
        let config = RetryConfig::default().with_base_delay_ms(1).with_max_delay_ms(50);
        assert_eq!(config.calculate_delay(0), Duration::from_millis(1));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(2));
        assert_eq!(config.calculate_delay(10), Duration::from_millis(50));
        assert_eq!(config.calculate_delay(100), Duration::from_millis(50));
    }

    #[test]
    fn retry_commits_on_first_success() {
        let engine = Engine::new();
        let var = engine.allocate(0i64).unwrap();
        let result = retry(|| {
            var.set(var.open_for_write()? + 1)?;
            Ok::<_, Error>(())
        });
        assert!(result.is_ok());
        assert_eq!(var.read_without_opening().0, 1);
    }

    #[test]
    fn retry_eventually_gives_up_on_persistent_conflict() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::default().with_max_retries(2).with_base_delay_ms(0);
        let result: Result<()> = retry_with(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::Conflict)
        });
        assert!(matches!(result, Err(Error::Conflict)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
