//! Exponential backoff with full jitter.
//!
//! Shaped after `medea-jason`'s [`BackoffDelayer`] (`rpc/backoff_delayer.rs`)
//! — a small object wrapping the retry math — but the formula itself is
//! hand-rolled rather than delegated to the `backoff` crate, since spec.md
//! §4.3 names an exact formula that general-purpose exponential-backoff
//! policies don't implement: `delay = min(cap, base * 2^attempt) *
//! rand(0.5, 1.5)`.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Computes the backoff delay for a given (zero-based) attempt number.
///
/// `attempt` is the number of already-failed attempts, i.e. `0` for the
/// first retry. The result is the deterministic exponential term clamped to
/// `cap`, scaled by a uniform jitter factor in `[0.5, 1.5)`.
#[must_use]
pub fn compute_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let exponent = attempt.min(32);
    let exp_delay_ms = config
        .base
        .as_millis()
        .saturating_mul(1u128 << exponent)
        .min(config.cap.as_millis());
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let jittered_ms = (exp_delay_ms as f64 * jitter) as u64;
    Duration::from_millis(jittered_ms)
}

/// Whether another attempt should be made given how many have already
/// failed, per spec.md §4.3: the `max_attempts`-th consecutive failure
/// closes the connection, so retries stop once `attempt + 1 >=
/// max_attempts`.
#[must_use]
pub fn should_retry(config: &BackoffConfig, attempt: u32) -> bool {
    attempt + 1 < config.max_attempts
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{compute_delay, should_retry};
    use crate::config::BackoffConfig;

    #[test]
    fn delay_is_clamped_to_cap() {
        let config = BackoffConfig {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
            max_attempts: 10,
        };
        for attempt in 0..20 {
            let delay = compute_delay(&config, attempt);
            assert!(delay <= Duration::from_millis(7500), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn first_attempt_jitters_around_base() {
        let config = BackoffConfig {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
            max_attempts: 3,
        };
        for _ in 0..50 {
            let delay = compute_delay(&config, 0);
            assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn retries_stop_at_max_attempts() {
        let config = BackoffConfig {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(1),
            max_attempts: 3,
        };
        assert!(should_retry(&config, 0));
        assert!(should_retry(&config, 1));
        assert!(!should_retry(&config, 2));
    }
}
