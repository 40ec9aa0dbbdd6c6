//! Error classification and retry/reconnect decisions.
//!
//! Spec.md §4.3's single source of truth for whether, when, and how often to
//! retry. Shaped after `medea-jason`'s `BackoffDelayer` (a small object
//! wrapping a retry loop) but generalized into a pluggable
//! [`ErrorPolicy`] trait — mirroring the `#[cfg_attr(feature = "mockable",
//! mockall::automock)]` pattern the teacher applies to `RpcTransport` — so
//! hosts can override classification without touching the engine.

use std::time::Duration;

use derive_more::Display;

use crate::{backoff, config::BackoffConfig, error::ConnectionError};

/// Coarse classification of an error, used to decide retry eligibility.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ErrorCategory {
    /// Expected to clear up on its own; worth retrying.
    #[display(fmt = "transient")]
    Transient,
    /// Authentication-related; retried with its own bookkeeping.
    #[display(fmt = "auth")]
    Auth,
    /// A protocol-level violation; not necessarily reconnect-worthy.
    #[display(fmt = "protocol")]
    Protocol,
    /// Never worth retrying.
    #[display(fmt = "fatal")]
    Fatal,
}

/// Outcome of [`ErrorPolicyEngine::handle_error`].
#[derive(Clone, Debug)]
pub enum HandleOutcome {
    /// Error recorded, no reconnect necessary.
    Ok,
    /// Reconnect should be scheduled after `delay`.
    Retry(Duration),
    /// Give up; `reason` is a human-readable summary.
    Stop(&'static str),
}

/// Pluggable classification and retry policy.
///
/// The default exponential-backoff-with-full-jitter policy lives in
/// [`DefaultErrorPolicy`]; hosts may substitute their own to, e.g., never
/// retry a particular error kind.
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait ErrorPolicy {
    /// Categorizes an error for retry-eligibility purposes.
    fn classify(&self, error: &ConnectionError) -> ErrorCategory;

    /// Decides whether to reconnect after `attempt` prior failures, and if
    /// so, after how long.
    fn should_reconnect(&self, error: &ConnectionError, attempt: u32) -> (bool, Option<Duration>);
}

/// The default policy: exponential backoff with full jitter, per spec.md
/// §4.3.
#[derive(Clone, Debug)]
pub struct DefaultErrorPolicy {
    config: BackoffConfig,
}

impl DefaultErrorPolicy {
    /// Builds a [`DefaultErrorPolicy`] from backoff knobs.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }
}

impl ErrorPolicy for DefaultErrorPolicy {
    fn classify(&self, error: &ConnectionError) -> ErrorCategory {
        use crate::error::ErrorKind::{
            AlreadyHandling, AuthRejected, ConnectRefused, ControlFrameTooLarge, EncodeError,
            InvalidBinaryData, InvalidCloseCode, InvalidFrame, InvalidTextData, NoAuthHandler,
            ReplayFailed, ReservedCloseCode, SubscribeRejected, TimeoutAuth, TimeoutConnect,
            TimeoutUpgrade, TlsHandshakeFailed, TokenExpired, TransitionError, TransportDown,
            UnknownSubscription, UpgradeFailed,
        };
        match &error.kind {
            ConnectRefused
            | TlsHandshakeFailed
            | TransportDown
            | TimeoutConnect
            | UpgradeFailed
            | TimeoutUpgrade => ErrorCategory::Transient,
            InvalidFrame
            | InvalidTextData
            | InvalidBinaryData
            | ControlFrameTooLarge
            | InvalidCloseCode
            | ReservedCloseCode
            | SubscribeRejected
            | UnknownSubscription
            | ReplayFailed => ErrorCategory::Protocol,
            EncodeError | AuthRejected | TokenExpired | TimeoutAuth => ErrorCategory::Auth,
            TransitionError { .. } | AlreadyHandling | NoAuthHandler => ErrorCategory::Fatal,
        }
    }

    fn should_reconnect(&self, error: &ConnectionError, attempt: u32) -> (bool, Option<Duration>) {
        if matches!(self.classify(error), ErrorCategory::Fatal) {
            return (false, None);
        }
        if backoff::should_retry(&self.config, attempt) {
            (true, Some(backoff::compute_delay(&self.config, attempt)))
        } else {
            (false, None)
        }
    }
}

/// Mutable bookkeeping the engine carries across `handle_error` calls.
#[derive(Clone, Copy, Debug, Default)]
struct PolicyState {
    attempts: u32,
    handling: bool,
}

/// Owns retry bookkeeping for a single [`crate::connection::Connection`]
/// and enforces the single-in-flight-decision invariant from spec.md §4.3.
pub struct ErrorPolicyEngine<P: ErrorPolicy = DefaultErrorPolicy> {
    policy: P,
    state: PolicyState,
}

impl<P: ErrorPolicy> ErrorPolicyEngine<P> {
    /// Builds an engine around the given policy.
    #[must_use]
    pub fn new(policy: P) -> Self {
        Self { policy, state: PolicyState::default() }
    }

    /// Current number of consecutive failed attempts.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.state.attempts
    }

    /// See [`ErrorPolicy::classify`].
    #[must_use]
    pub fn classify(&self, error: &ConnectionError) -> ErrorCategory {
        self.policy.classify(error)
    }

    /// See [`ErrorPolicy::should_reconnect`].
    #[must_use]
    pub fn should_reconnect(&self, error: &ConnectionError) -> (bool, Option<Duration>) {
        self.policy.should_reconnect(error, self.state.attempts)
    }

    /// Increments the consecutive-failure counter.
    pub fn increment_attempts(&mut self) {
        self.state.attempts = self.state.attempts.saturating_add(1);
    }

    /// Resets the consecutive-failure counter to zero, per spec.md §3's
    /// invariant that this happens atomically on the first successful
    /// upgrade after a reconnect sequence.
    pub fn reset_attempts(&mut self) {
        self.state.attempts = 0;
    }

    /// Logs an error via the [`log`] facade.
    pub fn log(&self, error: &ConnectionError) {
        log::warn!("connection error: {error} (attempt {})", self.state.attempts);
    }

    /// Runs the full classify → decide → bookkeeping pipeline for a single
    /// error, per spec.md §4.3.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ErrorKind::AlreadyHandling`] if a previous
    /// call's decision is still in flight (i.e. [`Self::finish_handling`]
    /// was never called).
    pub fn handle_error(
        &mut self,
        error: &ConnectionError,
    ) -> Result<HandleOutcome, crate::error::ErrorKind> {
        if self.state.handling {
            return Err(crate::error::ErrorKind::AlreadyHandling);
        }
        self.state.handling = true;
        self.log(error);

        let outcome = if matches!(self.classify(error), ErrorCategory::Fatal) {
            HandleOutcome::Stop("fatal error")
        } else {
            let (should, delay) = self.should_reconnect(error);
            if should {
                self.increment_attempts();
                HandleOutcome::Retry(delay.unwrap_or_default())
            } else {
                HandleOutcome::Stop("max attempts exceeded")
            }
        };
        Ok(outcome)
    }

    /// Marks the in-flight reconnect decision as resolved, re-enabling
    /// [`Self::handle_error`]. Call this once the scheduled retry (or the
    /// decision to stop) has been acted on by the runtime.
    pub fn finish_handling(&mut self) {
        self.state.handling = false;
    }
}

impl Default for ErrorPolicyEngine<DefaultErrorPolicy> {
    fn default() -> Self {
        Self::new(DefaultErrorPolicy::new(BackoffConfig::default()))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::{DefaultErrorPolicy, ErrorCategory, ErrorPolicyEngine, HandleOutcome};
    use crate::{
        config::BackoffConfig,
        error::{ConnectionError, ErrorKind},
    };

    fn transient_error() -> ConnectionError {
        ConnectionError::new(ErrorKind::TransportDown, HashMap::new())
    }

    fn fatal_error() -> ConnectionError {
        ConnectionError::new(ErrorKind::NoAuthHandler, HashMap::new())
    }

    #[test]
    fn classify_matches_taxonomy_groups() {
        let policy = DefaultErrorPolicy::new(BackoffConfig::default());
        assert_eq!(policy.classify(&transient_error()), ErrorCategory::Transient);
        assert_eq!(policy.classify(&fatal_error()), ErrorCategory::Fatal);
    }

    #[test]
    fn handle_error_retries_transient_and_stops_fatal() {
        let mut engine = ErrorPolicyEngine::new(DefaultErrorPolicy::new(BackoffConfig {
            base: Duration::from_millis(10),
            cap: Duration::from_millis(100),
            max_attempts: 3,
        }));

        match engine.handle_error(&transient_error()).unwrap() {
            HandleOutcome::Retry(_) => {}
            other => panic!("expected retry, got {other:?}"),
        }
        assert_eq!(engine.attempts(), 1);
        engine.finish_handling();

        match engine.handle_error(&fatal_error()).unwrap() {
            HandleOutcome::Stop(_) => {}
            other => panic!("expected stop, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_handle_error_is_rejected() {
        let mut engine = ErrorPolicyEngine::default();
        engine.handle_error(&transient_error()).unwrap();
        let err = engine.handle_error(&transient_error()).unwrap_err();
        assert_eq!(err, ErrorKind::AlreadyHandling);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut engine = ErrorPolicyEngine::new(DefaultErrorPolicy::new(BackoffConfig {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(1),
            max_attempts: 2,
        }));
        for _ in 0..2 {
            engine.handle_error(&transient_error()).unwrap();
            engine.finish_handling();
        }
        match engine.handle_error(&transient_error()).unwrap() {
            HandleOutcome::Stop(_) => {}
            other => panic!("expected stop after max attempts, got {other:?}"),
        }
    }

    #[test]
    fn reset_attempts_zeroes_counter() {
        let mut engine = ErrorPolicyEngine::default();
        engine.increment_attempts();
        engine.increment_attempts();
        assert_eq!(engine.attempts(), 2);
        engine.reset_attempts();
        assert_eq!(engine.attempts(), 0);
    }
}
