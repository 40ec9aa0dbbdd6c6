//! Connection configuration.
//!
//! The core never reads configuration from a file or the environment (out
//! of scope per spec.md §1); the host builds a [`ConnectionConfig`] and
//! plumbs it in at construction time, per the redesign note in spec.md §9.
//! Live reload goes through [`crate::connection::RuntimeCommand::UpdateConfig`]
//! rather than a global re-read.

use std::time::Duration;

use url::Url;

/// Endpoint a [`crate::connection::Connection`] dials.
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Full target URL, e.g. `wss://example.com:443/stream`.
    pub url: Url,
}

impl Endpoint {
    /// Builds an [`Endpoint`] from a URL.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Whether this endpoint requires TLS (`wss`).
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "wss"
    }
}

/// Backoff knobs for the [`crate::error_policy`] engine.
#[derive(Clone, Copy, Debug)]
pub struct BackoffConfig {
    /// Base delay used in the exponential backoff formula.
    pub base: Duration,
    /// Upper bound the computed delay is clamped to.
    pub cap: Duration,
    /// Number of consecutive failed attempts before giving up entirely.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

/// Deadlines for various suspension points, per spec.md §5.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    /// Deadline for the initial TCP/TLS connect.
    pub connect: Duration,
    /// Deadline for the HTTP → WebSocket upgrade handshake.
    pub upgrade: Duration,
    /// Deadline for an auth response after `authenticate` dispatches.
    pub auth_response: Duration,
    /// Interval between `check_reauthentication` polls.
    pub reauth_poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            upgrade: Duration::from_secs(10),
            auth_response: Duration::from_secs(10),
            reauth_poll: Duration::from_secs(30),
        }
    }
}

/// Full configuration for a [`crate::connection::Connection`].
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// The endpoint to dial.
    pub endpoint: Endpoint,
    /// Backoff/retry knobs.
    pub backoff: BackoffConfig,
    /// Suspension-point deadlines.
    pub timeouts: Timeouts,
}

impl ConnectionConfig {
    /// Builds a [`ConnectionConfig`] with default backoff and timeouts.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint, backoff: BackoffConfig::default(), timeouts: Timeouts::default() }
    }
}
