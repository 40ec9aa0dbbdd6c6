//! Unified error taxonomy for the connection runtime.
//!
//! `medea-jason`'s `rpc` module threads `SessionError`/`TransportError`/
//! `RpcClientError` through `tracerr::Traced` so a capture-site backtrace
//! rides along with every fallible call. This crate's internal error flow
//! is entirely intra-process (state machine, policy engine, and overlays
//! all live on one task and report outward through [`ConnectionError`]
//! rather than bubbling via `?` across module boundaries), so there's no
//! remaining call site that benefits from a traced backtrace; `tracerr` is
//! dropped accordingly (see `DESIGN.md`).

use std::{collections::HashMap, time::SystemTime};

use derive_more::Display;

/// Which subsystem an [`ConnectionError`] originated from.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ErrorSource {
    /// Underlying socket/TLS/TCP layer.
    #[display(fmt = "transport")]
    Transport,

    /// WebSocket framing or upgrade handshake.
    #[display(fmt = "protocol")]
    Protocol,

    /// Authentication flow.
    #[display(fmt = "auth")]
    Auth,

    /// Subscription registry.
    #[display(fmt = "subscription")]
    Subscription,

    /// Everything internal to the runtime itself.
    #[display(fmt = "internal")]
    Internal,
}

/// Taxonomy of error kinds, grouped by [`ErrorSource`].
///
/// These are kinds, not types: every variant here is a leaf the policy
/// engine can [classify](crate::error_policy::ErrorPolicy::classify) and the
/// callback sink can report, never a type callers are expected to downcast.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum ErrorKind {
    /// Remote end refused the TCP/TLS connection.
    #[display(fmt = "connect refused")]
    ConnectRefused,
    /// TLS handshake did not complete.
    #[display(fmt = "TLS handshake failed")]
    TlsHandshakeFailed,
    /// An established transport went away.
    #[display(fmt = "transport down")]
    TransportDown,
    /// Connect attempt did not complete before its deadline.
    #[display(fmt = "timed out connecting")]
    TimeoutConnect,

    /// A frame failed [`crate::codec::validate`].
    #[display(fmt = "invalid frame")]
    InvalidFrame,
    /// Text frame payload was not valid UTF-8.
    #[display(fmt = "invalid text data")]
    InvalidTextData,
    /// Binary frame payload was rejected by the adapter.
    #[display(fmt = "invalid binary data")]
    InvalidBinaryData,
    /// A ping/pong/close control frame exceeded 125 bytes.
    #[display(fmt = "control frame too large")]
    ControlFrameTooLarge,
    /// A close code outside the valid ranges was used.
    #[display(fmt = "invalid close code")]
    InvalidCloseCode,
    /// A close code that must never appear on the wire was used.
    #[display(fmt = "reserved close code")]
    ReservedCloseCode,
    /// The HTTP/1.1 → WebSocket upgrade failed.
    #[display(fmt = "upgrade failed")]
    UpgradeFailed,
    /// Upgrade did not complete before its deadline.
    #[display(fmt = "timed out upgrading")]
    TimeoutUpgrade,

    /// Auth payload could not be encoded.
    #[display(fmt = "failed to encode auth payload")]
    EncodeError,
    /// Server rejected the authentication attempt.
    #[display(fmt = "auth rejected")]
    AuthRejected,
    /// A previously-issued token has expired.
    #[display(fmt = "token expired")]
    TokenExpired,
    /// Auth response did not arrive before its deadline.
    #[display(fmt = "timed out waiting for auth response")]
    TimeoutAuth,

    /// Subscription handler rejected a subscribe request.
    #[display(fmt = "subscribe rejected")]
    SubscribeRejected,
    /// A response referenced a subscription id the registry doesn't know.
    #[display(fmt = "unknown subscription")]
    UnknownSubscription,
    /// A post-reconnect replay attempt failed.
    #[display(fmt = "subscription replay failed")]
    ReplayFailed,

    /// An illegal state transition was attempted.
    #[display(fmt = "transition error: {} -> {}: {}", from, to, reason)]
    TransitionError {
        /// State transitioned from.
        from: &'static str,
        /// State attempted to transition to.
        to: &'static str,
        /// Why the transition table rejected this.
        reason: &'static str,
    },
    /// A second `handle_error` was attempted while one was already in
    /// flight for the same connection.
    #[display(fmt = "already handling an error for this connection")]
    AlreadyHandling,
    /// An auth response arrived but no [`AuthHandler`](crate::auth::AuthHandler)
    /// was configured.
    #[display(fmt = "no auth handler configured")]
    NoAuthHandler,
}

impl ErrorKind {
    /// The [`ErrorSource`] this kind is classified under per spec §7.
    #[must_use]
    pub fn source(&self) -> ErrorSource {
        use ErrorKind::{
            AlreadyHandling, AuthRejected, ConnectRefused, ControlFrameTooLarge,
            EncodeError, InvalidBinaryData, InvalidCloseCode, InvalidFrame,
            InvalidTextData, NoAuthHandler, ReplayFailed, ReservedCloseCode,
            SubscribeRejected, TimeoutAuth, TimeoutConnect, TimeoutUpgrade,
            TlsHandshakeFailed, TokenExpired, TransitionError, TransportDown,
            UnknownSubscription, UpgradeFailed,
        };
        match self {
            ConnectRefused
            | TlsHandshakeFailed
            | TransportDown
            | TimeoutConnect => ErrorSource::Transport,
            InvalidFrame
            | InvalidTextData
            | InvalidBinaryData
            | ControlFrameTooLarge
            | InvalidCloseCode
            | ReservedCloseCode
            | UpgradeFailed
            | TimeoutUpgrade => ErrorSource::Protocol,
            EncodeError | AuthRejected | TokenExpired | TimeoutAuth => {
                ErrorSource::Auth
            }
            SubscribeRejected | UnknownSubscription | ReplayFailed => {
                ErrorSource::Subscription
            }
            TransitionError { .. } | AlreadyHandling | NoAuthHandler => {
                ErrorSource::Internal
            }
        }
    }
}

/// A recorded error, carrying its classification and free-form context.
///
/// This is the `{kind, source, context}` shape every caller-visible error
/// exposes, stored on [`crate::connection::Connection`] as `last_error`.
#[derive(Clone, Debug)]
pub struct ConnectionError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Which subsystem it came from.
    pub source: ErrorSource,
    /// Free-form diagnostic context (e.g. `stream_ref`, host, attempt count).
    pub context: HashMap<String, String>,
    /// When this was recorded.
    pub occurred_at: SystemTime,
}

impl ConnectionError {
    /// Builds a [`ConnectionError`] from an [`ErrorKind`], deriving `source`
    /// automatically and stamping `occurred_at` with the current time.
    #[must_use]
    pub fn new(kind: ErrorKind, context: HashMap<String, String>) -> Self {
        let source = kind.source();
        Self { kind, source, context, occurred_at: SystemTime::now() }
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.source, self.kind)
    }
}

impl std::error::Error for ConnectionError {}
