//! The connection state machine: a pure transition function over
//! [`ConnectionState`] driven by [`Event`].
//!
//! Grounded on the `ClientState`/`SessionState` enums and the state-driven
//! dispatch spread across `spawn_state_watcher`/`inner_connect` in
//! `medea-jason`'s `rpc_session.rs` and `rpc/websocket/client.rs`, but
//! collapsed into one explicit, table-driven `apply` function: our
//! single-task runtime (spec.md §5) doesn't need the teacher's multi-task
//! `Rc<RefCell<_>>` choreography to keep the table consistent.

use derive_more::Display;

use crate::error::ErrorKind;

/// Opaque identifier for a [`crate::connection::Stream`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StreamRef(pub u64);

/// States in the connection lifecycle, per spec.md §4.2.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ConnectionState {
    /// Freshly constructed, nothing dialed yet.
    #[display(fmt = "initialized")]
    Initialized,
    /// TCP/TLS dial in flight.
    #[display(fmt = "connecting")]
    Connecting,
    /// TCP/TLS established, HTTP upgrade not yet complete.
    #[display(fmt = "connected")]
    Connected,
    /// HTTP → WebSocket upgrade complete; application traffic may flow.
    #[display(fmt = "websocket_connected")]
    WebsocketConnected,
    /// Physical transport lost; awaiting a retry decision.
    #[display(fmt = "disconnected")]
    Disconnected,
    /// A connect attempt failed outright; awaiting a retry decision.
    #[display(fmt = "error")]
    Error,
    /// Retry decision was `true`; a new dial is about to begin.
    #[display(fmt = "reconnecting")]
    Reconnecting,
    /// Terminal: no further activity will occur.
    #[display(fmt = "closed")]
    Closed,
}

impl ConnectionState {
    /// Stable, `'static` name used in transition-error reporting.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::WebsocketConnected => "websocket_connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

/// Transport/runtime events fed into [`apply`].
#[derive(Clone, Debug)]
pub enum Event {
    /// Begin a dial attempt.
    Open,
    /// The TCP/TLS transport is up.
    TransportUp {
        /// Negotiated protocol, e.g. `"http/1.1"`.
        protocol: String,
    },
    /// The dial attempt failed.
    TransportError {
        /// Human-readable failure reason.
        reason: String,
    },
    /// The HTTP → WebSocket upgrade completed.
    UpgradeOk {
        /// Identifier of the resulting WebSocket stream.
        stream_ref: StreamRef,
        /// Response headers from the upgrade handshake.
        headers: Vec<(String, String)>,
    },
    /// The physical transport went away while connected.
    TransportDown {
        /// Human-readable reason.
        reason: String,
        /// Streams that were live on the disposed transport.
        killed_streams: Vec<StreamRef>,
    },
    /// The peer sent a WebSocket close frame.
    PeerClose {
        /// Close code, if present.
        code: Option<u16>,
    },
    /// The error policy engine's retry decision.
    RetryDecision(bool),
    /// An explicit close was requested by the host.
    ExplicitClose,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::TransportUp { .. } => "transport_up",
            Self::TransportError { .. } => "transport_error",
            Self::UpgradeOk { .. } => "upgrade_ok",
            Self::TransportDown { .. } => "transport_down",
            Self::PeerClose { .. } => "peer_close",
            Self::RetryDecision(_) => "retry_decision",
            Self::ExplicitClose => "explicit_close",
        }
    }
}

/// Applies `event` to `from`, returning the resulting state or a
/// [`ErrorKind::TransitionError`] if the table in spec.md §4.2 has no entry
/// for this `(from, event)` pair.
///
/// This function performs no I/O and mutates nothing; the caller
/// (`crate::connection::runtime`) is responsible for acting on the
/// resulting state (e.g. resetting `reconnect_attempts`, snapshotting
/// subscriptions).
///
/// # Errors
///
/// Returns `Err` for any `(from, event)` pair outside the transition table;
/// `from` is left unchanged by the caller in that case.
pub fn apply(from: ConnectionState, event: &Event) -> Result<ConnectionState, ErrorKind> {
    use ConnectionState::{
        Closed, Connected, Connecting, Disconnected, Error, Initialized, Reconnecting,
        WebsocketConnected,
    };

    let to = match (from, event) {
        (Initialized, Event::Open) => Connecting,
        (Connecting, Event::TransportUp { .. }) => Connected,
        (Connecting, Event::TransportError { .. }) => Error,
        (Connected, Event::UpgradeOk { .. }) => WebsocketConnected,
        (Connected, Event::TransportDown { .. }) => Disconnected,
        (WebsocketConnected, Event::TransportDown { .. }) => Disconnected,
        (WebsocketConnected, Event::PeerClose { .. }) => Disconnected,
        (Disconnected, Event::RetryDecision(true)) => Reconnecting,
        (Disconnected, Event::RetryDecision(false)) => Closed,
        (Error, Event::RetryDecision(true)) => Reconnecting,
        (Error, Event::RetryDecision(false)) => Closed,
        (Reconnecting, Event::Open) => Connecting,
        (_, Event::ExplicitClose) => Closed,
        (invalid_from, event) => {
            return Err(ErrorKind::TransitionError {
                from: invalid_from.name(),
                to: "<none>",
                reason: event.name(),
            })
        }
    };
    Ok(to)
}

#[cfg(test)]
mod tests {
    use super::{apply, ConnectionState, Event};

    #[test]
    fn happy_path_through_all_states() {
        let mut state = ConnectionState::Initialized;
        state = apply(state, &Event::Open).unwrap();
        assert_eq!(state, ConnectionState::Connecting);
        state = apply(state, &Event::TransportUp { protocol: "http/1.1".into() }).unwrap();
        assert_eq!(state, ConnectionState::Connected);
        state = apply(
            state,
            &Event::UpgradeOk { stream_ref: super::StreamRef(1), headers: vec![] },
        )
        .unwrap();
        assert_eq!(state, ConnectionState::WebsocketConnected);
        state = apply(state, &Event::PeerClose { code: Some(1000) }).unwrap();
        assert_eq!(state, ConnectionState::Disconnected);
    }

    #[test]
    fn illegal_transition_is_rejected_and_reported() {
        let err = apply(ConnectionState::Initialized, &Event::PeerClose { code: None })
            .unwrap_err();
        match err {
            crate::error::ErrorKind::TransitionError { from, reason, .. } => {
                assert_eq!(from, "initialized");
                assert_eq!(reason, "peer_close");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn explicit_close_wins_from_any_state() {
        for state in [
            ConnectionState::Initialized,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::WebsocketConnected,
            ConnectionState::Disconnected,
            ConnectionState::Error,
            ConnectionState::Reconnecting,
        ] {
            assert_eq!(apply(state, &Event::ExplicitClose).unwrap(), ConnectionState::Closed);
        }
    }

    #[test]
    fn retry_decision_branches_from_disconnected_and_error() {
        assert_eq!(
            apply(ConnectionState::Disconnected, &Event::RetryDecision(true)).unwrap(),
            ConnectionState::Reconnecting
        );
        assert_eq!(
            apply(ConnectionState::Disconnected, &Event::RetryDecision(false)).unwrap(),
            ConnectionState::Closed
        );
        assert_eq!(
            apply(ConnectionState::Error, &Event::RetryDecision(true)).unwrap(),
            ConnectionState::Reconnecting
        );
    }

    #[test]
    fn reconnecting_reopens_into_connecting() {
        assert_eq!(
            apply(ConnectionState::Reconnecting, &Event::Open).unwrap(),
            ConnectionState::Connecting
        );
    }
}
