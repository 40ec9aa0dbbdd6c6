//! The callback sink: the outbound event channel to application code, per
//! spec.md §6's "Callback sink" interface.
//!
//! `CallbackEvent` is declared with `#[dispatchable]`, exactly as
//! `medea-jason`'s `RpcEvent` is in `rpc/websocket/client.rs` — the
//! `medea-macro` attribute generates a `CallbackEventHandler` trait with one
//! `on_*` method per variant plus a `dispatch_with` method on the enum
//! itself, so a host can either drain the channel directly or implement
//! [`CallbackEventHandler`] and let events dispatch themselves.

use medea_macro::dispatchable;

use crate::{codec::Frame, state::StreamRef};

/// Events the connection runtime emits outward, per spec.md §6.
#[dispatchable]
#[derive(Clone, Debug)]
pub enum CallbackEvent {
    /// The physical transport came up.
    ConnectionUp {
        /// Negotiated protocol.
        protocol: String,
    },
    /// The physical transport went down.
    ConnectionDown {
        /// Human-readable reason.
        reason: String,
    },
    /// The HTTP → WebSocket upgrade completed.
    WebsocketUpgrade {
        /// Resulting stream.
        stream_ref: StreamRef,
        /// Response headers.
        headers: Vec<(String, String)>,
    },
    /// A WebSocket frame arrived.
    WebsocketFrame {
        /// Which stream it arrived on.
        stream_ref: StreamRef,
        /// The frame.
        frame: Frame,
    },
    /// An HTTP response arrived on a non-WebSocket stream.
    HttpResponse {
        /// Which stream.
        stream_ref: StreamRef,
        /// Whether this is the final part.
        is_fin: bool,
        /// HTTP status.
        status: u16,
        /// Response headers.
        headers: Vec<(String, String)>,
    },
    /// An HTTP body chunk arrived.
    HttpData {
        /// Which stream.
        stream_ref: StreamRef,
        /// Whether this is the final chunk.
        is_fin: bool,
        /// Chunk bytes.
        data: Vec<u8>,
    },
    /// A scoped or unscoped error occurred.
    Error {
        /// The affected stream, if any.
        stream_ref: Option<StreamRef>,
        /// Human-readable reason.
        reason: String,
    },
    /// The connection itself failed (distinct from a stream-scoped error).
    ConnectionError {
        /// Human-readable reason.
        reason: String,
    },
    /// The WebSocket upgrade failed.
    WebsocketUpgradeError {
        /// Stream that was attempting to upgrade.
        stream_ref: StreamRef,
        /// Human-readable reason.
        reason: String,
    },
    /// An illegal state transition was attempted.
    TransitionError {
        /// State transitioned from.
        from: &'static str,
        /// State attempted to transition to.
        to: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// This connection's runtime handle was handed off to another owner.
    OwnershipTransfer {
        /// New owner's host.
        host: String,
        /// New owner's port.
        port: u16,
        /// Number of live streams at the moment of handoff.
        stream_count: usize,
    },
}

/// Write-only sink a [`crate::connection::Connection`] pushes
/// [`CallbackEvent`]s onto. Optional per spec.md §3: a Connection with no
/// sink simply drops its events.
pub type CallbackSink = tokio::sync::mpsc::UnboundedSender<CallbackEvent>;
