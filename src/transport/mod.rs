//! The Transport interface (consumed), per spec.md §6.
//!
//! Grounded on `medea-jason`'s `RpcTransport` trait (`platform/transport.rs`)
//! and its one concrete implementation, `WebSocketRpcTransport`
//! (`platform/wasm/transport.rs`): an abstract trait lives in the core, one
//! real adapter ([`tungstenite::TungsteniteTransport`]) ships alongside it,
//! and hosts may supply more. Unlike the teacher's wasm-bound
//! `web_sys::WebSocket` wrapper returning `LocalBoxStream`s, ours is
//! `Send` and pulls events through an `async fn next_event`, since this
//! crate's connection runtime lives on a `tokio` task rather than a
//! single-threaded wasm event loop.

pub mod tungstenite;

use async_trait::async_trait;
use derive_more::Display;

use crate::{codec::Frame, state::StreamRef};

/// Opaque handle to a physical transport connection. Only meaningful to the
/// [`Transport`] implementation that issued it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransportHandle(pub u64);

/// Options passed to [`Transport::open`].
#[derive(Clone, Debug, Default)]
pub struct TransportOptions {
    /// Extra headers to send with the HTTP upgrade request.
    pub headers: Vec<(String, String)>,
}

/// [`Transport`]'s readiness state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportState {
    /// Socket created, connection not open yet.
    Connecting,
    /// Connection is open and ready to communicate.
    Open,
    /// Connection is in the process of closing.
    Closing,
    /// Connection is closed or could not be opened.
    Closed,
}

/// Events a [`Transport`] implementation's event stream delivers, per
/// spec.md §6.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// The TCP/TLS transport is up.
    TransportUp {
        /// Negotiated protocol, e.g. `"http/1.1"`.
        protocol: String,
    },
    /// The physical transport went away.
    TransportDown {
        /// Protocol that was active.
        protocol: String,
        /// Human-readable reason.
        reason: String,
        /// Streams that were live and are now gone.
        killed_streams: Vec<StreamRef>,
        /// Streams whose final response/frame was never delivered.
        unprocessed_streams: Vec<StreamRef>,
    },
    /// The HTTP → WebSocket upgrade completed.
    UpgradeOk {
        /// Resulting stream identifier.
        stream_ref: StreamRef,
        /// Response headers from the handshake.
        headers: Vec<(String, String)>,
    },
    /// A WebSocket frame arrived on `stream_ref`.
    Frame {
        /// Which stream the frame belongs to.
        stream_ref: StreamRef,
        /// The frame itself.
        frame: Frame,
    },
    /// A plain HTTP response arrived (non-WebSocket stream).
    HttpResponse {
        /// Which stream this belongs to.
        stream_ref: StreamRef,
        /// Whether this is the final part of the response.
        is_fin: bool,
        /// HTTP status code.
        status: u16,
        /// Response headers.
        headers: Vec<(String, String)>,
    },
    /// A plain HTTP body chunk arrived.
    HttpData {
        /// Which stream this belongs to.
        stream_ref: StreamRef,
        /// Whether this is the final chunk.
        is_fin: bool,
        /// Chunk bytes.
        data: Vec<u8>,
    },
    /// An error occurred, optionally scoped to one stream.
    Error {
        /// The affected stream, if any.
        stream_ref: Option<StreamRef>,
        /// Human-readable reason.
        reason: String,
    },
}

/// Errors a [`Transport`] implementation may report.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum TransportError {
    /// The underlying dial failed.
    #[display(fmt = "failed to open transport: {}", _0)]
    OpenFailed(String),
    /// The HTTP → WebSocket upgrade failed.
    #[display(fmt = "failed to upgrade: {}", _0)]
    UpgradeFailed(String),
    /// A send was attempted on a closed transport.
    #[display(fmt = "transport is closed")]
    Closed,
    /// A send failed for a reason other than being closed.
    #[display(fmt = "failed to send frame: {}", _0)]
    SendFailed(String),
}

/// Transport interface the connection runtime consumes, per spec.md §6.
#[cfg_attr(feature = "mockable", mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Opens a physical connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::OpenFailed`] if the dial fails.
    async fn open(
        &mut self,
        endpoint: &crate::config::Endpoint,
        options: &TransportOptions,
    ) -> Result<TransportHandle, TransportError>;

    /// Performs the HTTP → WebSocket upgrade on an already-open handle.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UpgradeFailed`] if the handshake fails.
    async fn upgrade(
        &mut self,
        handle: TransportHandle,
        path: &str,
        headers: &[(String, String)],
    ) -> Result<StreamRef, TransportError>;

    /// Sends a frame on `stream_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] or [`TransportError::SendFailed`].
    async fn send(
        &mut self,
        handle: TransportHandle,
        stream_ref: StreamRef,
        frame: Frame,
    ) -> Result<(), TransportError>;

    /// Closes the transport.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the close handshake could not be
    /// sent; the handle is considered closed either way.
    async fn close(&mut self, handle: TransportHandle) -> Result<(), TransportError>;

    /// Awaits the next event from this transport's event stream, or `None`
    /// once the transport is permanently closed and drained.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Current readiness state.
    fn state(&self) -> TransportState;
}
