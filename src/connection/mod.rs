//! The Connection data model and its single-task runtime.
//!
//! Per spec.md §3 ("Ownership") and §9 ("Message-passing concurrency"): the
//! [`Connection`] and everything it owns — streams, auth state, the
//! subscription registry — live behind a single `&mut self` inside one
//! runtime task (see [`runtime`]); external callers only ever reach it
//! through the asynchronous [`handle::ConnectionHandle`].

pub mod handle;
pub mod runtime;

use std::collections::HashMap;

use crate::{config::Endpoint, error::ConnectionError, state::{ConnectionState, StreamRef}};

/// Kind of a [`Stream`], per spec.md §3.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamKind {
    /// A plain HTTP request/response stream.
    Http,
    /// An upgraded WebSocket stream.
    Websocket,
}

/// A single multiplexed request/WebSocket stream over the connection.
#[derive(Clone, Debug)]
pub struct Stream {
    /// Unique identifier for this stream.
    pub stream_ref: StreamRef,
    /// Whether this is a plain HTTP stream or an upgraded WebSocket.
    pub kind: StreamKind,
    /// Headers used/returned during the upgrade, if any.
    pub upgrade_headers: Option<Vec<(String, String)>>,
}

/// The root entity: a logical session spanning reconnects, per spec.md §3.
///
/// This struct captures the pure data model; the behavior that mutates it
/// lives in [`runtime::ConnectionRuntime`], which owns one `Connection`
/// value exclusively for the task's lifetime.
#[derive(Debug)]
pub struct Connection {
    /// Current lifecycle state.
    pub status: ConnectionState,
    /// Endpoint this connection dials.
    pub endpoint: Endpoint,
    /// Consecutive failed (re)connect attempts since the last successful
    /// upgrade; reset to zero atomically on every `upgrade_ok`.
    pub reconnect_attempts: u32,
    /// Most recently recorded error, if any.
    pub last_error: Option<ConnectionError>,
    /// Streams currently open on this connection's physical transport.
    pub streams: HashMap<StreamRef, Stream>,
}

impl Connection {
    /// Builds a fresh, `initialized` [`Connection`] for `endpoint`.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            status: ConnectionState::Initialized,
            endpoint,
            reconnect_attempts: 0,
            last_error: None,
            streams: HashMap::new(),
        }
    }

    /// Invariant check (spec.md §8, invariant 1): no stream may reference a
    /// physical transport that has transitioned to `disconnected`.
    #[must_use]
    pub fn streams_consistent(&self) -> bool {
        if matches!(self.status, ConnectionState::Disconnected) {
            self.streams.is_empty()
        } else {
            true
        }
    }
}
