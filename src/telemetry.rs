//! Telemetry events, per spec.md §6.
//!
//! Named hierarchically with measurements and metadata, as a host would
//! forward to a metrics backend; this crate only defines the event shapes
//! and a sink trait, never a concrete backend — logging sinks and telemetry
//! backends are explicitly out of scope per spec.md §1.

use std::time::Duration;

use crate::subscription::SubscriptionId;

/// A single telemetry event, per spec.md §6's named hierarchical list.
#[derive(Clone, Debug)]
pub enum TelemetryEvent {
    /// `connection.open` — a physical connection attempt completed.
    ConnectionOpen {
        /// How long the attempt took.
        duration: Duration,
    },
    /// `connection.close` — the connection was torn down.
    ConnectionClose {
        /// How long the session had been up.
        duration: Duration,
    },
    /// `connection.websocket_upgrade` — the upgrade handshake completed.
    ConnectionWebsocketUpgrade {
        /// How long the handshake took.
        duration: Duration,
    },
    /// `message.sent` — an outbound frame was sent.
    MessageSent {
        /// Payload size in bytes.
        size: usize,
        /// Frame kind, e.g. `"text"`.
        frame_type: &'static str,
    },
    /// `message.received` — an inbound frame arrived.
    MessageReceived {
        /// Payload size in bytes.
        size: usize,
        /// Time since the frame was sent, if known.
        latency: Option<Duration>,
        /// Frame kind, e.g. `"binary"`.
        frame_type: &'static str,
    },
    /// `error.occurred` — any recorded error.
    ErrorOccurred {
        /// Human-readable reason.
        reason: String,
        /// Free-form context.
        context: std::collections::HashMap<String, String>,
    },
    /// `subscription.restored` — a post-reconnect replay entry succeeded.
    SubscriptionRestored {
        /// How long the resubscribe took.
        duration: Duration,
        /// The (possibly new) subscription id.
        subscription_id: SubscriptionId,
        /// Channel name.
        channel: String,
    },
    /// `subscription.restoration_failed` — a replay entry failed.
    SubscriptionRestorationFailed {
        /// How long the attempt took before failing.
        duration: Duration,
        /// Channel name.
        channel: String,
        /// Rejection reason, if known.
        reason: Option<String>,
    },
    /// `connection.ownership_transfer.received` — this connection's runtime
    /// handle was received from another owner.
    OwnershipTransferReceived {
        /// Number of live streams transferred.
        stream_count: usize,
    },
}

/// Sink telemetry events are recorded to. Hosts plug in their own backend
/// (Prometheus, StatsD, a log line); the core ships no default
/// implementation.
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait TelemetrySink: Send {
    /// Records a single event.
    fn record(&self, event: TelemetryEvent);
}

/// A [`TelemetrySink`] that discards every event, for hosts that don't need
/// telemetry.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn record(&self, _event: TelemetryEvent) {}
}
