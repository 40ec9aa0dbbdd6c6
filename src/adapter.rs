//! The Adapter interface (produced), per spec.md §6.
//!
//! A platform adapter is what turns this crate's generic frame/event
//! plumbing into a concrete exchange or service's message schema; the core
//! only defines the interface surface, exactly as spec.md §1 scopes it.

use crate::codec::Frame;

/// Result of [`PlatformAdapter::handle_platform_message`].
#[derive(Debug)]
pub enum AdapterOutcome {
    /// Handled; dispatch `Frame` back out over the transport.
    Reply(Frame),
    /// Handled, nothing to send back.
    Ok,
    /// Could not be handled.
    Error(String),
}

/// External collaborator translating between application-level messages
/// and wire [`Frame`]s, per spec.md §6's "Adapter interface (produced)".
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait PlatformAdapter: Send {
    /// Interprets an inbound message that isn't auth or subscription
    /// traffic (those are routed to [`crate::auth::AuthHandler`] and
    /// [`crate::subscription::SubscriptionHandler`] first).
    fn handle_platform_message(&mut self, message: &Frame) -> AdapterOutcome;

    /// Encodes an auth request frame from opaque credentials.
    fn encode_auth_request(&self, credentials: &[u8]) -> Frame;
}
