//! Subscription registry: tracks per-channel subscriptions across
//! reconnects and guarantees resubscription semantics.
//!
//! `medea-jason` is a WebRTC signalling client and has no
//! channel-subscription concept of its own, so this module is grounded
//! instead on the subscription-registry shape found across the retrieval
//! pack's native WebSocket clients — `alphasec-rust-sdk`'s
//! `WsManager::subscriptions` map plus its resubscribe-on-reconnect
//! handling, and `ethers-providers`'s `ws/manager.rs` bookkeeping — built in
//! the teacher's idiom (explicit struct + enum status, `derive_more::Display`
//! errors, `log::debug!` telemetry) rather than copied verbatim.

use std::collections::HashMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Opaque subscription identifier, server-assigned or locally minted.
pub type SubscriptionId = u64;

/// Lifecycle status of a [`Subscription`], per spec.md §3.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum SubscriptionStatus {
    /// Requested, awaiting server confirmation.
    #[display(fmt = "pending")]
    Pending,
    /// Server confirmed the subscription is active.
    #[display(fmt = "confirmed")]
    Confirmed,
    /// Server rejected the subscription.
    #[display(fmt = "failed")]
    Failed,
}

/// A single tracked subscription.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Subscription {
    /// Identifier for this subscription.
    pub id: SubscriptionId,
    /// Channel name.
    pub channel: String,
    /// Opaque configuration bag.
    pub params: serde_json::Value,
    /// Current status.
    pub status: SubscriptionStatus,
}

/// A server response advancing a subscription's status.
#[derive(Clone, Debug)]
pub struct SubscriptionResponse {
    /// Which subscription this response is about.
    pub id: SubscriptionId,
    /// `Ok` confirms it; `Err` carries the rejection reason.
    pub outcome: Result<(), String>,
}

/// External collaborator performing the actual subscribe/unsubscribe wire
/// exchange, per spec.md §6's "Subscription handler interface".
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait SubscriptionHandler: Send {
    /// Sends a subscribe request for `channel`, returning the assigned id.
    ///
    /// # Errors
    ///
    /// Returns a rejection reason if the request could not be sent.
    fn subscribe(&mut self, channel: &str, params: &serde_json::Value) -> Result<SubscriptionId, String>;

    /// Sends an unsubscribe request for `id`.
    ///
    /// # Errors
    ///
    /// Returns a rejection reason if the request could not be sent.
    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), String>;

    /// Interprets a subscription-related inbound message.
    ///
    /// # Errors
    ///
    /// Returns an error if `response` could not be applied.
    fn handle_subscription_response(&mut self, response: &SubscriptionResponse) -> Result<(), String>;

    /// All currently tracked subscription ids.
    fn active_subscriptions(&self) -> Vec<SubscriptionId>;

    /// Looks up a subscription id by channel name, if tracked.
    fn find_subscription_by_channel(&self, channel: &str) -> Option<SubscriptionId>;
}

fn fingerprint(params: &serde_json::Value) -> String {
    params.to_string()
}

/// Wraps a [`SubscriptionHandler`] with reconnect-survival bookkeeping, per
/// spec.md §4.5.
pub struct SubscriptionRegistry<H: SubscriptionHandler> {
    handler: H,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    pending_reconnect: Vec<(String, serde_json::Value)>,
    next_local_id: SubscriptionId,
}

/// Serializable export of registry state, per spec.md §6's "Persisted state
/// shape".
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ExportedState {
    /// All tracked subscriptions, keyed by id.
    pub subscriptions: HashMap<SubscriptionId, Subscription>,
    /// `(channel, params)` pairs awaiting replay.
    pub pending_reconnect_subscriptions: Vec<(String, serde_json::Value)>,
}

/// Outcome of a single replay attempt, for [`SubscriptionRegistry::replay_after_reconnect`].
#[derive(Clone, Debug)]
pub enum ReplayOutcome {
    /// Resubscribed under a (possibly new) id.
    Restored(SubscriptionId),
    /// The resubscribe attempt failed.
    Failed(String),
}

impl<H: SubscriptionHandler> SubscriptionRegistry<H> {
    /// Builds an empty registry around the given handler.
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            subscriptions: HashMap::new(),
            pending_reconnect: Vec::new(),
            next_local_id: 1,
        }
    }

    /// Allocates a `pending` subscription for `channel`.
    ///
    /// # Errors
    ///
    /// Returns the handler's rejection reason if the subscribe request
    /// could not be sent, or if a `confirmed` subscription already exists
    /// for this `(channel, params)` pair per spec.md §3's uniqueness
    /// invariant.
    pub fn subscribe(
        &mut self,
        channel: &str,
        params: serde_json::Value,
    ) -> Result<SubscriptionId, String> {
        if self.has_confirmed(channel, &params) {
            return Err(format!("already subscribed to {channel}"));
        }
        let id = self.handler.subscribe(channel, &params)?;
        self.subscriptions.insert(
            id,
            Subscription { id, channel: channel.to_owned(), params, status: SubscriptionStatus::Pending },
        );
        self.next_local_id = self.next_local_id.max(id.saturating_add(1));
        Ok(id)
    }

    /// Removes a subscription.
    ///
    /// # Errors
    ///
    /// Returns the handler's rejection reason if the unsubscribe request
    /// could not be sent.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), String> {
        self.handler.unsubscribe(id)?;
        self.subscriptions.remove(&id);
        Ok(())
    }

    /// Advances a subscription from `pending` to `confirmed` or `failed`.
    ///
    /// # Errors
    ///
    /// Returns an error if `response.id` is not tracked.
    pub fn handle_response(&mut self, response: &SubscriptionResponse) -> Result<(), String> {
        let sub = self
            .subscriptions
            .get_mut(&response.id)
            .ok_or_else(|| format!("unknown subscription {}", response.id))?;
        sub.status = match &response.outcome {
            Ok(()) => SubscriptionStatus::Confirmed,
            Err(_) => SubscriptionStatus::Failed,
        };
        self.handler.handle_subscription_response(response)
    }

    /// Serializes the current confirmed-plus-pending channels into the
    /// pending-reconnect list. Called by the runtime on every
    /// `disconnected` transition.
    pub fn snapshot_for_reconnect(&mut self) {
        self.pending_reconnect = self
            .subscriptions
            .values()
            .filter(|s| matches!(s.status, SubscriptionStatus::Confirmed | SubscriptionStatus::Pending))
            .map(|s| (s.channel.clone(), s.params.clone()))
            .collect();
        for sub in self.subscriptions.values_mut() {
            sub.status = SubscriptionStatus::Pending;
        }
    }

    /// Iterates the pending-reconnect list after `websocket_connected`,
    /// resubscribing each in original order. The list is cleared exactly
    /// once at the start, regardless of per-entry outcome, per spec.md
    /// §4.5.
    pub fn replay_after_reconnect(&mut self) -> Vec<ReplayOutcome> {
        let entries = std::mem::take(&mut self.pending_reconnect);
        let mut results = Vec::with_capacity(entries.len());
        for (channel, params) in entries {
            let start = std::time::Instant::now();
            match self.subscribe(&channel, params) {
                Ok(id) => {
                    log::debug!(
                        "subscription restored: channel={channel} id={id} duration={:?}",
                        start.elapsed()
                    );
                    results.push(ReplayOutcome::Restored(id));
                }
                Err(reason) => {
                    log::debug!(
                        "subscription restoration failed: channel={channel} reason={reason} duration={:?}",
                        start.elapsed()
                    );
                    results.push(ReplayOutcome::Failed(reason));
                }
            }
        }
        results
    }

    /// Exports the current registry state as a value type.
    #[must_use]
    pub fn export_state(&self) -> ExportedState {
        ExportedState {
            subscriptions: self.subscriptions.clone(),
            pending_reconnect_subscriptions: self.pending_reconnect.clone(),
        }
    }

    /// Restores registry state from a prior [`Self::export_state`] call.
    pub fn import_state(&mut self, bag: ExportedState) {
        self.next_local_id = bag
            .subscriptions
            .keys()
            .copied()
            .max()
            .map_or(1, |max| max.saturating_add(1));
        self.subscriptions = bag.subscriptions;
        self.pending_reconnect = bag.pending_reconnect_subscriptions;
    }

    /// Whether a `confirmed` subscription already exists for this
    /// `(channel, params)` pair, per spec.md §3's uniqueness invariant.
    #[must_use]
    pub fn has_confirmed(&self, channel: &str, params: &serde_json::Value) -> bool {
        let target_fp = fingerprint(params);
        self.subscriptions.values().any(|s| {
            s.channel == channel
                && fingerprint(&s.params) == target_fp
                && s.status == SubscriptionStatus::Confirmed
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        ReplayOutcome, SubscriptionHandler, SubscriptionRegistry, SubscriptionResponse,
        SubscriptionStatus,
    };

    #[derive(Default)]
    struct StubHandler {
        next_id: u64,
        reject_channel: Option<&'static str>,
    }

    impl SubscriptionHandler for StubHandler {
        fn subscribe(
            &mut self,
            channel: &str,
            _params: &serde_json::Value,
        ) -> Result<u64, String> {
            if self.reject_channel == Some(channel) {
                return Err("rejected".into());
            }
            self.next_id += 1;
            Ok(self.next_id)
        }

        fn unsubscribe(&mut self, _id: u64) -> Result<(), String> {
            Ok(())
        }

        fn handle_subscription_response(
            &mut self,
            _response: &SubscriptionResponse,
        ) -> Result<(), String> {
            Ok(())
        }

        fn active_subscriptions(&self) -> Vec<u64> {
            Vec::new()
        }

        fn find_subscription_by_channel(&self, _channel: &str) -> Option<u64> {
            None
        }
    }

    #[test]
    fn subscribe_then_confirm() {
        let mut reg = SubscriptionRegistry::new(StubHandler::default());
        let id = reg.subscribe("btc.trades", json!({})).unwrap();
        reg.handle_response(&SubscriptionResponse { id, outcome: Ok(()) }).unwrap();
        assert!(reg.has_confirmed("btc.trades", &json!({})));
    }

    #[test]
    fn subscribe_rejects_duplicate_confirmed_channel() {
        let mut reg = SubscriptionRegistry::new(StubHandler::default());
        let id = reg.subscribe("btc.trades", json!({})).unwrap();
        reg.handle_response(&SubscriptionResponse { id, outcome: Ok(()) }).unwrap();
        reg.subscribe("btc.trades", json!({})).unwrap_err();
    }

    #[test]
    fn replay_preserves_order_and_clears_pending_list() {
        let mut reg = SubscriptionRegistry::new(StubHandler::default());
        let a = reg.subscribe("btc.trades", json!({})).unwrap();
        let b = reg.subscribe("eth.book", json!({})).unwrap();
        reg.handle_response(&SubscriptionResponse { id: a, outcome: Ok(()) }).unwrap();
        reg.handle_response(&SubscriptionResponse { id: b, outcome: Ok(()) }).unwrap();

        reg.snapshot_for_reconnect();
        let results = reg.replay_after_reconnect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], ReplayOutcome::Restored(_)));
        assert!(matches!(results[1], ReplayOutcome::Restored(_)));
        assert!(reg.export_state().pending_reconnect_subscriptions.is_empty());
    }

    #[test]
    fn disconnect_snapshot_resets_confirmed_to_pending() {
        let mut reg = SubscriptionRegistry::new(StubHandler::default());
        let id = reg.subscribe("btc.trades", json!({})).unwrap();
        reg.handle_response(&SubscriptionResponse { id, outcome: Ok(()) }).unwrap();
        reg.snapshot_for_reconnect();
        let exported = reg.export_state();
        assert_eq!(exported.subscriptions[&id].status, SubscriptionStatus::Pending);
        assert_eq!(exported.pending_reconnect_subscriptions.len(), 1);
    }

    #[test]
    fn replay_reports_per_entry_failure_without_aborting() {
        let mut reg =
            SubscriptionRegistry::new(StubHandler { next_id: 0, reject_channel: Some("eth.book") });
        let a = reg.subscribe("btc.trades", json!({})).unwrap();
        reg.handle_response(&SubscriptionResponse { id: a, outcome: Ok(()) }).unwrap();
        reg.subscribe("eth.book", json!({})).unwrap_err();
        reg.import_state(super::ExportedState {
            subscriptions: reg.export_state().subscriptions,
            pending_reconnect_subscriptions: vec![
                ("btc.trades".to_owned(), json!({})),
                ("eth.book".to_owned(), json!({})),
            ],
        });
        let results = reg.replay_after_reconnect();
        assert!(matches!(results[0], ReplayOutcome::Restored(_)));
        assert!(matches!(results[1], ReplayOutcome::Failed(_)));
    }

    #[test]
    fn export_import_roundtrip() {
        let mut reg = SubscriptionRegistry::new(StubHandler::default());
        reg.subscribe("btc.trades", json!({})).unwrap();
        let bag = reg.export_state();

        let mut other = SubscriptionRegistry::new(StubHandler::default());
        other.import_state(bag.clone());
        assert_eq!(other.export_state().subscriptions.len(), bag.subscriptions.len());
    }
}
