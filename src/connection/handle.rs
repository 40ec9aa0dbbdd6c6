//! [`ConnectionHandle`]: the external, thread-safe API to a running
//! [`super::runtime::ConnectionRuntime`].
//!
//! External callers never touch [`super::Connection`] directly — they send
//! messages on a channel, exactly as spec.md §5 requires ("External callers
//! communicate with a Connection only via asynchronous messages on its
//! effect interface"). State is observed via a `tokio::sync::watch`
//! channel, the `Send`-safe native equivalent of `medea-jason`'s
//! `medea_reactive::ObservableCell` (see `DESIGN.md`).

use tokio::sync::{mpsc, oneshot, watch};

use super::runtime::{ConnectionRuntime, RuntimeCommand};
use crate::{
    adapter::PlatformAdapter,
    auth::AuthHandler,
    codec::Frame,
    config::ConnectionConfig,
    callback::CallbackSink,
    error_policy::ErrorPolicy,
    state::ConnectionState,
    subscription::{SubscriptionHandler, SubscriptionId},
    telemetry::TelemetrySink,
    transport::Transport,
};

/// A live handle to a [`ConnectionRuntime`] running on its own `tokio` task.
///
/// Cloning a handle is cheap — it's just two channel endpoints — and every
/// clone can independently send commands and observe state.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<RuntimeCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Current lifecycle state, per spec.md §4.2.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every subsequent state transition.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Sends an application frame on the connection's current WebSocket
    /// stream. Returns immediately; delivery is asynchronous.
    pub fn send(&self, frame: Frame) -> Result<(), Frame> {
        self.commands.send(RuntimeCommand::Send(frame)).map_err(|e| match e.0 {
            RuntimeCommand::Send(frame) => frame,
            _ => unreachable!(),
        })
    }

    /// Requests a new subscription and awaits the registry's decision.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason if the subscribe request failed, or a
    /// synthetic "runtime gone" reason if the connection's task has already
    /// exited.
    pub async fn subscribe(
        &self,
        channel: impl Into<String>,
        params: serde_json::Value,
    ) -> Result<SubscriptionId, String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RuntimeCommand::Subscribe { channel: channel.into(), params, reply })
            .map_err(|_| "connection runtime has shut down".to_owned())?;
        rx.await.map_err(|_| "connection runtime has shut down".to_owned())?
    }

    /// Requests removal of a subscription and awaits the outcome.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason if the unsubscribe request failed.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RuntimeCommand::Unsubscribe { id, reply })
            .map_err(|_| "connection runtime has shut down".to_owned())?;
        rx.await.map_err(|_| "connection runtime has shut down".to_owned())?
    }

    /// Replaces the live configuration, per spec.md §9's `update_config`
    /// redesign note.
    pub fn update_config(&self, config: ConnectionConfig) {
        let _ = self.commands.send(RuntimeCommand::UpdateConfig(config));
    }

    /// Requests an explicit close, honored at the runtime's next suspension
    /// point per spec.md §5.
    pub fn close(&self) {
        let _ = self.commands.send(RuntimeCommand::Close);
    }

    /// Hands this connection's runtime off to a new controlling owner at
    /// `host`:`port`, per spec.md §6's `ownership_transfer` callback.
    pub fn transfer_ownership(&self, host: impl Into<String>, port: u16) {
        let _ = self
            .commands
            .send(RuntimeCommand::TransferOwnership { host: host.into(), port });
    }
}

/// Spawns a [`ConnectionRuntime`] on its own `tokio` task and returns a
/// handle to it.
///
/// This is the crate's top-level entry point: the host supplies a
/// [`Transport`], an [`AuthHandler`], a [`SubscriptionHandler`], a
/// [`PlatformAdapter`], and an [`ErrorPolicy`] — the "handlers as struct
/// fields" design from spec.md §9 — plus an optional [`CallbackSink`] and
/// telemetry sink.
pub fn connect<T, A, S, P, E>(
    config: ConnectionConfig,
    transport: T,
    auth: A,
    subscriptions: S,
    adapter: P,
    policy: E,
    callback_sink: Option<CallbackSink>,
    telemetry: Option<Box<dyn TelemetrySink>>,
) -> ConnectionHandle
where
    T: Transport + 'static,
    A: AuthHandler + 'static,
    S: SubscriptionHandler + 'static,
    P: PlatformAdapter + 'static,
    E: ErrorPolicy + 'static,
{
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Initialized);

    let runtime = ConnectionRuntime::new(
        config,
        transport,
        auth,
        subscriptions,
        adapter,
        policy,
        callback_sink,
        telemetry,
        state_tx,
    );
    tokio::spawn(runtime.run(commands_rx));

    ConnectionHandle { commands: commands_tx, state: state_rx }
}
