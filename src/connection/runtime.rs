//! The connection runtime task: the integration layer wiring transport
//! events → state machine → policy engine → auth/subscription overlays, per
//! spec.md §2's "Integration layer" and §9's single-owner discipline.
//!
//! Grounded on the `inner_connect`/`establish_connection` sequence and the
//! `spawn_state_watcher`/`spawn_connection_loss_watcher` background tasks in
//! `medea-jason`'s `rpc_session.rs` and `rpc/websocket/client.rs`, collapsed
//! from several cooperating `Rc<RefCell<_>>`-guarded tasks into one
//! `tokio::select!` loop over a single owned [`super::Connection`], per
//! spec.md §5's "single task/mailbox" requirement.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot, watch};

use super::Connection;
use crate::{
    adapter::PlatformAdapter,
    auth::{AuthFlow, AuthHandler},
    callback::{CallbackEvent, CallbackSink},
    codec::Frame,
    config::ConnectionConfig,
    error::{ConnectionError, ErrorKind},
    error_policy::{ErrorPolicy, ErrorPolicyEngine, HandleOutcome},
    state::{self, ConnectionState, Event, StreamRef},
    subscription::{SubscriptionHandler, SubscriptionId, SubscriptionRegistry},
    telemetry::{TelemetryEvent, TelemetrySink},
    transport::{Transport, TransportEvent, TransportHandle, TransportOptions},
};

/// Messages external callers send to a running [`ConnectionRuntime`] via
/// [`super::handle::ConnectionHandle`].
pub enum RuntimeCommand {
    /// Send an application frame on the current WebSocket stream.
    Send(Frame),
    /// Subscribe to a channel.
    Subscribe {
        /// Channel name.
        channel: String,
        /// Opaque configuration bag.
        params: serde_json::Value,
        /// Resolved with the outcome.
        reply: oneshot::Sender<Result<SubscriptionId, String>>,
    },
    /// Unsubscribe from a channel.
    Unsubscribe {
        /// Subscription id to remove.
        id: SubscriptionId,
        /// Resolved with the outcome.
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Replace the live configuration, per spec.md §9's redesign note on
    /// `Application.get_env`.
    UpdateConfig(ConnectionConfig),
    /// Hand this connection's runtime off to a new controlling owner at
    /// `host`:`port`, per spec.md §6's `ownership_transfer` callback.
    TransferOwnership {
        /// New owner's host.
        host: String,
        /// New owner's port.
        port: u16,
    },
    /// Close the connection. Honored at the next suspension point.
    Close,
}

/// Size and kind of a [`Frame`]'s payload, for telemetry.
fn frame_telemetry(frame: &Frame) -> (usize, &'static str) {
    match frame {
        Frame::Text(bytes) => (bytes.len(), "text"),
        Frame::Binary(bytes) => (bytes.len(), "binary"),
        Frame::Ping(bytes) => (bytes.len(), "ping"),
        Frame::Pong(bytes) => (bytes.len(), "pong"),
        Frame::Close(_) => (0, "close"),
    }
}

/// Owns the [`Connection`] data model plus every pluggable handler, and
/// drives them all from a single task, per spec.md §5.
pub struct ConnectionRuntime<T, A, S, P, E>
where
    T: Transport,
    A: AuthHandler,
    S: SubscriptionHandler,
    P: PlatformAdapter,
    E: ErrorPolicy,
{
    connection: Connection,
    config: ConnectionConfig,
    transport: T,
    transport_handle: Option<TransportHandle>,
    auth: AuthFlow<A>,
    subscriptions: SubscriptionRegistry<S>,
    adapter: P,
    policy: ErrorPolicyEngine<E>,
    callback_sink: Option<CallbackSink>,
    telemetry: Option<Box<dyn TelemetrySink>>,
    state_tx: watch::Sender<ConnectionState>,
    reconnect_at: Option<Instant>,
    reauth_delay: crate::utils::ResettableDelay,
    connect_started_at: Option<Instant>,
    upgrade_started_at: Option<Instant>,
    session_started_at: Option<Instant>,
    auth_deadline: Option<Instant>,
}

impl<T, A, S, P, E> ConnectionRuntime<T, A, S, P, E>
where
    T: Transport,
    A: AuthHandler,
    S: SubscriptionHandler,
    P: PlatformAdapter,
    E: ErrorPolicy,
{
    /// Builds a runtime ready to be driven by [`Self::run`].
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        transport: T,
        auth: A,
        subscriptions: S,
        adapter: P,
        policy: E,
        callback_sink: Option<CallbackSink>,
        telemetry: Option<Box<dyn TelemetrySink>>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let reauth_poll = config.timeouts.reauth_poll;
        Self {
            connection: Connection::new(config.endpoint.clone()),
            transport,
            transport_handle: None,
            auth: AuthFlow::new(auth),
            subscriptions: SubscriptionRegistry::new(subscriptions),
            adapter,
            policy: ErrorPolicyEngine::new(policy),
            callback_sink,
            telemetry,
            state_tx,
            reconnect_at: None,
            reauth_delay: crate::utils::ResettableDelay::new(reauth_poll, false),
            connect_started_at: None,
            upgrade_started_at: None,
            session_started_at: None,
            auth_deadline: None,
            config,
        }
    }

    fn emit(&self, event: CallbackEvent) {
        if let Some(sink) = &self.callback_sink {
            let _ = sink.send(event);
        }
    }

    fn record(&self, event: TelemetryEvent) {
        if let Some(sink) = &self.telemetry {
            sink.record(event);
        }
    }

    fn transition(&mut self, event: &Event) -> Result<(), ErrorKind> {
        let from = self.connection.status;
        match state::apply(from, event) {
            Ok(to) => {
                self.connection.status = to;
                let _ = self.state_tx.send(to);
                Ok(())
            }
            Err(err) => {
                if let ErrorKind::TransitionError { from, to, reason } = &err {
                    self.emit(CallbackEvent::TransitionError {
                        from: *from,
                        to: *to,
                        reason: *reason,
                    });
                }
                Err(err)
            }
        }
    }

    async fn dial(&mut self) {
        if self.transition(&Event::Open).is_err() {
            return;
        }
        self.connect_started_at = Some(Instant::now());
        let options = TransportOptions::default();
        let deadline = self.config.timeouts.connect;
        match tokio::time::timeout(deadline, self.transport.open(&self.connection.endpoint, &options)).await {
            Ok(Ok(handle)) => self.transport_handle = Some(handle),
            Ok(Err(e)) => {
                let error = ConnectionError::new(ErrorKind::ConnectRefused, Default::default());
                self.connection.last_error = Some(error.clone());
                let _ = self.transition(&Event::TransportError { reason: e.to_string() });
                self.handle_policy_decision(&error);
            }
            Err(_elapsed) => {
                let error = ConnectionError::new(ErrorKind::TimeoutConnect, Default::default());
                self.connection.last_error = Some(error.clone());
                let _ = self.transition(&Event::TransportError { reason: "timed out connecting".to_owned() });
                self.handle_policy_decision(&error);
            }
        }
    }

    /// Requests the HTTP → WebSocket upgrade on the already-open transport
    /// handle, per spec.md §6. The upgrade's confirmation (with response
    /// headers) arrives asynchronously as [`TransportEvent::UpgradeOk`] on
    /// the transport's event stream; this call only covers the synchronous
    /// dispatch of the upgrade request and its deadline.
    async fn begin_upgrade(&mut self) {
        let Some(handle) = self.transport_handle else {
            return;
        };
        let path = self.connection.endpoint.url.path().to_owned();
        self.upgrade_started_at = Some(Instant::now());
        let deadline = self.config.timeouts.upgrade;
        match tokio::time::timeout(deadline, self.transport.upgrade(handle, &path, &[])).await {
            Ok(Ok(_stream_ref)) => {}
            Ok(Err(e)) => {
                let error = ConnectionError::new(ErrorKind::UpgradeFailed, Default::default());
                self.close_session(error, e.to_string()).await;
            }
            Err(_elapsed) => {
                let error = ConnectionError::new(ErrorKind::TimeoutUpgrade, Default::default());
                self.close_session(error, "timed out upgrading".to_owned()).await;
            }
        }
    }

    /// Tears down the current transport handle and transitions the
    /// connection down, as if the transport itself had reported a loss —
    /// used when this side chooses to end the session (upgrade failure,
    /// auth rejection, auth timeout) rather than being told by the
    /// transport's event stream.
    async fn close_session(&mut self, error: ConnectionError, reason: String) {
        if let Some(handle) = self.transport_handle.take() {
            let _ = self.transport.close(handle).await;
        }
        let killed_streams: Vec<StreamRef> = self.connection.streams.keys().copied().collect();
        self.connection.last_error = Some(error.clone());
        if self
            .transition(&Event::TransportDown { reason: reason.clone(), killed_streams })
            .is_ok()
        {
            self.connection.streams.clear();
            self.auth_deadline = None;
            self.session_started_at = None;
            self.subscriptions.snapshot_for_reconnect();
            self.emit(CallbackEvent::ConnectionDown { reason });
            self.handle_policy_decision(&error);
        }
    }

    fn handle_policy_decision(&mut self, error: &ConnectionError) {
        match self.policy.handle_error(error) {
            Ok(HandleOutcome::Retry(delay)) => {
                let _ = self.transition(&Event::RetryDecision(true));
                self.reconnect_at = Some(Instant::now() + delay);
            }
            Ok(HandleOutcome::Stop(_)) => {
                let _ = self.transition(&Event::RetryDecision(false));
            }
            Ok(HandleOutcome::Ok) => {}
            Err(_already_handling) => {}
        }
        self.policy.finish_handling();
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::TransportUp { protocol } => {
                if self.transition(&Event::TransportUp { protocol: protocol.clone() }).is_ok() {
                    self.emit(CallbackEvent::ConnectionUp { protocol });
                    if let Some(started) = self.connect_started_at.take() {
                        self.record(TelemetryEvent::ConnectionOpen { duration: started.elapsed() });
                    }
                    self.begin_upgrade().await;
                }
            }
            TransportEvent::UpgradeOk { stream_ref, headers } => {
                if self
                    .transition(&Event::UpgradeOk { stream_ref, headers: headers.clone() })
                    .is_ok()
                {
                    // spec.md §8 invariant 2: the attempt counter resets
                    // atomically on the first upgrade_ok after a reconnect
                    // sequence, not on the earlier bare transport_up — a
                    // transport that dials successfully but fails every
                    // upgrade must still exhaust max_attempts.
                    self.policy.reset_attempts();
                    self.connection.reconnect_attempts = 0;
                    self.connection.streams.insert(
                        stream_ref,
                        super::Stream {
                            stream_ref,
                            kind: super::StreamKind::Websocket,
                            upgrade_headers: Some(headers.clone()),
                        },
                    );
                    self.emit(CallbackEvent::WebsocketUpgrade { stream_ref, headers });
                    if let Some(started) = self.upgrade_started_at.take() {
                        self.record(TelemetryEvent::ConnectionWebsocketUpgrade {
                            duration: started.elapsed(),
                        });
                    }
                    self.session_started_at = Some(Instant::now());
                    if let Ok(credentials) = self.auth.authenticate() {
                        let frame = self.adapter.encode_auth_request(&credentials);
                        let _ = self.send_frame(stream_ref, frame).await;
                        self.auth_deadline =
                            Some(Instant::now() + self.config.timeouts.auth_response);
                        self.reauth_delay.reset();
                    }
                    for outcome in self.subscriptions.replay_after_reconnect() {
                        self.report_replay(outcome);
                    }
                }
            }
            TransportEvent::TransportDown { reason, killed_streams, .. } => {
                for s in &killed_streams {
                    self.connection.streams.remove(s);
                }
                if self
                    .transition(&Event::TransportDown {
                        reason: reason.clone(),
                        killed_streams: killed_streams.clone(),
                    })
                    .is_ok()
                {
                    self.auth_deadline = None;
                    self.session_started_at = None;
                    self.subscriptions.snapshot_for_reconnect();
                    let error = ConnectionError::new(ErrorKind::TransportDown, Default::default());
                    self.connection.last_error = Some(error.clone());
                    self.emit(CallbackEvent::ConnectionDown { reason });
                    self.handle_policy_decision(&error);
                }
            }
            TransportEvent::Frame { stream_ref, frame } => {
                self.route_frame(stream_ref, frame).await;
            }
            TransportEvent::Error { stream_ref, reason } => {
                if let Some(s) = stream_ref {
                    self.connection.streams.remove(&s);
                }
                let mut context = std::collections::HashMap::new();
                context.insert("reason".to_owned(), reason.clone());
                let error = ConnectionError::new(ErrorKind::TransportDown, context);
                self.connection.last_error = Some(error.clone());
                self.emit(CallbackEvent::Error { stream_ref, reason: reason.clone() });
                self.record(TelemetryEvent::ErrorOccurred {
                    reason,
                    context: error.context.clone(),
                });
            }
            TransportEvent::HttpResponse { stream_ref, is_fin, status, headers } => {
                self.emit(CallbackEvent::HttpResponse { stream_ref, is_fin, status, headers });
            }
            TransportEvent::HttpData { stream_ref, is_fin, data } => {
                self.emit(CallbackEvent::HttpData { stream_ref, is_fin, data });
            }
        }
    }

    async fn route_frame(&mut self, stream_ref: StreamRef, frame: Frame) {
        if let Frame::Close(close) = &frame {
            self.connection.streams.remove(&stream_ref);
            let code = close.as_ref().and_then(|c| c.code);
            let _ = self.transition(&Event::PeerClose { code });
            self.auth_deadline = None;
            self.session_started_at = None;
            self.subscriptions.snapshot_for_reconnect();
            self.emit(CallbackEvent::ConnectionDown {
                reason: code.map_or_else(|| "peer closed".to_owned(), |c| crate::codec::close_code_meaning(c)),
            });
            return;
        }

        let (size, frame_type) = frame_telemetry(&frame);
        self.record(TelemetryEvent::MessageReceived { size, latency: None, frame_type });

        if matches!(self.auth.state().status, Some(crate::auth::AuthStatus::Authenticating)) {
            match self.auth.handle_auth_response(&frame) {
                Ok(()) => {
                    self.auth_deadline = None;
                    return;
                }
                Err(kind) => {
                    self.auth_deadline = None;
                    let error = ConnectionError::new(kind, Default::default());
                    self.emit(CallbackEvent::ConnectionError { reason: error.to_string() });
                    self.close_session(error, "auth rejected".to_owned()).await;
                    return;
                }
            }
        }

        match self.adapter.handle_platform_message(&frame) {
            crate::adapter::AdapterOutcome::Reply(reply) => {
                let _ = self.send_frame(stream_ref, reply).await;
            }
            crate::adapter::AdapterOutcome::Ok => {}
            crate::adapter::AdapterOutcome::Error(_) => {}
        }
        self.emit(CallbackEvent::WebsocketFrame { stream_ref, frame });
    }

    fn report_replay(&self, outcome: crate::subscription::ReplayOutcome) {
        match outcome {
            crate::subscription::ReplayOutcome::Restored(id) => {
                self.record(TelemetryEvent::SubscriptionRestored {
                    duration: std::time::Duration::default(),
                    subscription_id: id,
                    channel: String::new(),
                });
            }
            crate::subscription::ReplayOutcome::Failed(reason) => {
                self.record(TelemetryEvent::SubscriptionRestorationFailed {
                    duration: std::time::Duration::default(),
                    channel: String::new(),
                    reason: Some(reason),
                });
            }
        }
    }

    async fn send_frame(&mut self, stream_ref: StreamRef, frame: Frame) -> Result<(), ErrorKind> {
        crate::codec::validate(&frame).map_err(ErrorKind::from)?;
        let Some(handle) = self.transport_handle else {
            return Err(ErrorKind::TransportDown);
        };
        let frame = crate::codec::encode(frame);
        self.transport
            .send(handle, stream_ref, frame.clone())
            .await
            .map_err(|_| ErrorKind::TransportDown)?;
        let (size, frame_type) = frame_telemetry(&frame);
        self.record(TelemetryEvent::MessageSent { size, frame_type });
        Ok(())
    }

    async fn handle_command(&mut self, command: RuntimeCommand) -> bool {
        match command {
            RuntimeCommand::Send(frame) => {
                let stream_ref = self
                    .connection
                    .streams
                    .keys()
                    .copied()
                    .next()
                    .unwrap_or(StreamRef(0));
                let _ = self.send_frame(stream_ref, frame).await;
                true
            }
            RuntimeCommand::Subscribe { channel, params, reply } => {
                let result = self.subscriptions.subscribe(&channel, params);
                let _ = reply.send(result);
                true
            }
            RuntimeCommand::Unsubscribe { id, reply } => {
                let result = self.subscriptions.unsubscribe(id);
                let _ = reply.send(result);
                true
            }
            RuntimeCommand::UpdateConfig(config) => {
                self.config = config;
                true
            }
            RuntimeCommand::TransferOwnership { host, port } => {
                let stream_count = self.connection.streams.len();
                self.emit(CallbackEvent::OwnershipTransfer { host, port, stream_count });
                self.record(TelemetryEvent::OwnershipTransferReceived { stream_count });
                true
            }
            RuntimeCommand::Close => {
                if let Some(handle) = self.transport_handle.take() {
                    let _ = self.transport.close(handle).await;
                }
                self.reauth_delay.stop();
                self.reconnect_at = None;
                self.auth_deadline = None;
                if let Some(started) = self.session_started_at.take() {
                    self.record(TelemetryEvent::ConnectionClose { duration: started.elapsed() });
                }
                let _ = self.transition(&Event::ExplicitClose);
                false
            }
        }
    }

    async fn poll_reauth(&mut self) {
        if !matches!(self.connection.status, ConnectionState::WebsocketConnected) {
            return;
        }
        if let Ok(Some(credentials)) = self.auth.check_reauthentication() {
            let frame = self.adapter.encode_auth_request(&credentials);
            let stream_ref = self.connection.streams.keys().copied().next().unwrap_or(StreamRef(0));
            let _ = self.send_frame(stream_ref, frame).await;
            self.auth_deadline = Some(Instant::now() + self.config.timeouts.auth_response);
            self.reauth_delay.reset();
        }
    }

    /// Drives the mailbox loop until an explicit close or the transport's
    /// event stream ends permanently, per spec.md §5.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RuntimeCommand>) {
        self.dial().await;
        loop {
            if matches!(self.connection.status, ConnectionState::Closed) {
                break;
            }
            let reconnect_sleep = async {
                match self.reconnect_at {
                    Some(at) => tokio::time::sleep_until(at.into()).await,
                    None => std::future::pending().await,
                }
            };
            let auth_timeout_sleep = async {
                match self.auth_deadline {
                    Some(at) => tokio::time::sleep_until(at.into()).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                maybe_cmd = commands.recv() => {
                    match maybe_cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                maybe_event = self.transport.next_event() => {
                    match maybe_event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {}
                    }
                }
                () = reconnect_sleep => {
                    self.reconnect_at = None;
                    self.dial().await;
                }
                () = self.reauth_delay.wait() => {
                    self.poll_reauth().await;
                }
                () = auth_timeout_sleep => {
                    self.auth_deadline = None;
                    let error = ConnectionError::new(ErrorKind::TimeoutAuth, Default::default());
                    self.close_session(error, "timed out waiting for auth response".to_owned()).await;
                }
            }
        }
    }
}

