//! Terminal Connection
//!
//! [`Mt4Connection`] multiplexes correlated requests over the request
//! channel and routes everything arriving on either channel. All mutable
//! state lives in a single actor task:
//!
//! ```text
//!  request() ──► Command::Request ─┐
//!  queue timer ─► Command::Dispatch ┼──► ConnectionActor ──► request channel
//!  reply timer ─► Command::Expire  ─┘        ▲
//!                                            │ ChannelSignal
//!                          REQ / PULL transports (connect, frames, drops)
//! ```
//!
//! Timers are spawned tasks that post back to the actor; they are aborted
//! when their request completes or is rejected.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::correlator::{Correlator, Reply, RequestOutcome};
use super::status::BridgeStatus;
use crate::application::ports::{ChannelSignal, ChannelSink, ChannelTransport, TransportEvent};
use crate::domain::events::{BridgeEvent, EventDispatcher, StreamKind, Topic};
use crate::domain::link::{ChannelKind, ConnectProbe, LinkState, LinkTransition};
use crate::domain::protocol::{
    FrameCodec, InboundMessage, MessageKind, Payload, RequestArg, ResponseStatus,
};
use crate::error::{ConnectError, RequestError};
use crate::infrastructure::config::{ConnectionSettings, DelimiterPolicy};
use crate::infrastructure::metrics;

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug)]
enum Command {
    /// New request from a caller.
    Request { args: Vec<RequestArg>, reply: Reply },
    /// Queue delay of a request elapsed.
    Dispatch(u64),
    /// Reply timeout of a request elapsed.
    Expire(u64),
}

// =============================================================================
// Connection Handle
// =============================================================================

/// Handle to one terminal connection.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Mt4Connection {
    settings: ConnectionSettings,
    dispatcher: Arc<EventDispatcher>,
    status: Arc<BridgeStatus>,
    commands: mpsc::UnboundedSender<Command>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    started: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Mt4Connection {
    /// Create an unstarted connection.
    #[must_use]
    pub fn new(settings: ConnectionSettings) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        Self {
            settings,
            dispatcher: Arc::new(EventDispatcher::new()),
            status: Arc::new(BridgeStatus::new()),
            commands,
            inbox: Mutex::new(Some(inbox)),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Register a listener. Listeners registered before `connect` see the
    /// first `Connect` event.
    pub fn on<F>(&self, topic: Topic, listener: F)
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        self.dispatcher.on(topic, listener);
    }

    /// Connect both transports and start the actor.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError::AlreadyStarted` on a second call, or
    /// `ConnectError::Transport` if a transport refuses its address. A failed
    /// call may be retried with fresh transports.
    pub fn connect(
        &self,
        mut request: Box<dyn ChannelTransport>,
        mut push: Box<dyn ChannelTransport>,
    ) -> Result<(), ConnectError> {
        let mut inbox = self.inbox.lock();
        if inbox.is_none() {
            return Err(ConnectError::AlreadyStarted);
        }

        let (signal_tx, signals) = mpsc::unbounded_channel();

        request
            .connect(
                &self.settings.request_address,
                ChannelSink::new(ChannelKind::Request, signal_tx.clone()),
            )
            .map_err(|source| ConnectError::Transport {
                channel: ChannelKind::Request,
                source,
            })?;

        if let Err(source) = push.connect(
            &self.settings.push_address,
            ChannelSink::new(ChannelKind::Push, signal_tx),
        ) {
            request.close();
            return Err(ConnectError::Transport {
                channel: ChannelKind::Push,
                source,
            });
        }

        let Some(commands) = inbox.take() else {
            return Err(ConnectError::AlreadyStarted);
        };

        let actor = ConnectionActor {
            settings: self.settings.clone(),
            codec: FrameCodec::new(),
            link: LinkState::new(),
            request_probe: ConnectProbe::new(),
            push_probe: ConnectProbe::new(),
            correlator: Correlator::new(),
            request,
            push,
            dispatcher: Arc::clone(&self.dispatcher),
            status: Arc::clone(&self.status),
            commands: self.commands.clone(),
        };

        tracing::info!(
            request_address = %self.settings.request_address,
            push_address = %self.settings.push_address,
            "Connecting to terminal"
        );

        let handle = tokio::spawn(actor.run(commands, signals, self.cancel.clone()));
        *self.task.lock() = Some(handle);
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    /// Issue a correlated request and wait for its outcome.
    ///
    /// Arguments are sent exactly as supplied, after the api key and the
    /// allocated correlation id.
    ///
    /// # Errors
    ///
    /// - `NotConnected` before `connect`
    /// - `ChannelClosed` when a channel is down at call time or goes down
    ///   while the request is queued
    /// - `InvalidArgument` when the delimiter policy refuses an argument
    /// - `Remote`, `Timeout`, `Transport` or `Shutdown` per the request's fate
    pub async fn request(&self, args: Vec<RequestArg>) -> Result<Payload, RequestError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(RequestError::NotConnected);
        }

        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Request { args, reply })
            .map_err(|_| RequestError::Shutdown)?;

        outcome.await.unwrap_or(Err(RequestError::Shutdown))
    }

    /// Stop the actor, rejecting every outstanding request with `Shutdown`.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Connection task failed");
        }
    }

    /// Whether both channels are currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// Listener registry of this connection.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<EventDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Shared status for health reporting.
    #[must_use]
    pub fn status(&self) -> Arc<BridgeStatus> {
        Arc::clone(&self.status)
    }

    /// Settings this connection was created with.
    #[must_use]
    pub const fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }
}

impl Drop for Mt4Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Mt4Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mt4Connection")
            .field("settings", &self.settings)
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("connected", &self.status.is_connected())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Actor
// =============================================================================

struct ConnectionActor {
    settings: ConnectionSettings,
    codec: FrameCodec,
    link: LinkState,
    request_probe: ConnectProbe,
    push_probe: ConnectProbe,
    correlator: Correlator,
    request: Box<dyn ChannelTransport>,
    push: Box<dyn ChannelTransport>,
    dispatcher: Arc<EventDispatcher>,
    status: Arc<BridgeStatus>,
    commands: mpsc::UnboundedSender<Command>,
}

impl ConnectionActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<ChannelSignal>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(signal) = signals.recv() => self.on_signal(signal),
                Some(command) = commands.recv() => self.on_command(command),
                else => break,
            }
        }

        self.stop(&mut commands);
    }

    fn stop(&mut self, commands: &mut mpsc::UnboundedReceiver<Command>) {
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let Command::Request { reply, .. } = command {
                reject(reply, RequestError::Shutdown);
            }
        }

        let rejected = self.correlator.drain_all(&RequestError::Shutdown);
        self.request.close();
        self.push.close();

        for channel in ChannelKind::ALL {
            self.status.set_channel_up(channel, false);
        }
        self.status.set_pending_requests(0);
        metrics::set_link_up(false);
        metrics::set_pending_requests(0);

        tracing::info!(rejected, "Connection stopped");
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Request { args, reply } => self.accept(args, reply),
            Command::Dispatch(id) => self.dispatch(id),
            Command::Expire(id) => self.expire(id),
        }
    }

    fn accept(&mut self, args: Vec<RequestArg>, reply: Reply) {
        if let Some(channel) = self.link.first_down() {
            reject(reply, RequestError::ChannelClosed(channel));
            return;
        }

        if self.settings.delimiter_policy == DelimiterPolicy::Reject
            && let Some(position) = FrameCodec::delimiter_collisions(&args).first()
        {
            reject(
                reply,
                RequestError::InvalidArgument(format!(
                    "argument {position} contains the frame delimiter"
                )),
            );
            return;
        }

        let id = self.correlator.allocate();
        let delay = self.schedule(self.settings.queue_delay, Command::Dispatch(id));
        self.correlator.enqueue(id, args, reply, delay);
        tracing::trace!(correlation_id = id, "Request queued");
    }

    fn dispatch(&mut self, id: u64) {
        let Some((args, reply)) = self.correlator.take_queued(id) else {
            return;
        };

        let frame = self.codec.encode(self.settings.api_key(), id, &args);
        for position in &frame.collisions {
            tracing::warn!(
                correlation_id = id,
                position,
                "Request argument contains the frame delimiter, frame is ambiguous"
            );
            self.status.increment_anomalies();
            metrics::record_frame_anomaly();
        }

        let timeout = self.schedule(self.settings.request_timeout, Command::Expire(id));
        self.correlator.register(id, reply, timeout);

        match self.request.send(frame.bytes) {
            Ok(()) => {
                self.status.increment_frames_sent();
                tracing::debug!(correlation_id = id, args = args.len(), "Request sent");
            }
            Err(e) => {
                tracing::error!(correlation_id = id, error = %e, "Failed to send request");
                self.finish(id, Err(e.into()));
            }
        }
        self.publish_pending();
    }

    fn expire(&mut self, id: u64) {
        if self.correlator.expire(id, self.settings.request_timeout) {
            tracing::warn!(
                correlation_id = id,
                timeout_ms = self.settings.request_timeout.as_millis(),
                "Request timed out"
            );
            metrics::record_request("timeout");
            self.publish_pending();
        }
    }

    fn schedule(&self, delay: Duration, command: Command) -> AbortHandle {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(command);
        })
        .abort_handle()
    }

    fn finish(&mut self, id: u64, outcome: RequestOutcome) -> bool {
        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };

        match self.correlator.complete(id, outcome) {
            Some(elapsed) => {
                metrics::record_request(label);
                metrics::record_request_duration(elapsed);
                true
            }
            None => false,
        }
    }

    fn publish_pending(&self) {
        let pending = self.correlator.pending_len();
        self.status.set_pending_requests(pending);
        metrics::set_pending_requests(pending);
    }

    // -------------------------------------------------------------------------
    // Transport Signals
    // -------------------------------------------------------------------------

    fn on_signal(&mut self, signal: ChannelSignal) {
        let ChannelSignal { channel, event } = signal;
        match event {
            TransportEvent::Connected => self.on_channel_up(channel),
            TransportEvent::Disconnected => self.on_channel_down(channel),
            TransportEvent::ConnectDelayed => self.on_connect_delayed(channel),
            TransportEvent::Message(bytes) => self.on_frame(channel, &bytes),
            TransportEvent::SendFailed { frame, reason } => {
                self.on_send_failed(channel, &frame, reason);
            }
        }
    }

    fn on_send_failed(&mut self, channel: ChannelKind, frame: &[u8], reason: String) {
        let Some(id) = self
            .codec
            .outbound_correlation_id(self.settings.api_key(), frame)
        else {
            tracing::warn!(channel = %channel, reason = %reason, "Dropped an unrecognised frame");
            return;
        };

        tracing::error!(
            correlation_id = id,
            channel = %channel,
            reason = %reason,
            "Request frame was not sent"
        );
        if self.finish(id, Err(RequestError::Transport(reason))) {
            self.publish_pending();
        }
    }

    fn on_channel_up(&mut self, channel: ChannelKind) {
        self.probe(channel).on_connected();
        self.status.set_channel_up(channel, true);
        tracing::debug!(channel = %channel, "Channel connected");

        if self.link.set(channel, true) == Some(LinkTransition::Up) {
            tracing::info!("Connected to terminal");
            self.status.mark_connected();
            metrics::set_link_up(true);
            self.dispatcher.publish(&BridgeEvent::Connected);
        }
    }

    fn on_channel_down(&mut self, channel: ChannelKind) {
        self.status.set_channel_up(channel, false);
        tracing::debug!(channel = %channel, "Channel disconnected");

        if self.link.set(channel, false) == Some(LinkTransition::Down) {
            let rejected = self
                .correlator
                .drain_queued(&RequestError::ChannelClosed(channel));
            tracing::warn!(channel = %channel, rejected, "Disconnected from terminal");

            self.status.mark_disconnected();
            metrics::set_link_up(false);
            self.dispatcher
                .publish(&BridgeEvent::Disconnected { channel });
        }
    }

    fn on_connect_delayed(&mut self, channel: ChannelKind) {
        if self.probe(channel).on_connect_delayed() {
            tracing::warn!(
                channel = %channel,
                "cannot connect with {}",
                self.settings.address(channel)
            );
        }
    }

    const fn probe(&mut self, channel: ChannelKind) -> &mut ConnectProbe {
        match channel {
            ChannelKind::Request => &mut self.request_probe,
            ChannelKind::Push => &mut self.push_probe,
        }
    }

    fn on_frame(&mut self, channel: ChannelKind, bytes: &[u8]) {
        self.status.increment_frames_received();
        metrics::record_frame_received(channel);

        let message = self.codec.decode(bytes);
        if channel == ChannelKind::Request && message.is_acknowledgement() {
            tracing::trace!(reply = %String::from_utf8_lossy(bytes), "Request acknowledged");
        } else if let Some(anomaly) = &message.anomaly {
            tracing::warn!(
                channel = %channel,
                anomaly = %anomaly,
                frame = %String::from_utf8_lossy(bytes),
                "Malformed frame"
            );
            self.status.increment_anomalies();
            metrics::record_frame_anomaly();
        }

        let raw = (self.dispatcher.listener_count(&Topic::RawMessage(channel)) > 0)
            .then(|| message.clone());

        match message.kind {
            MessageKind::Response => self.route_response(channel, message),
            MessageKind::Stream => {
                let kind = StreamKind::from_id(&message.id);
                tracing::trace!(stream = kind.as_str(), "Stream event");
                self.dispatcher.publish(&BridgeEvent::Stream {
                    kind,
                    payload: message.payload,
                });
            }
            MessageKind::Other(ref tag) => {
                tracing::trace!(channel = %channel, tag = %tag, "Unrouted frame");
            }
        }

        if let Some(message) = raw {
            self.dispatcher
                .publish(&BridgeEvent::RawMessage { channel, message });
        }
    }

    fn route_response(&mut self, channel: ChannelKind, message: InboundMessage) {
        let Some(id) = message.correlation_id() else {
            tracing::warn!(channel = %channel, id = %message.id, "Response with non-numeric id");
            self.status.increment_anomalies();
            metrics::record_frame_anomaly();
            return;
        };

        let outcome = match message.status {
            Some(ResponseStatus::Ok) => Ok(message.payload),
            Some(ResponseStatus::Failed | ResponseStatus::Unknown(_)) => Err(RequestError::Remote(
                message.error.unwrap_or_default(),
            )),
            None => {
                tracing::debug!(correlation_id = id, "Response without status, ignored");
                return;
            }
        };

        if self.finish(id, outcome) {
            tracing::debug!(correlation_id = id, channel = %channel, "Reply routed");
            self.publish_pending();
        } else {
            tracing::debug!(correlation_id = id, "Reply for unknown request dropped");
        }
    }
}

fn reject(reply: Reply, err: RequestError) {
    tracing::debug!(error = %err, "Request rejected");
    metrics::record_request(err.outcome());
    let _ = reply.send(Err(err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockChannelTransport, TransportError};

    fn settings() -> ConnectionSettings {
        ConnectionSettings::new("key", "tcp://localhost:5555", "tcp://localhost:5556").unwrap()
    }

    fn idle_transport() -> MockChannelTransport {
        let mut transport = MockChannelTransport::new();
        transport.expect_connect().returning(|_, _| Ok(()));
        transport.expect_close().return_const(());
        transport
    }

    #[tokio::test]
    async fn request_before_connect_is_refused() {
        let connection = Mt4Connection::new(settings());
        assert_eq!(
            connection.request(vec![1_i64.into()]).await,
            Err(RequestError::NotConnected)
        );
    }

    #[tokio::test]
    async fn second_connect_is_refused() {
        let connection = Mt4Connection::new(settings());
        connection
            .connect(Box::new(idle_transport()), Box::new(idle_transport()))
            .unwrap();

        let err = connection
            .connect(Box::new(idle_transport()), Box::new(idle_transport()))
            .unwrap_err();
        assert!(matches!(err, ConnectError::AlreadyStarted));
        connection.shutdown().await;
    }

    #[tokio::test]
    async fn failed_push_connect_closes_request_channel() {
        let mut push = MockChannelTransport::new();
        push.expect_connect().returning(|address, _| {
            Err(TransportError::Connect {
                address: address.to_string(),
                reason: "refused".to_string(),
            })
        });
        let mut request = MockChannelTransport::new();
        request.expect_connect().returning(|_, _| Ok(()));
        request.expect_close().times(1).return_const(());

        let connection = Mt4Connection::new(settings());
        let err = connection
            .connect(Box::new(request), Box::new(push))
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectError::Transport {
                channel: ChannelKind::Push,
                ..
            }
        ));

        connection
            .connect(Box::new(idle_transport()), Box::new(idle_transport()))
            .unwrap();
        connection.shutdown().await;
    }

    #[tokio::test]
    async fn request_while_disconnected_never_sends() {
        let mut request = idle_transport();
        request.expect_send().times(0);

        let connection = Mt4Connection::new(settings());
        connection
            .connect(Box::new(request), Box::new(idle_transport()))
            .unwrap();

        assert_eq!(
            connection.request(vec![31_i64.into()]).await,
            Err(RequestError::ChannelClosed(ChannelKind::Request))
        );
        connection.shutdown().await;
    }

    #[tokio::test]
    async fn request_after_shutdown_is_refused() {
        let connection = Mt4Connection::new(settings());
        connection
            .connect(Box::new(idle_transport()), Box::new(idle_transport()))
            .unwrap();
        connection.shutdown().await;

        assert_eq!(
            connection.request(vec![1_i64.into()]).await,
            Err(RequestError::Shutdown)
        );
    }
}
