//! Shared fixtures for connection-level tests.
//!
//! [`ScriptedChannel`] stands in for a socket: the test drives its signals
//! (connect, drop, inbound frames) and inspects what the connection sent.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use url::Url;

use mt4_bridge::{
    ChannelSink, ChannelTransport, ConnectionSettings, Mt4Connection, TransportError,
    TransportEvent,
};

pub const API_KEY: &str = "key";
pub const REQUEST_URL: &str = "tcp://127.0.0.1:5555";
pub const PUSH_URL: &str = "tcp://127.0.0.1:5556";

#[derive(Default)]
struct ChannelState {
    sink: Option<ChannelSink>,
    sent: Vec<Vec<u8>>,
    closed: bool,
    fail_sends: bool,
}

/// In-memory channel transport controlled by the test.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, event: TransportEvent) {
        let sink = self.state.lock().sink.clone().expect("channel not connected");
        sink.emit(event);
    }

    pub fn connected(&self) {
        self.emit(TransportEvent::Connected);
    }

    pub fn disconnected(&self) {
        self.emit(TransportEvent::Disconnected);
    }

    pub fn connect_delayed(&self) {
        self.emit(TransportEvent::ConnectDelayed);
    }

    pub fn deliver(&self, frame: &str) {
        self.emit(TransportEvent::Message(frame.as_bytes().to_vec()));
    }

    /// Report that an accepted frame never made it onto the wire.
    pub fn drop_sent(&self, frame: &str, reason: &str) {
        self.emit(TransportEvent::SendFailed {
            frame: frame.as_bytes().to_vec(),
            reason: reason.to_string(),
        });
    }

    pub fn fail_sends(&self) {
        self.state.lock().fail_sends = true;
    }

    pub fn sent(&self) -> Vec<String> {
        self.state
            .lock()
            .sent
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl ChannelTransport for ScriptedChannel {
    fn connect(&mut self, _address: &Url, sink: ChannelSink) -> Result<(), TransportError> {
        self.state.lock().sink = Some(sink);
        Ok(())
    }

    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(TransportError::Closed);
        }
        state.sent.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }
}

/// A started connection with both scripted channels.
pub struct Harness {
    pub connection: Arc<Mt4Connection>,
    pub request: ScriptedChannel,
    pub push: ScriptedChannel,
}

pub fn settings() -> ConnectionSettings {
    ConnectionSettings::new(API_KEY, REQUEST_URL, PUSH_URL).unwrap()
}

impl Harness {
    /// Start a connection; channels are still down.
    pub fn start(settings: ConnectionSettings) -> Self {
        Self::start_with(Arc::new(Mt4Connection::new(settings)))
    }

    /// Start an already configured connection (listeners registered).
    pub fn start_with(connection: Arc<Mt4Connection>) -> Self {
        let request = ScriptedChannel::new();
        let push = ScriptedChannel::new();
        connection
            .connect(Box::new(request.clone()), Box::new(push.clone()))
            .unwrap();

        Self {
            connection,
            request,
            push,
        }
    }

    /// Start and bring both channels up.
    pub async fn connected(settings: ConnectionSettings) -> Self {
        let harness = Self::start(settings);
        harness.bring_up().await;
        harness
    }

    pub async fn bring_up(&self) {
        self.request.connected();
        self.push.connected();
        settle().await;
    }

    /// Wait until at least `count` frames went out on the request channel.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<String> {
        for _ in 0..1_000 {
            let sent = self.request.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {count} frame(s), got {:?}", self.request.sent());
    }

    /// Reply on the push channel and let the connection route it.
    pub async fn reply(&self, frame: &str) {
        self.push.deliver(frame);
        settle().await;
    }
}

/// Let the connection task drain its queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
