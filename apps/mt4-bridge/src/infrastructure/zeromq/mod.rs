//! ZeroMQ Channel Transports
//!
//! [`ZmqChannel`] adapts one ZeroMQ socket to the
//! [`ChannelTransport`](crate::application::ports::ChannelTransport) port.
//!
//! # Threading
//!
//! ZeroMQ sockets are not thread-safe, so each channel owns a dedicated OS
//! thread that holds the data socket and the PAIR end of its monitor. The
//! thread polls both and hands everything to the connection through the
//! channel sink:
//!
//! ```text
//!   send() ──std mpsc──► worker thread ──► REQ socket ──► terminal
//!                             │
//!   ChannelSink ◄─────────────┴── frames + monitor events
//! ```
//!
//! The REQ worker keeps strict send/receive lockstep: the next frame leaves
//! only after the previous reply arrived or the reply timeout elapsed.

mod monitor;
mod worker;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use url::Url;

use crate::application::ports::{ChannelSink, ChannelTransport, TransportError};

pub use monitor::MONITOR_EVENTS;

static MONITOR_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Socket pattern of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZmqSocketKind {
    /// Command channel, connects to the terminal's REP socket.
    Request,
    /// Receive-only channel, connects to the terminal's PUSH socket.
    Pull,
}

impl ZmqSocketKind {
    const fn socket_type(self) -> zmq::SocketType {
        match self {
            Self::Request => zmq::REQ,
            Self::Pull => zmq::PULL,
        }
    }

    /// Short name used in thread names and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "req",
            Self::Pull => "pull",
        }
    }
}

impl fmt::Display for ZmqSocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Worker {
    outbound: mpsc::Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// One ZeroMQ socket running on its own thread.
pub struct ZmqChannel {
    kind: ZmqSocketKind,
    context: zmq::Context,
    reply_timeout: Duration,
    worker: Option<Worker>,
}

impl ZmqChannel {
    /// REQ channel. `reply_timeout` bounds how long the lockstep waits for
    /// a reply before the next frame may be sent.
    #[must_use]
    pub fn request(context: &zmq::Context, reply_timeout: Duration) -> Self {
        Self::new(ZmqSocketKind::Request, context, reply_timeout)
    }

    /// PULL channel.
    #[must_use]
    pub fn pull(context: &zmq::Context) -> Self {
        Self::new(ZmqSocketKind::Pull, context, Duration::ZERO)
    }

    fn new(kind: ZmqSocketKind, context: &zmq::Context, reply_timeout: Duration) -> Self {
        Self {
            kind,
            context: context.clone(),
            reply_timeout,
            worker: None,
        }
    }

    /// Socket pattern of this channel.
    #[must_use]
    pub const fn kind(&self) -> ZmqSocketKind {
        self.kind
    }

    fn open_sockets(&self, address: &Url) -> Result<(zmq::Socket, zmq::Socket), TransportError> {
        let socket = self
            .context
            .socket(self.kind.socket_type())
            .map_err(socket_error)?;
        socket.set_linger(0).map_err(socket_error)?;

        if self.kind == ZmqSocketKind::Request {
            socket.set_req_relaxed(true).map_err(socket_error)?;
            socket.set_req_correlate(true).map_err(socket_error)?;
        }

        let endpoint = format!(
            "inproc://mt4-bridge-monitor-{}-{}",
            self.kind,
            MONITOR_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        socket
            .monitor(&endpoint, MONITOR_EVENTS)
            .map_err(socket_error)?;

        let monitor = self.context.socket(zmq::PAIR).map_err(socket_error)?;
        monitor.connect(&endpoint).map_err(socket_error)?;

        socket
            .connect(address.as_str())
            .map_err(|e| TransportError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        Ok((socket, monitor))
    }
}

impl ChannelTransport for ZmqChannel {
    fn connect(&mut self, address: &Url, sink: ChannelSink) -> Result<(), TransportError> {
        if self.worker.is_some() {
            return Err(TransportError::Socket(format!(
                "{} channel is already connected",
                self.kind
            )));
        }

        let (socket, monitor) = self.open_sockets(address)?;
        let (outbound, outbound_rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let state = worker::WorkerState::new(
            self.kind,
            socket,
            monitor,
            outbound_rx,
            sink,
            Arc::clone(&stop),
            self.reply_timeout,
        );

        let handle = std::thread::Builder::new()
            .name(format!("zmq-{}", self.kind))
            .spawn(move || state.run())
            .map_err(|e| TransportError::Socket(e.to_string()))?;

        tracing::info!(kind = %self.kind, address = %address, "ZeroMQ channel connecting");
        self.worker = Some(Worker {
            outbound,
            stop,
            handle,
        });
        Ok(())
    }

    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.kind == ZmqSocketKind::Pull {
            return Err(TransportError::ReceiveOnly);
        }

        let worker = self.worker.as_ref().ok_or(TransportError::Closed)?;
        worker.outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.stop.store(true, Ordering::Release);
        drop(worker.outbound);
        if worker.handle.join().is_err() {
            tracing::error!(kind = %self.kind, "ZeroMQ worker thread panicked");
        }
        tracing::debug!(kind = %self.kind, "ZeroMQ channel closed");
    }
}

impl Drop for ZmqChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ZmqChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZmqChannel")
            .field("kind", &self.kind)
            .field("reply_timeout", &self.reply_timeout)
            .field("running", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

fn socket_error(err: zmq::Error) -> TransportError {
    TransportError::Socket(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::link::ChannelKind;

    #[test]
    fn pull_channel_is_receive_only() {
        let context = zmq::Context::new();
        let mut channel = ZmqChannel::pull(&context);
        assert_eq!(channel.send(b"x".to_vec()), Err(TransportError::ReceiveOnly));
    }

    #[test]
    fn send_before_connect_fails() {
        let context = zmq::Context::new();
        let mut channel = ZmqChannel::request(&context, Duration::from_secs(1));
        assert_eq!(channel.send(b"x".to_vec()), Err(TransportError::Closed));
    }

    #[test]
    fn connect_twice_fails() {
        let context = zmq::Context::new();
        let mut channel = ZmqChannel::pull(&context);
        let address = Url::parse("tcp://127.0.0.1:59123").unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        channel
            .connect(&address, ChannelSink::new(ChannelKind::Push, tx.clone()))
            .unwrap();
        assert!(matches!(
            channel.connect(&address, ChannelSink::new(ChannelKind::Push, tx)),
            Err(TransportError::Socket(_))
        ));
        channel.close();
    }
}
