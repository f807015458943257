//! Socket worker loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use super::ZmqSocketKind;
use super::monitor;
use crate::application::ports::{ChannelSink, TransportEvent};

/// Poll timeout; bounds the latency of outbound frames and of `close`.
const POLL_INTERVAL_MS: i64 = 5;

/// Pause after a failed poll before the next attempt.
const POLL_RETRY_DELAY: Duration = Duration::from_millis(5);

pub(super) struct WorkerState {
    kind: ZmqSocketKind,
    socket: zmq::Socket,
    monitor: zmq::Socket,
    outbound: mpsc::Receiver<Vec<u8>>,
    sink: ChannelSink,
    stop: Arc<AtomicBool>,
    reply_timeout: Duration,
    awaiting_reply: Option<Instant>,
}

impl WorkerState {
    pub(super) const fn new(
        kind: ZmqSocketKind,
        socket: zmq::Socket,
        monitor: zmq::Socket,
        outbound: mpsc::Receiver<Vec<u8>>,
        sink: ChannelSink,
        stop: Arc<AtomicBool>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            kind,
            socket,
            monitor,
            outbound,
            sink,
            stop,
            reply_timeout,
            awaiting_reply: None,
        }
    }

    pub(super) fn run(mut self) {
        tracing::debug!(kind = %self.kind, "ZeroMQ worker started");

        while !self.stop.load(Ordering::Acquire) {
            if self.kind == ZmqSocketKind::Request {
                self.flush_outbound();
            }

            let (data_ready, monitor_ready) = match self.poll() {
                Ok(ready) => ready,
                Err(e) => match retry_delay(e) {
                    Some(delay) => {
                        tracing::warn!(kind = %self.kind, error = %e, "ZeroMQ poll failed");
                        std::thread::sleep(delay);
                        continue;
                    }
                    None => break,
                },
            };

            if data_ready && !self.receive_frame() {
                break;
            }
            if monitor_ready && !self.receive_monitor_event() {
                break;
            }
        }

        tracing::debug!(kind = %self.kind, "ZeroMQ worker stopped");
    }

    fn poll(&self) -> Result<(bool, bool), zmq::Error> {
        let mut items = [
            self.socket.as_poll_item(zmq::POLLIN),
            self.monitor.as_poll_item(zmq::POLLIN),
        ];
        zmq::poll(&mut items, POLL_INTERVAL_MS)?;
        Ok((items[0].is_readable(), items[1].is_readable()))
    }

    /// Send the next queued frame if the lockstep allows it.
    fn flush_outbound(&mut self) {
        if let Some(sent_at) = self.awaiting_reply {
            if sent_at.elapsed() < self.reply_timeout {
                return;
            }
            tracing::debug!(kind = %self.kind, "No reply within timeout, relaxing lockstep");
            self.awaiting_reply = None;
        }

        let Ok(frame) = self.outbound.try_recv() else {
            return;
        };

        match self.socket.send(frame.as_slice(), 0) {
            Ok(()) => self.awaiting_reply = Some(Instant::now()),
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "ZeroMQ send failed");
                self.sink.emit(send_failure(frame, e));
            }
        }
    }

    /// Returns `false` once the connection stopped listening.
    fn receive_frame(&mut self) -> bool {
        match self.socket.recv_bytes(zmq::DONTWAIT) {
            Ok(bytes) => {
                self.awaiting_reply = None;
                self.sink.emit(TransportEvent::Message(bytes))
            }
            Err(zmq::Error::EAGAIN) => true,
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "ZeroMQ receive failed");
                true
            }
        }
    }

    /// Returns `false` once the connection stopped listening.
    fn receive_monitor_event(&self) -> bool {
        let frames = match self.monitor.recv_multipart(zmq::DONTWAIT) {
            Ok(frames) => frames,
            Err(zmq::Error::EAGAIN) => return true,
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "ZeroMQ monitor receive failed");
                return true;
            }
        };

        let Some(event) = monitor::event_id(&frames) else {
            return true;
        };

        if monitor::is_retry(event) {
            tracing::trace!(kind = %self.kind, "Reconnect attempt");
        }

        monitor::to_signal(event).is_none_or(|signal| self.sink.emit(signal))
    }
}

/// Delay before polling again, or `None` once the context is terminated.
const fn retry_delay(err: zmq::Error) -> Option<Duration> {
    match err {
        zmq::Error::ETERM => None,
        _ => Some(POLL_RETRY_DELAY),
    }
}

fn send_failure(frame: Vec<u8>, err: zmq::Error) -> TransportEvent {
    TransportEvent::SendFailed {
        frame,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(zmq::Error::EINTR ; "interrupted")]
    #[test_case(zmq::Error::EFAULT ; "bad socket")]
    fn failed_poll_backs_off(err: zmq::Error) {
        assert_eq!(retry_delay(err), Some(POLL_RETRY_DELAY));
    }

    #[test]
    fn terminated_context_stops_polling() {
        assert_eq!(retry_delay(zmq::Error::ETERM), None);
    }

    #[test]
    fn send_failure_hands_the_frame_back() {
        let event = send_failure(b"key|7|1".to_vec(), zmq::Error::EFSM);

        assert_eq!(
            event,
            TransportEvent::SendFailed {
                frame: b"key|7|1".to_vec(),
                reason: zmq::Error::EFSM.to_string(),
            }
        );
    }
}
