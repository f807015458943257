//! Shared Bridge Status
//!
//! Lock-free mirror of the actor's state for readers outside the actor
//! (health endpoint, terminal helpers). Written only by the connection actor.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::link::ChannelKind;

/// Point-in-time view of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Request channel up.
    pub request_up: bool,
    /// Push channel up.
    pub push_up: bool,
    /// Both channels up.
    pub connected: bool,
    /// When the link last became up.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Requests awaiting a reply.
    pub pending_requests: usize,
    /// Frames sent on the request channel.
    pub frames_sent: u64,
    /// Frames received on either channel.
    pub frames_received: u64,
    /// Frames that decoded with an anomaly.
    pub frame_anomalies: u64,
    /// Logical disconnects since start.
    pub disconnects: u64,
}

/// Atomics-backed bridge status.
#[derive(Debug, Default)]
pub struct BridgeStatus {
    request_up: AtomicBool,
    push_up: AtomicBool,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    pending_requests: AtomicUsize,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frame_anomalies: AtomicU64,
    disconnects: AtomicU64,
}

impl BridgeStatus {
    /// All channels down, counters zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a channel flag.
    pub fn set_channel_up(&self, channel: ChannelKind, up: bool) {
        let flag = match channel {
            ChannelKind::Request => &self.request_up,
            ChannelKind::Push => &self.push_up,
        };
        flag.store(up, Ordering::Relaxed);
    }

    /// Record that the link became up.
    pub fn mark_connected(&self) {
        *self.last_connected_at.write() = Some(Utc::now());
    }

    /// Record a logical disconnect.
    pub fn mark_disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the pending request count.
    pub fn set_pending_requests(&self, count: usize) {
        self.pending_requests.store(count, Ordering::Relaxed);
    }

    /// Increment frames sent counter.
    pub fn increment_frames_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment frames received counter.
    pub fn increment_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment decode anomaly counter.
    pub fn increment_anomalies(&self) {
        self.frame_anomalies.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether both channels are up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.request_up.load(Ordering::Relaxed) && self.push_up.load(Ordering::Relaxed)
    }

    /// Current values.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let request_up = self.request_up.load(Ordering::Relaxed);
        let push_up = self.push_up.load(Ordering::Relaxed);

        StatusSnapshot {
            request_up,
            push_up,
            connected: request_up && push_up,
            last_connected_at: *self.last_connected_at.read(),
            pending_requests: self.pending_requests.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frame_anomalies: self.frame_anomalies.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
        }
    }
}
