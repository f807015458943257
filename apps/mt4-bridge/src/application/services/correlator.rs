//! Request Correlator
//!
//! Bookkeeping for in-flight requests. Owned by the connection actor; holds
//! no timers of its own, only the abort handles of the timer tasks the actor
//! spawned for each entry.
//!
//! ```text
//!  allocate ──► queued ──(queue delay)──► pending ──► reply / timeout
//!                  │                         │
//!                  └── link down ──► reject  └── shutdown ──► reject
//! ```

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::domain::protocol::{Payload, RequestArg};
use crate::error::RequestError;
use crate::infrastructure::metrics;

/// Outcome delivered to a waiting caller.
pub type RequestOutcome = Result<Payload, RequestError>;

/// Reply continuation of one request.
pub type Reply = oneshot::Sender<RequestOutcome>;

/// A request whose id is allocated but whose frame has not been sent yet.
#[derive(Debug)]
struct QueuedRequest {
    args: Vec<RequestArg>,
    reply: Reply,
    delay: AbortHandle,
}

/// A sent request awaiting its reply.
#[derive(Debug)]
struct PendingRequest {
    reply: Reply,
    timeout: AbortHandle,
    issued_at: Instant,
}

/// Correlation id allocation and the queued/pending tables.
#[derive(Debug)]
pub struct Correlator {
    next_id: u64,
    queued: HashMap<u64, QueuedRequest>,
    pending: HashMap<u64, PendingRequest>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// Empty correlator; the first id handed out is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            queued: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Allocate the next correlation id.
    pub const fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Park a request until its queue delay elapses.
    pub fn enqueue(&mut self, id: u64, args: Vec<RequestArg>, reply: Reply, delay: AbortHandle) {
        self.queued.insert(id, QueuedRequest { args, reply, delay });
    }

    /// Remove a queued request whose delay has elapsed.
    ///
    /// Returns `None` if the request was rejected while queued.
    pub fn take_queued(&mut self, id: u64) -> Option<(Vec<RequestArg>, Reply)> {
        self.queued
            .remove(&id)
            .map(|queued| (queued.args, queued.reply))
    }

    /// Track a sent request until its reply or timeout.
    pub fn register(&mut self, id: u64, reply: Reply, timeout: AbortHandle) {
        self.pending.insert(
            id,
            PendingRequest {
                reply,
                timeout,
                issued_at: Instant::now(),
            },
        );
    }

    /// Resolve or reject a pending request and cancel its timer.
    ///
    /// Returns the time the request spent pending, or `None` when no request
    /// with this id is pending (already completed, expired or never sent).
    pub fn complete(&mut self, id: u64, outcome: RequestOutcome) -> Option<Duration> {
        let pending = self.pending.remove(&id)?;
        pending.timeout.abort();

        if pending.reply.send(outcome).is_err() {
            tracing::debug!(correlation_id = id, "Caller dropped before reply arrived");
        }
        Some(pending.issued_at.elapsed())
    }

    /// Reject a pending request whose timer fired.
    ///
    /// Returns `false` if the request completed before the timer was handled.
    pub fn expire(&mut self, id: u64, timeout: Duration) -> bool {
        let Some(pending) = self.pending.remove(&id) else {
            return false;
        };

        let _ = pending.reply.send(Err(RequestError::Timeout { id, timeout }));
        true
    }

    /// Reject every queued request; pending ones are left to their timers.
    ///
    /// Each rejection is counted under the error's outcome label.
    pub fn drain_queued(&mut self, err: &RequestError) -> usize {
        let count = self.queued.len();
        for (id, queued) in self.queued.drain() {
            queued.delay.abort();
            let _ = queued.reply.send(Err(err.clone()));
            metrics::record_request(err.outcome());
            tracing::debug!(correlation_id = id, error = %err, "Rejected queued request");
        }
        count
    }

    /// Reject every queued and pending request.
    pub fn drain_all(&mut self, err: &RequestError) -> usize {
        let mut count = self.drain_queued(err);
        for (id, pending) in self.pending.drain() {
            pending.timeout.abort();
            let _ = pending.reply.send(Err(err.clone()));
            metrics::record_request(err.outcome());
            tracing::debug!(correlation_id = id, error = %err, "Rejected pending request");
            count += 1;
        }
        count
    }

    /// Number of sent requests awaiting a reply.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of requests waiting out their queue delay.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Whether a reply for `id` is still awaited.
    #[must_use]
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::json;

    fn idle_timer() -> AbortHandle {
        tokio::spawn(std::future::pending::<()>()).abort_handle()
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut correlator = Correlator::new();
        let ids: Vec<u64> = (0..5).map(|_| correlator.allocate()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn complete_resolves_waiter_and_removes_entry() {
        let mut correlator = Correlator::new();
        let (tx, rx) = oneshot::channel();
        let id = correlator.allocate();
        correlator.register(id, tx, idle_timer());

        let payload = Payload::Structured(json!({"bid": 1.1}));
        assert!(correlator.complete(id, Ok(payload.clone())).is_some());
        assert_eq!(rx.await.unwrap(), Ok(payload));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn complete_aborts_timeout_timer() {
        let mut correlator = Correlator::new();
        let (tx, _rx) = oneshot::channel();
        let timer = tokio::spawn(std::future::pending::<()>());
        correlator.register(1, tx, timer.abort_handle());

        correlator.complete(1, Ok(Payload::Ack));
        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn unknown_id_is_ignored() {
        let mut correlator = Correlator::new();
        let (tx, rx) = oneshot::channel();
        correlator.register(1, tx, idle_timer());
        let mut waiter = tokio_test::task::spawn(rx);

        assert_eq!(correlator.complete(99, Ok(Payload::Ack)), None);
        assert!(correlator.is_pending(1));
        tokio_test::assert_pending!(waiter.poll());

        correlator.complete(1, Ok(Payload::Ack));
        assert!(waiter.is_woken());
        let outcome = tokio_test::assert_ready_ok!(waiter.poll());
        assert_eq!(outcome, Ok(Payload::Ack));
    }

    #[tokio::test]
    async fn late_reply_after_expiry_is_dropped() {
        let mut correlator = Correlator::new();
        let (tx, rx) = oneshot::channel();
        correlator.register(1, tx, idle_timer());

        assert!(correlator.expire(1, Duration::from_millis(50)));
        assert_eq!(
            rx.await.unwrap(),
            Err(RequestError::Timeout {
                id: 1,
                timeout: Duration::from_millis(50)
            })
        );
        assert_eq!(correlator.complete(1, Ok(Payload::Ack)), None);
        assert!(!correlator.expire(1, Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn drain_queued_leaves_pending_alone() {
        let mut correlator = Correlator::new();
        let (queued_tx, queued_rx) = oneshot::channel();
        let (pending_tx, _pending_rx) = oneshot::channel();

        correlator.enqueue(1, vec![31_i64.into()], queued_tx, idle_timer());
        correlator.register(2, pending_tx, idle_timer());

        let err = RequestError::ChannelClosed(crate::domain::link::ChannelKind::Push);
        assert_eq!(correlator.drain_queued(&err), 1);
        assert_eq!(queued_rx.await.unwrap(), Err(err));
        assert_eq!(correlator.queued_len(), 0);
        assert!(correlator.is_pending(2));
        assert!(correlator.take_queued(1).is_none());
    }

    #[tokio::test]
    async fn drain_all_rejects_everything() {
        let mut correlator = Correlator::new();
        let (queued_tx, queued_rx) = oneshot::channel();
        let (pending_tx, pending_rx) = oneshot::channel();

        correlator.enqueue(1, Vec::new(), queued_tx, idle_timer());
        correlator.register(2, pending_tx, idle_timer());

        assert_eq!(correlator.drain_all(&RequestError::Shutdown), 2);
        assert_eq!(queued_rx.await.unwrap(), Err(RequestError::Shutdown));
        assert_eq!(pending_rx.await.unwrap(), Err(RequestError::Shutdown));
    }

    #[tokio::test]
    async fn drained_requests_are_counted_by_outcome() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let mut correlator = Correlator::new();
        let (queued_tx, _queued_rx) = oneshot::channel();
        let (pending_tx, _pending_rx) = oneshot::channel();
        let (later_tx, _later_rx) = oneshot::channel();
        correlator.enqueue(1, Vec::new(), queued_tx, idle_timer());
        correlator.register(2, pending_tx, idle_timer());

        let link_down = RequestError::ChannelClosed(crate::domain::link::ChannelKind::Request);
        ::metrics::with_local_recorder(&recorder, || {
            assert_eq!(correlator.drain_queued(&link_down), 1);
            correlator.enqueue(3, Vec::new(), later_tx, idle_timer());
            assert_eq!(correlator.drain_all(&RequestError::Shutdown), 2);
        });

        let rendered = handle.render();
        let line = |outcome: &str| {
            rendered
                .lines()
                .find(|line| {
                    line.starts_with("mt4_bridge_requests_total")
                        && line.contains(&format!("outcome=\"{outcome}\""))
                })
                .map(str::to_owned)
        };
        assert!(line(link_down.outcome()).unwrap().ends_with(" 1"));
        assert!(line(RequestError::Shutdown.outcome()).unwrap().ends_with(" 2"));
    }
}
