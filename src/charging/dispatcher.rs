//! OCPP Codec & Dispatcher (spec.md §4.1; SPEC_FULL.md §3.5) — outbound Call
//! correlation by `uniqueId` and per-connection malformed-frame rate
//! tracking, grounded on the teacher's `CommandSender` pending-call table.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::shared::errors::{DomainError, DomainResult};
use crate::shared::ocpp_frame::OcppFrame;

#[derive(Debug, Clone)]
pub struct OcppCallError {
    pub code: String,
    pub description: String,
}

type PendingResult = Result<Value, OcppCallError>;

/// Tracks outbound Calls awaiting a CallResult/CallError, keyed by uniqueId.
pub struct PendingCalls {
    table: DashMap<String, oneshot::Sender<PendingResult>>,
    counter: AtomicU64,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            table: DashMap::new(),
            counter: AtomicU64::new(1),
        }
    }

    pub fn next_unique_id(&self) -> String {
        format!("c-{}", self.counter.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register(&self, unique_id: String) -> oneshot::Receiver<PendingResult> {
        let (tx, rx) = oneshot::channel();
        self.table.insert(unique_id, tx);
        rx
    }

    pub fn resolve_result(&self, unique_id: &str, payload: Value) {
        match self.table.remove(unique_id) {
            Some((_, tx)) => {
                let _ = tx.send(Ok(payload));
            }
            None => debug!(unique_id, "late CallResult discarded, no pending Call"),
        }
    }

    pub fn resolve_error(&self, unique_id: &str, error: OcppCallError) {
        match self.table.remove(unique_id) {
            Some((_, tx)) => {
                let _ = tx.send(Err(error));
            }
            None => debug!(unique_id, "late CallError discarded, no pending Call"),
        }
    }

    pub fn cancel(&self, unique_id: &str) {
        self.table.remove(unique_id);
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

/// ≥3 malformed frames within a 10s rolling window closes the connection
/// (spec.md §4.1).
#[derive(Default)]
pub struct MalformedFrameTracker {
    timestamps: Mutex<VecDeque<Instant>>,
}

impl MalformedFrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a malformed frame; returns `true` if the connection should be
    /// closed.
    pub fn record(&self) -> bool {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().unwrap();
        timestamps.push_back(now);
        while let Some(front) = timestamps.front() {
            if now.duration_since(*front) > Duration::from_secs(10) {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        timestamps.len() >= 3
    }
}

/// A station's write half plus its pending-call table — the handle the
/// Session Handler (and anything issuing outbound Calls through it) uses to
/// implement the `call(action, payload, timeout)` contract.
pub struct StationConnection {
    write_tx: mpsc::Sender<Message>,
    pending: PendingCalls,
    call_timeout: Duration,
}

impl StationConnection {
    pub fn new(write_tx: mpsc::Sender<Message>, call_timeout: Duration) -> Self {
        Self {
            write_tx,
            pending: PendingCalls::new(),
            call_timeout,
        }
    }

    /// Outbound Call contract (spec.md §4.1): on timeout the pending entry
    /// is dropped and a late result is discarded, not delivered.
    pub async fn call(&self, action: &str, payload: Value) -> DomainResult<Value> {
        let unique_id = self.pending.next_unique_id();
        let rx = self.pending.register(unique_id.clone());
        let frame = OcppFrame::Call {
            unique_id: unique_id.clone(),
            action: action.to_owned(),
            payload,
        };
        self.write_tx
            .send(Message::Text(frame.serialize()))
            .await
            .map_err(|_| DomainError::StationUnavailable("write channel closed".into()))?;

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(DomainError::StationUnavailable(format!(
                "{}: {}",
                e.code, e.description
            ))),
            Ok(Err(_)) => Err(DomainError::Internal("call result channel dropped".into())),
            Err(_) => {
                self.pending.cancel(&unique_id);
                Err(DomainError::Timeout)
            }
        }
    }

    /// Routes an inbound CallResult/CallError to its waiter.
    pub fn on_call_result(&self, unique_id: &str, payload: Value) {
        self.pending.resolve_result(unique_id, payload);
    }

    pub fn on_call_error(&self, unique_id: &str, code: String, description: String) {
        self.pending.resolve_error(unique_id, OcppCallError { code, description });
    }

    pub async fn send_frame(&self, frame: OcppFrame) -> DomainResult<()> {
        self.write_tx
            .send(Message::Text(frame.serialize()))
            .await
            .map_err(|_| DomainError::StationUnavailable("write channel closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_frame_tracker_closes_at_the_third_frame_within_the_window() {
        let tracker = MalformedFrameTracker::new();
        assert!(!tracker.record());
        assert!(!tracker.record());
        assert!(tracker.record(), "third malformed frame within 10s closes the connection");
    }

    #[tokio::test]
    async fn call_resolves_with_the_matching_call_result() {
        let (write_tx, mut write_rx) = mpsc::channel(8);
        let connection = StationConnection::new(write_tx, Duration::from_secs(5));

        let connection = std::sync::Arc::new(connection);
        let responder = connection.clone();
        let call = tokio::spawn(async move { responder.call("Reset", json!({"type": "Soft"})).await });

        let Message::Text(sent) = write_rx.recv().await.unwrap() else {
            panic!("expected a text frame");
        };
        let frame = OcppFrame::parse(&sent).unwrap();
        let OcppFrame::Call { unique_id, .. } = frame else {
            panic!("expected a Call frame");
        };
        connection.on_call_result(&unique_id, json!({"status": "Accepted"}));

        let result = call.await.unwrap().unwrap();
        assert_eq!(result["status"], "Accepted");
    }

    #[tokio::test]
    async fn call_times_out_and_discards_a_late_result() {
        let (write_tx, mut write_rx) = mpsc::channel(8);
        let connection = StationConnection::new(write_tx, Duration::from_millis(20));

        let err = connection.call("Reset", json!({"type": "Soft"})).await.unwrap_err();
        assert_eq!(err, DomainError::Timeout);

        let Message::Text(sent) = write_rx.recv().await.unwrap() else {
            panic!("expected a text frame");
        };
        let OcppFrame::Call { unique_id, .. } = OcppFrame::parse(&sent).unwrap() else {
            panic!("expected a Call frame");
        };
        // A late result for an already-timed-out call must not panic and is
        // simply discarded (no pending waiter left in the table).
        connection.on_call_result(&unique_id, json!({"status": "Accepted"}));
    }
}
