// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The retry scheduler (component C): a min-heap of actions keyed by
//! absolute wake time, served by one background task. On expiry, an action
//! is published back through `fired` "as if a fresh push had just
//! happened" (spec.md §4.C) — the bus reads `fired` and redelivers the
//! notification to the single agent the action names.
//!
//! Cancellation is coarse: dropping the scheduler or cancelling its
//! `CancellationToken` stops the background task and abandons every
//! still-pending entry.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One (agent, descriptor) tuple due for re-notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAction {
    pub agent_id: String,
    pub from: String,
    pub domain: String,
    pub selector: String,
    pub request_id: u64,
}

struct Entry {
    at: Instant,
    seq: u64,
    action: RetryAction,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

pub struct RetryScheduler {
    heap: Mutex<BinaryHeap<Reverse<Entry>>>,
    seq: AtomicU64,
    wake: std::sync::Arc<tokio::sync::Notify>,
    fired_tx: mpsc::UnboundedSender<RetryAction>,
}

impl RetryScheduler {
    /// Spawn the background timer task and return the scheduler plus the
    /// receiver end of fired actions.
    pub fn spawn(shutdown: CancellationToken) -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<RetryAction>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = std::sync::Arc::new(Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            wake: std::sync::Arc::new(tokio::sync::Notify::new()),
            fired_tx,
        });

        let background = std::sync::Arc::clone(&scheduler);
        tokio::spawn(async move {
            background.run(shutdown).await;
        });

        (scheduler, fired_rx)
    }

    /// Schedule `action` to fire after `wait`.
    pub fn schedule(&self, action: RetryAction, wait: Duration) {
        let at = Instant::now() + wait;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let should_wake = {
            let mut heap = self.heap.lock();
            let wake_now = match heap.peek() {
                Some(Reverse(top)) => at < top.at,
                None => true,
            };
            heap.push(Reverse(Entry { at, seq, action }));
            wake_now
        };
        if should_wake {
            self.wake.notify_one();
        }
    }

    async fn run(&self, shutdown: CancellationToken) {
        loop {
            let next_deadline = { self.heap.lock().peek().map(|Reverse(e)| e.at) };

            let sleep = match next_deadline {
                Some(at) => tokio::time::sleep_until(at),
                // No pending work: sleep "forever" until woken by `schedule`
                // or cancelled by shutdown.
                None => tokio::time::sleep(Duration::from_secs(60 * 60 * 24)),
            };

            tokio::select! {
                _ = sleep => {}
                _ = self.wake.notified() => { continue; }
                _ = shutdown.cancelled() => {
                    debug!("retry scheduler shutting down, abandoning pending entries");
                    return;
                }
            }

            let due = {
                let mut heap = self.heap.lock();
                let mut due = Vec::new();
                let now = Instant::now();
                while let Some(Reverse(entry)) = heap.peek() {
                    if entry.at > now {
                        break;
                    }
                    let Some(Reverse(entry)) = heap.pop() else { break };
                    due.push(entry.action);
                }
                due
            };

            for action in due {
                if self.fired_tx.send(action).is_err() {
                    return; // receiver dropped, nothing left to do
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
