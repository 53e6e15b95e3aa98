//! Ordered queue of pending persistence writes.
//!
//! Store mutations are applied in memory immediately and queue a [`PersistOp`]
//! here. The host drains the queue whenever it likes; failed ops stay queued
//! and are retried with exponential backoff so the host can show an "unsaved"
//! indicator instead of trusting in-memory state as durable.

use super::{InkRepository, RepositoryError, RepositoryResult, TranslateAttempt, TranslateStrokes};
use crate::stroke::{Stroke, StrokeId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Backoff settings for failed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound for the doubled delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay after `attempts` consecutive failures (`attempts >= 1`).
    pub fn delay_ms(&self, attempts: u32) -> u64 {
        let shift = attempts.saturating_sub(1).min(31);
        self.base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms)
    }
}

/// One repository write.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    Upsert(Stroke),
    BulkUpsert(Vec<Stroke>),
    Delete(Vec<StrokeId>),
    TranslateAttempt(TranslateAttempt),
    TranslateStrokes(TranslateStrokes),
}

impl PersistOp {
    /// Issue this op against `repo`.
    pub async fn send(&self, repo: &dyn InkRepository) -> RepositoryResult<()> {
        match self {
            PersistOp::Upsert(stroke) => repo.upsert(stroke).await,
            PersistOp::BulkUpsert(strokes) => repo.bulk_upsert(strokes).await,
            PersistOp::Delete(ids) => repo.delete_by_ids(ids).await,
            PersistOp::TranslateAttempt(request) => repo.translate_attempt(*request).await,
            PersistOp::TranslateStrokes(request) => repo.translate_strokes(request.clone()).await,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PersistOp::Upsert(_) => "upsert",
            PersistOp::BulkUpsert(_) => "bulk-upsert",
            PersistOp::Delete(_) => "delete",
            PersistOp::TranslateAttempt(_) => "translate-attempt",
            PersistOp::TranslateStrokes(_) => "translate-strokes",
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedOp {
    op: PersistOp,
    attempts: u32,
}

/// Ops taken out of the outbox for sending.
///
/// Holding a batch does not borrow the outbox, so the store stays usable
/// while the writes are in flight.
#[derive(Debug)]
pub struct OutboxBatch {
    generation: u64,
    ops: Vec<QueuedOp>,
}

impl OutboxBatch {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Send ops in order, stopping at the first failure.
    pub async fn send(self, repo: &dyn InkRepository) -> FlushOutcome {
        let mut sent = 0;
        let mut ops = self.ops.into_iter();
        while let Some(queued) = ops.next() {
            match queued.op.send(repo).await {
                Ok(()) => sent += 1,
                Err(error) => {
                    let mut unsent = vec![queued];
                    unsent.extend(ops);
                    return FlushOutcome {
                        generation: self.generation,
                        sent,
                        unsent,
                        error: Some(error),
                    };
                }
            }
        }
        FlushOutcome {
            generation: self.generation,
            sent,
            unsent: Vec::new(),
            error: None,
        }
    }
}

/// Result of sending a batch, to be handed back to [`PersistOutbox::settle`].
#[derive(Debug)]
pub struct FlushOutcome {
    generation: u64,
    /// Ops that were written.
    pub sent: usize,
    unsent: Vec<QueuedOp>,
    /// The error that stopped the batch, if any.
    pub error: Option<RepositoryError>,
}

impl FlushOutcome {
    pub fn is_complete(&self) -> bool {
        self.unsent.is_empty()
    }
}

/// FIFO of pending writes with retry bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct PersistOutbox {
    queue: VecDeque<QueuedOp>,
    policy: RetryPolicy,
    next_retry_at_ms: Option<u64>,
    generation: u64,
    in_flight: usize,
}

impl PersistOutbox {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn push(&mut self, op: PersistOp) {
        log::trace!("outbox: queue {}", op.label());
        self.queue.push_back(QueuedOp { op, attempts: 0 });
    }

    /// Queued ops not yet handed out.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether anything is queued or in flight.
    pub fn has_unsaved(&self) -> bool {
        !self.queue.is_empty() || self.in_flight > 0
    }

    /// Consecutive failures of the op at the head of the queue.
    pub fn failed_attempts(&self) -> u32 {
        self.queue.front().map(|q| q.attempts).unwrap_or(0)
    }

    /// When the next retry may run, if a failure is pending.
    pub fn next_retry_at_ms(&self) -> Option<u64> {
        self.next_retry_at_ms
    }

    /// Inspect queued ops in order.
    pub fn pending(&self) -> impl Iterator<Item = &PersistOp> {
        self.queue.iter().map(|q| &q.op)
    }

    /// Hand out every queued op, unless a backoff is still running.
    pub fn take_ready(&mut self, now_ms: u64) -> Option<OutboxBatch> {
        if self.queue.is_empty() || self.in_flight > 0 {
            return None;
        }
        if self.next_retry_at_ms.is_some_and(|at| now_ms < at) {
            return None;
        }
        let ops: Vec<QueuedOp> = self.queue.drain(..).collect();
        self.in_flight = ops.len();
        Some(OutboxBatch {
            generation: self.generation,
            ops,
        })
    }

    /// Fold a finished batch back in. Unsent ops go back to the head of the
    /// queue, ahead of anything queued while the batch was in flight.
    pub fn settle(&mut self, outcome: FlushOutcome, now_ms: u64) {
        if outcome.generation != self.generation {
            if !outcome.unsent.is_empty() {
                log::warn!(
                    "outbox: dropping {} unsent op(s) from a previous ink context",
                    outcome.unsent.len()
                );
            }
            return;
        }
        self.in_flight = 0;

        let mut unsent = outcome.unsent;
        if unsent.is_empty() {
            self.next_retry_at_ms = None;
            return;
        }

        unsent[0].attempts += 1;
        let attempts = unsent[0].attempts;
        let delay = self.policy.delay_ms(attempts);
        self.next_retry_at_ms = Some(now_ms.saturating_add(delay));
        if let Some(error) = &outcome.error {
            log::warn!(
                "outbox: {} failed (attempt {}), retrying in {} ms: {}",
                unsent[0].op.label(),
                attempts,
                delay,
                error
            );
        }
        for queued in unsent.into_iter().rev() {
            self.queue.push_front(queued);
        }
    }

    /// Take, send and settle in one step.
    pub async fn flush(&mut self, repo: &dyn InkRepository, now_ms: u64) -> Option<FlushOutcomeSummary> {
        let batch = self.take_ready(now_ms)?;
        let outcome = batch.send(repo).await;
        let summary = FlushOutcomeSummary {
            sent: outcome.sent,
            failed: !outcome.is_complete(),
        };
        self.settle(outcome, now_ms);
        Some(summary)
    }

    /// Abandon everything queued or in flight, e.g. on context change.
    /// Returns how many queued ops were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.queue.len();
        if dropped > 0 {
            log::warn!("outbox: abandoning {} unsaved op(s) on context change", dropped);
        }
        self.queue.clear();
        self.next_retry_at_ms = None;
        self.in_flight = 0;
        self.generation += 1;
        dropped
    }
}

/// What [`PersistOutbox::flush`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcomeSummary {
    pub sent: usize,
    pub failed: bool,
}
