/// Operator - settlement queue selection
///
/// Every matched trade is routed to exactly one per-wallet settlement queue.
/// Each wallet signs with its own nonce sequence, so a queue is never shared
/// or rebalanced once work is on it; only the choice of queue for a *new*
/// Matches is balanced.
///
/// ## Selection
/// 1. Take the pool-wide lock (selection + enqueue is one critical section)
/// 2. Linear scan of queue lengths, first minimum wins
/// 3. Shortest length above the backpressure threshold → `QueueFull`
/// 4. Otherwise enqueue onto the chosen queue
///
/// The pool is generic over `PendingQueue` so the selection logic can be
/// driven by test doubles as well as broker-backed `TxQueue`s.

use super::publisher::EventPublisher;
use crate::domain::entities::Matches;
use crate::infrastructure::broker::BrokerError;
use crate::shared::metrics::METRICS;
use crate::shared::protocol::OperatorMessageType;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// 背压阈值：最短队列超过该长度时拒绝新成交
pub const DEFAULT_BACKPRESSURE_THRESHOLD: usize = 10;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("settlement tier saturated: shortest of {queues} queues has {shortest} pending (limit {threshold})")]
    QueueFull {
        queues: usize,
        shortest: usize,
        threshold: usize,
    },

    #[error("settlement pool has no queues")]
    NoQueues,

    #[error("failed to encode matches: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// A settlement queue as seen by the operator
#[async_trait]
pub trait PendingQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Pending entries, read from the backing queue
    async fn length(&self) -> Result<usize, OperatorError>;

    async fn enqueue(&self, matches: &Matches) -> Result<(), OperatorError>;
}

/// Where the dispatch engine hands matches for settlement
#[async_trait]
pub trait MatchesSink: Send + Sync {
    async fn submit(&self, matches: Matches);
}

pub struct SettlementPool<Q> {
    queues: Vec<Arc<Q>>,
    lock: Mutex<()>,
    threshold: usize,
    publisher: EventPublisher,
}

impl<Q: PendingQueue> SettlementPool<Q> {
    pub fn new(queues: Vec<Arc<Q>>, threshold: usize, publisher: EventPublisher) -> Self {
        Self {
            queues,
            lock: Mutex::new(()),
            threshold,
            publisher,
        }
    }

    pub fn queues(&self) -> &[Arc<Q>] {
        &self.queues
    }

    /// Current length of every queue, in pool order
    pub async fn lengths(&self) -> Result<Vec<usize>, OperatorError> {
        let mut lengths = Vec::with_capacity(self.queues.len());
        for queue in &self.queues {
            lengths.push(queue.length().await?);
        }
        Ok(lengths)
    }

    /// Enqueues `matches` on the least-loaded queue, returning its index
    pub async fn queue_trade(&self, matches: &Matches) -> Result<usize, OperatorError> {
        let _guard = self.lock.lock().await;

        let (index, shortest) = self.shortest_queue().await?;
        if shortest > self.threshold {
            METRICS.queue_full_total.with_label_values(&["backpressure"]).inc();
            return Err(OperatorError::QueueFull {
                queues: self.queues.len(),
                shortest,
                threshold: self.threshold,
            });
        }

        let queue = &self.queues[index];
        queue.enqueue(matches).await?;

        METRICS
            .matches_queued_total
            .with_label_values(&[queue.name()])
            .inc();
        debug!(queue = queue.name(), pending = shortest + 1, "matches queued");
        Ok(index)
    }

    // 调用方必须持有 self.lock
    async fn shortest_queue(&self) -> Result<(usize, usize), OperatorError> {
        let mut best: Option<(usize, usize)> = None;
        for (index, queue) in self.queues.iter().enumerate() {
            let length = queue.length().await?;
            METRICS
                .queue_depth
                .with_label_values(&[queue.name()])
                .set(length as f64);
            // 严格小于：长度相同时保留先遍历到的队列
            if best.map_or(true, |(_, shortest)| length < shortest) {
                best = Some((index, length));
            }
        }
        best.ok_or(OperatorError::NoQueues)
    }
}

#[async_trait]
impl<Q: PendingQueue + 'static> MatchesSink for SettlementPool<Q> {
    async fn submit(&self, matches: Matches) {
        let err = match self.queue_trade(&matches).await {
            Ok(_) => return,
            Err(err) => err,
        };

        match &err {
            OperatorError::QueueFull { .. } => warn!(error = %err, "matches rejected"),
            _ => error!(error = %err, "failed to queue matches"),
        }

        if let Err(publish_err) = self
            .publisher
            .publish_outcome(OperatorMessageType::ServerError, &matches, Some(err.to_string()))
            .await
        {
            error!(error = %publish_err, "failed to publish server error outcome");
        }
    }
}
