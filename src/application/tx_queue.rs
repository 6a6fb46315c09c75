/// Per-wallet transaction queue
///
/// 每个运营钱包对应一个结算队列与一个消费任务：
/// 启动时清空队列（Purging），随后注册唯一消费者（Consuming），
/// 按 FIFO 顺序逐条执行结算，执行完成后才 ack。

use super::operator::{OperatorError, PendingQueue, SettlementPool};
use super::settlement::Settler;
use crate::domain::entities::{Address, Matches, Wallet};
use crate::infrastructure::broker::{Broker, BrokerError, Consumer};
use crate::shared::metrics::METRICS;
use crate::shared::protocol::{OperatorMessage, OperatorMessageType, TX_QUEUE_PREFIX};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Initializing,
    Purging,
    Consuming,
    Stopped,
}

/// `TX_QUEUES:<index>0x<address hex>`
pub fn queue_name(index: usize, address: &Address) -> String {
    format!("{}{}0x{}", TX_QUEUE_PREFIX, index, hex::encode(address.as_bytes()))
}

pub struct TxQueue {
    name: String,
    wallet: Wallet,
    broker: Arc<dyn Broker>,
    state: RwLock<QueueState>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TxQueue {
    /// Purges the wallet's queue and starts its single consumer
    ///
    /// `shutdown` is a parent token; cancelling it stops this queue as well.
    pub async fn start(
        index: usize,
        wallet: Wallet,
        broker: Arc<dyn Broker>,
        settler: Arc<Settler>,
        shutdown: &CancellationToken,
    ) -> Result<Arc<Self>, BrokerError> {
        let name = queue_name(index, &wallet.address);
        let queue = Arc::new(Self {
            name,
            wallet,
            broker,
            state: RwLock::new(QueueState::Initializing),
            cancel: shutdown.child_token(),
            worker: Mutex::new(None),
        });

        queue.broker.declare(&queue.name).await?;

        queue.set_state(QueueState::Purging);
        // 上次运行遗留的成交不再结算
        let purged = queue.broker.purge(&queue.name).await?;
        if purged > 0 {
            warn!(queue = %queue.name, purged, "dropped stale settlement messages");
        }

        let consumer = queue.broker.consume(&queue.name).await?;
        queue.set_state(QueueState::Consuming);

        let handle = tokio::spawn(Arc::clone(&queue).consume_loop(consumer, settler));
        *queue.worker.lock() = Some(handle);

        info!(queue = %queue.name, wallet = ?queue.wallet.address, "settlement queue consuming");
        Ok(queue)
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn state(&self) -> QueueState {
        *self.state.read()
    }

    fn set_state(&self, state: QueueState) {
        *self.state.write() = state;
    }

    /// Stops the consumer after the settlement in progress, if any, completes
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(queue = %self.name, error = %err, "settlement worker panicked");
            }
        }
        self.set_state(QueueState::Stopped);
    }

    async fn consume_loop(self: Arc<Self>, mut consumer: Box<dyn Consumer>, settler: Arc<Settler>) {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                delivery = consumer.next() => match delivery {
                    Some(delivery) => delivery,
                    None => {
                        warn!(queue = %self.name, "broker closed settlement queue");
                        break;
                    }
                },
            };

            self.process(&settler, &delivery.payload).await;

            if let Err(err) = consumer.ack(delivery.tag).await {
                error!(queue = %self.name, tag = delivery.tag, error = %err, "ack failed");
            }
        }

        self.set_state(QueueState::Stopped);
        debug!(queue = %self.name, "settlement worker exited");
    }

    async fn process(&self, settler: &Settler, payload: &[u8]) {
        let message = match OperatorMessage::from_slice(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(queue = %self.name, error = %err, "undecodable settlement message, skipping");
                return;
            }
        };

        if message.message_type != OperatorMessageType::NewTrade {
            warn!(
                queue = %self.name,
                message_type = message.message_type.as_str(),
                "unexpected message on settlement queue, skipping"
            );
            return;
        }

        let _timer = METRICS
            .settlement_duration
            .with_label_values(&[self.name.as_str()])
            .start_timer();
        if let Some(result) = settler.settle(&self.wallet, &message.matches).await {
            debug!(
                queue = %self.name,
                attempted = result.transfers_attempted,
                failed = result.transfers_failed,
                skipped = result.transfers_skipped,
                "matches settled"
            );
        }
    }
}

#[async_trait]
impl PendingQueue for TxQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn length(&self) -> Result<usize, OperatorError> {
        Ok(self.broker.depth(&self.name).await?)
    }

    async fn enqueue(&self, matches: &Matches) -> Result<(), OperatorError> {
        let payload = OperatorMessage::new(OperatorMessageType::NewTrade, matches.clone()).to_vec()?;
        self.broker.publish(&self.name, payload).await?;
        Ok(())
    }
}

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl SettlementPool<TxQueue> {
    /// Waits until no consuming queue has ready messages, or `timeout` elapses
    ///
    /// 只统计仍在消费的队列；已停止的队列不会再变短。
    /// 返回 `false` 表示超时，剩余消息留在队列中。
    pub async fn drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let mut pending = 0;
                for queue in self.queues() {
                    if queue.state() == QueueState::Consuming {
                        pending += queue.length().await.unwrap_or(0);
                    }
                }
                if pending == 0 {
                    return;
                }
                debug!(pending, "draining settlement queues");
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!(?timeout, "settlement queues not drained before shutdown");
        }
        drained
    }

    /// Stops every queue's consumer, waiting for in-flight settlements
    pub async fn shutdown(&self) {
        join_all(self.queues().iter().map(|queue| queue.shutdown())).await;
    }
}
