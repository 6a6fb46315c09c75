/// Settlement service assembly
///
/// 启动顺序：
/// 1. 每个钱包一个 TxQueue（清空 → 开始消费）
/// 2. 结算池作为 MatchesSink
/// 3. 按交易对创建订单簿，启动订单队列消费
///
/// 关闭顺序相反：先停止入站消费，再等待各结算队列完成当前结算。

use super::config::AppConfig;
use crate::application::{
    DispatchEngine, EventPublisher, PairRegistry, PendingQueue, QueueState, SettlementPool,
    Settler, StopOrderCascade, TxQueue,
};
use std::time::Duration;
use crate::domain::stop_orders::StopOrderStore;
use crate::infrastructure::broker::{Broker, BrokerError};
use crate::infrastructure::chain::TokenTransfer;
use crate::infrastructure::observability::{HealthDetails, HealthProbe};
use crate::shared::metrics::METRICS;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] super::config::ConfigError),

    #[error("broker unavailable: {0}")]
    Broker(#[from] BrokerError),

    #[error("signal handling failed: {0}")]
    Signal(#[source] std::io::Error),

    #[error("observability server failed: {0}")]
    Observability(#[source] std::io::Error),
}

/// External collaborators the service runs against
pub struct Adapters {
    pub broker: Arc<dyn Broker>,
    pub chain: Arc<dyn TokenTransfer>,
    pub stops: Arc<dyn StopOrderStore>,
}

/// 关闭时等待结算队列清空的上限
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SettlementService {
    pool: Arc<SettlementPool<TxQueue>>,
    /// 入站消费的取消信号
    shutdown: CancellationToken,
    /// 结算队列单独取消，必须晚于入站
    settlement: CancellationToken,
    dispatch: Mutex<Option<JoinHandle<Result<(), BrokerError>>>>,
}

impl SettlementService {
    pub async fn start(
        config: &AppConfig,
        adapters: Adapters,
        threshold: usize,
    ) -> Result<Self, ServiceError> {
        let Adapters { broker, chain, stops } = adapters;
        let shutdown = CancellationToken::new();
        let settlement = CancellationToken::new();

        broker.declare(&config.orders_queue).await?;
        broker.declare(&config.outcomes_queue).await?;

        let publisher = EventPublisher::new(
            broker.clone(),
            config.orders_queue.clone(),
            config.outcomes_queue.clone(),
        );
        let pairs = Arc::new(PairRegistry::new(config.pairs.iter().cloned()));
        let settler = Arc::new(Settler::new(
            chain,
            pairs.clone(),
            publisher.clone(),
            StopOrderCascade::new(stops.clone(), publisher.clone()),
            config.settlement_mode,
        ));

        let mut queues = Vec::with_capacity(config.wallets.len());
        for (index, wallet) in config.wallets.iter().enumerate() {
            queues.push(
                TxQueue::start(index, wallet.clone(), broker.clone(), settler.clone(), &settlement)
                    .await?,
            );
        }

        let pool = Arc::new(SettlementPool::new(queues, threshold, publisher.clone()));
        let engine = Arc::new(DispatchEngine::from_pairs(&pairs, stops, pool.clone()));

        let dispatch = {
            let broker = broker.clone();
            let queue = config.orders_queue.clone();
            let cancel = shutdown.child_token();
            tokio::spawn(async move { engine.run(broker, &queue, cancel).await })
        };

        info!(
            wallets = config.wallets.len(),
            pairs = pairs.len(),
            threshold,
            mode = ?config.settlement_mode,
            "settlement service started"
        );

        Ok(Self {
            pool,
            shutdown,
            settlement,
            dispatch: Mutex::new(Some(dispatch)),
        })
    }

    pub fn pool(&self) -> &Arc<SettlementPool<TxQueue>> {
        &self.pool
    }

    /// Cancelled once `shutdown` begins
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn probe(&self) -> Arc<dyn HealthProbe> {
        Arc::new(PoolProbe {
            pool: self.pool.clone(),
        })
    }

    /// Stops ingest, then lets every settlement queue work off what was queued
    ///
    /// 入站消费者完全退出后才开始清空结算队列；超过 `DRAIN_TIMEOUT` 则放弃剩余消息。
    pub async fn shutdown(&self) {
        info!("settlement service shutting down");
        self.shutdown.cancel();

        let dispatch = self.dispatch.lock().take();
        if let Some(handle) = dispatch {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(error = %err, "dispatch engine stopped with error"),
                Err(err) => error!(error = %err, "dispatch engine panicked"),
            }
        }

        self.pool.drain(DRAIN_TIMEOUT).await;
        self.settlement.cancel();
        self.pool.shutdown().await;
        info!("settlement service stopped");
    }
}

/// 从结算池读取健康概况
struct PoolProbe {
    pool: Arc<SettlementPool<TxQueue>>,
}

#[async_trait]
impl HealthProbe for PoolProbe {
    async fn details(&self) -> HealthDetails {
        let queues = self.pool.queues();
        let mut pending = 0;
        for queue in queues {
            pending += queue.length().await.unwrap_or(0);
        }

        HealthDetails {
            settlement_queues: queues.len(),
            consuming_queues: queues
                .iter()
                .filter(|q| q.state() == QueueState::Consuming)
                .count(),
            pending_settlements: pending,
            transfers_succeeded: METRICS.transfers_total.with_label_values(&["success"]).get() as u64,
            transfers_failed: METRICS.transfers_total.with_label_values(&["failed"]).get() as u64,
        }
    }
}
