//! Health Check
//!
//! 结算服务的健康状态，供负载均衡器和监控系统探测
//!
//! ## 端点
//! - `/health` - 状态 + 结算队列概况
//! - `/health/ready` - 就绪检查（所有结算队列都在消费）
//! - `/health/live` - 存活检查
//!
//! ## 响应格式
//! ```json
//! {
//!   "status": "healthy",
//!   "uptime_seconds": 3600,
//!   "version": "0.1.0",
//!   "timestamp": 1234567890,
//!   "details": { "settlement_queues": 4, "consuming_queues": 4, ... }
//! }
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 所有结算队列正常消费
    Healthy,
    /// 部分结算队列已停止
    Degraded,
    /// 启动中或正在关闭
    Unhealthy,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

/// 结算层概况
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthDetails {
    pub settlement_queues: usize,
    pub consuming_queues: usize,
    /// 所有结算队列中待处理的成交数
    pub pending_settlements: usize,
    pub transfers_succeeded: u64,
    pub transfers_failed: u64,
}

/// Source of `HealthDetails`, implemented by the running service
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn details(&self) -> HealthDetails;
}

/// 健康检查器
pub struct HealthChecker {
    start_time: SystemTime,
    status: Arc<RwLock<HealthStatus>>,
    version: String,
}

impl HealthChecker {
    /// 新建时为 Unhealthy，结算队列启动后由服务置为 Healthy
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            start_time: SystemTime::now(),
            status: Arc::new(RwLock::new(HealthStatus::Unhealthy)),
            version: version.into(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time
            .elapsed()
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn set_status(&self, status: HealthStatus) {
        *self.status.write() = status;
    }

    pub fn get_status(&self) -> HealthStatus {
        *self.status.read()
    }

    /// Derives the status from queue counts and stores it
    pub fn update_from(&self, details: &HealthDetails) -> HealthStatus {
        let status = if details.settlement_queues == 0 || details.consuming_queues == 0 {
            HealthStatus::Unhealthy
        } else if details.consuming_queues < details.settlement_queues {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        self.set_status(status);
        status
    }

    pub fn check_health(&self) -> HealthResponse {
        HealthResponse {
            status: self.get_status(),
            uptime_seconds: self.uptime_seconds(),
            version: self.version.clone(),
            timestamp: Self::current_timestamp(),
            details: None,
        }
    }

    pub fn check_health_detailed(&self, details: HealthDetails) -> HealthResponse {
        HealthResponse {
            details: Some(details),
            ..self.check_health()
        }
    }

    /// 存活检查：进程能响应即视为存活
    pub fn check_liveness(&self) -> bool {
        true
    }

    /// 就绪检查：只有 Healthy 才接受流量
    pub fn check_readiness(&self) -> bool {
        matches!(self.get_status(), HealthStatus::Healthy)
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}
