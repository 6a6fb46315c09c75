//! HTTP Observability Server
//!
//! 提供Prometheus metrics和健康检查端点
//!
//! ## 端点
//! - `GET /metrics` - Prometheus格式的指标
//! - `GET /health` - 健康检查（含结算队列概况）
//! - `GET /health/ready` - 就绪检查
//! - `GET /health/live` - 存活检查
//!
//! ## 使用示例
//! ```rust,ignore
//! let server = ObservabilityServer::new(9090, probe);
//! server.run(shutdown).await?;
//! ```

use super::health::{HealthChecker, HealthProbe, HealthStatus};
use crate::shared::metrics::METRICS;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
struct AppState {
    checker: Arc<HealthChecker>,
    probe: Arc<dyn HealthProbe>,
}

/// 可观测性服务器
pub struct ObservabilityServer {
    addr: SocketAddr,
    state: AppState,
}

impl ObservabilityServer {
    pub fn new(port: u16, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            state: AppState {
                checker: Arc::new(HealthChecker::default()),
                probe,
            },
        }
    }

    pub fn health_checker(&self) -> Arc<HealthChecker> {
        self.state.checker.clone()
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/health/live", get(liveness_handler))
            .with_state(self.state.clone())
    }

    /// Serves until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let app = self.router();

        info!(addr = %self.addr, "observability server listening");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}

async fn metrics_handler() -> Response {
    (StatusCode::OK, METRICS.export()).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let details = state.probe.details().await;
    state.checker.update_from(&details);
    let response = state.checker.check_health_detailed(details);

    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response)).into_response()
}

/// 就绪检查端点（Kubernetes readiness probe）
async fn readiness_handler(State(state): State<AppState>) -> Response {
    state.checker.update_from(&state.probe.details().await);
    if state.checker.check_readiness() {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn liveness_handler(State(state): State<AppState>) -> Response {
    if state.checker.check_liveness() {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::observability::health::HealthDetails;
    use async_trait::async_trait;

    struct FixedProbe(HealthDetails);

    #[async_trait]
    impl HealthProbe for FixedProbe {
        async fn details(&self) -> HealthDetails {
            self.0.clone()
        }
    }

    fn state(queues: usize, consuming: usize) -> AppState {
        AppState {
            checker: Arc::new(HealthChecker::new("1.0.0")),
            probe: Arc::new(FixedProbe(HealthDetails {
                settlement_queues: queues,
                consuming_queues: consuming,
                ..HealthDetails::default()
            })),
        }
    }

    #[test]
    fn test_server_binds_requested_port() {
        let server = ObservabilityServer::new(9090, state(1, 1).probe);
        assert_eq!(server.addr.port(), 9090);
    }

    #[tokio::test]
    async fn test_metrics_handler_exports_text() {
        METRICS.transfers_total.with_label_values(&["success"]).inc();
        let response = metrics_handler().await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("transfers_total"));
    }

    #[tokio::test]
    async fn test_health_reflects_queue_state() {
        let response = health_handler(State(state(2, 2))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = health_handler(State(state(2, 0))).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readiness_requires_every_queue() {
        assert_eq!(readiness_handler(State(state(3, 3))).await.status(), StatusCode::OK);
        assert_eq!(
            readiness_handler(State(state(3, 2))).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(liveness_handler(State(state(3, 0))).await.status(), StatusCode::OK);
    }
}
