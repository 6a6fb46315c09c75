/// CLI Interface Module
///
/// Command-line entry point of the settlement service.
///
/// ## Responsibilities
/// - Parse command-line arguments and load the JSON configuration
/// - Initialize logging
/// - Assemble and start the settlement service on the in-process adapters
/// - Serve metrics and health checks
/// - Handle graceful shutdown on Ctrl-C

use super::config::AppConfig;
use super::service::{Adapters, ServiceError, SettlementService};
use crate::application::{SettlementMode, DEFAULT_BACKPRESSURE_THRESHOLD};
use crate::infrastructure::broker::MemoryBroker;
use crate::infrastructure::chain::InMemoryLedger;
use crate::infrastructure::observability::ObservabilityServer;
use crate::infrastructure::persistence::MemoryStopOrderStore;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// 结算服务命令行配置
#[derive(Parser, Debug, Clone)]
#[command(name = "dex-settlement")]
#[command(version)]
#[command(about = "DEX 成交结算服务", long_about = None)]
pub struct CliConfig {
    /// 配置文件（JSON）
    #[arg(short, long)]
    pub config: PathBuf,

    /// 日志级别
    #[arg(short = 'l', long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// 最短结算队列超过该长度时拒绝新成交
    #[arg(short = 't', long, default_value_t = DEFAULT_BACKPRESSURE_THRESHOLD)]
    pub backpressure_threshold: usize,

    /// 第一笔转账失败即终止该次结算
    #[arg(long, default_value_t = false)]
    pub strict_settlement: bool,

    /// Prometheus / 健康检查端口，不指定则不启动
    #[arg(short = 'm', long)]
    pub metrics_port: Option<u16>,

    /// 仅校验配置不启动服务
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl CliConfig {
    /// Loads the config file and applies command-line overrides
    pub fn load_app_config(&self) -> Result<AppConfig, ServiceError> {
        let mut config = AppConfig::load(&self.config)?;
        if self.strict_settlement {
            config.settlement_mode = SettlementMode::AbortOnFirstFailure;
        }
        Ok(config)
    }
}

/// Runs the CLI application
pub async fn run() -> Result<(), ServiceError> {
    let cli = CliConfig::parse();

    init_logging(&cli.log_level);

    let config = cli.load_app_config()?;
    info!(
        config = %cli.config.display(),
        wallets = config.wallets.len(),
        pairs = config.pairs.len(),
        orders_queue = %config.orders_queue,
        outcomes_queue = %config.outcomes_queue,
        mode = ?config.settlement_mode,
        threshold = cli.backpressure_threshold,
        "configuration loaded"
    );

    if cli.dry_run {
        info!("dry-run: configuration is valid, not starting");
        return Ok(());
    }

    let ledger = Arc::new(InMemoryLedger::new());
    for seed in &config.balances {
        ledger.credit(seed.token, seed.owner, seed.amount);
    }

    let adapters = Adapters {
        broker: Arc::new(MemoryBroker::new()),
        chain: ledger,
        stops: Arc::new(MemoryStopOrderStore::new()),
    };
    let service = SettlementService::start(&config, adapters, cli.backpressure_threshold).await?;

    let observability = cli.metrics_port.map(|port| {
        let server = ObservabilityServer::new(port, service.probe());
        let shutdown = service.shutdown_token();
        tokio::spawn(server.run(shutdown))
    });

    let signal = tokio::signal::ctrl_c().await.map_err(ServiceError::Signal);
    if signal.is_ok() {
        info!("received Ctrl-C");
    }

    service.shutdown().await;

    if let Some(handle) = observability {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(ServiceError::Observability(err)),
            Err(err) => error!(error = %err, "observability server panicked"),
        }
    }

    signal
}

/// 初始化日志系统
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    // 测试中可能重复初始化
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
