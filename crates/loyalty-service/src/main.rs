//! 积分服务入口
//!
//! 启动顺序：配置 -> 可观测性 -> 数据库（带重试）-> 迁移 -> 对账 Worker -> HTTP 服务。

use std::sync::Arc;

use clap::Parser;
use loyalty_service::{
    AppState, MIGRATOR,
    accrual::{AccrualWorker, HttpAccrualClient},
    build_router,
    repository::PgAccountStore,
};
use loyalty_shared::{
    config::{AppConfig, ConfigOverrides},
    database::Database,
    observability,
    retry::RetryPolicy,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// 命令行参数，优先级高于配置文件
#[derive(Debug, Parser)]
#[command(name = "loyalty", about = "Loyalty points service")]
struct Cli {
    /// 监听地址，如 localhost:8080
    #[arg(short = 'a', long, env = "RUN_ADDRESS")]
    run_address: Option<String>,

    /// PostgreSQL 连接串
    #[arg(short = 'd', long, env = "DATABASE_URI")]
    database_uri: Option<String>,

    /// 积分计算服务地址
    #[arg(short = 'r', long, env = "ACCRUAL_SYSTEM_ADDRESS")]
    accrual_address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load("loyalty-service")?;
    config.apply_overrides(ConfigOverrides {
        run_address: cli.run_address,
        database_uri: cli.database_uri,
        accrual_address: cli.accrual_address,
    })?;
    config.validate()?;

    let _guard = observability::init(&config.observability).await?;

    info!("Starting loyalty-service on {}", config.server_addr());
    if config.accrual.address.is_empty() {
        warn!("未配置积分计算服务地址，对账 Worker 不会启动");
    }

    let db = Database::connect_with_retry(&config.database, &RetryPolicy::default()).await?;
    db.run_migrations(&MIGRATOR).await?;

    let store = Arc::new(PgAccountStore::new(
        db.pool().clone(),
        config.database.statement_timeout(),
    ));
    let state = AppState::new(store.clone(), &config.auth);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = if config.accrual.address.is_empty() {
        None
    } else {
        let client = Arc::new(HttpAccrualClient::new(
            config.accrual.address.clone(),
            config.accrual.request_timeout(),
        )?);
        let worker = AccrualWorker::new(
            store,
            client,
            config.accrual.poll_interval(),
            config.accrual.rate_limit_cooldown(),
        );
        Some(tokio::spawn(async move { worker.run(shutdown_rx).await }))
    };

    let app = build_router(
        state,
        std::time::Duration::from_secs(config.server.request_timeout_secs),
    );

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 先停 Worker 再关连接池，避免对账写入中途断开
    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "AccrualWorker 异常退出");
        }
    }
    db.close().await;

    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号：SIGTERM 或 Ctrl+C
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
