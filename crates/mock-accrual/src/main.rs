//! Mock Accrual CLI
//!
//! 启动模拟积分计算服务。
//!
//! ```bash
//! mock-accrual --port 8081 --auto-register --max-requests-per-minute 60
//! ```

use std::net::SocketAddr;

use clap::Parser;
use mock_accrual::{MockAccrualConfig, MockAccrualState, routes};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "mock-accrual", about = "Accrual calculator simulator")]
struct Cli {
    /// 监听端口
    #[arg(short, long, default_value_t = 8081, env = "MOCK_ACCRUAL_PORT")]
    port: u16,

    /// 查询未知订单时自动登记并逐步推进状态
    #[arg(long)]
    auto_register: bool,

    /// 每分钟最多查询次数，0 表示不限
    #[arg(long, default_value_t = 0)]
    max_requests_per_minute: u32,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 优先使用环境变量 RUST_LOG，否则使用命令行参数指定的级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .init();

    let state = MockAccrualState::new(MockAccrualConfig {
        auto_register: cli.auto_register,
        max_requests_per_minute: cli.max_requests_per_minute,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = TcpListener::bind(addr).await?;
    info!(
        auto_register = cli.auto_register,
        max_requests_per_minute = cli.max_requests_per_minute,
        "Mock accrual listening on {}",
        addr
    );

    axum::serve(listener, routes::router(state)).await?;

    Ok(())
}
