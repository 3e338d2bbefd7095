//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出，并在独立端口暴露 `/metrics`
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "order_submissions_total",
        "Order number submissions by outcome"
    );
    metrics::describe_counter!("withdrawals_total", "Withdrawal requests by outcome");
    metrics::describe_counter!(
        "accrual_ticks_total",
        "Accrual reconciliation ticks by outcome"
    );
    metrics::describe_histogram!(
        "accrual_tick_duration_seconds",
        "Accrual reconciliation tick duration in seconds"
    );
    metrics::describe_counter!(
        "accrual_applied_total",
        "Accrual results applied to orders, by resulting status"
    );
    metrics::describe_counter!(
        "accrual_upstream_responses_total",
        "Responses received from the accrual calculator, by kind"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录订单提交结果（accepted / duplicate / conflict / invalid / error）
#[inline]
pub fn record_order_submission(outcome: &'static str) {
    metrics::counter!("order_submissions_total", "outcome" => outcome).increment(1);
}

/// 记录提现结果（success / insufficient_funds / rejected / error）
#[inline]
pub fn record_withdrawal(outcome: &'static str) {
    metrics::counter!("withdrawals_total", "outcome" => outcome).increment(1);
}

/// 记录一次对账轮询
#[inline]
pub fn record_accrual_tick(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("accrual_ticks_total", "outcome" => outcome).increment(1);
    metrics::histogram!("accrual_tick_duration_seconds", "outcome" => outcome)
        .record(duration_secs);
}

/// 记录一次积分结果落库
#[inline]
pub fn record_accrual_applied(status: &str) {
    metrics::counter!("accrual_applied_total", "status" => status.to_string()).increment(1);
}

/// 记录计算服务响应类型（ok / rate_limited / server_error / malformed / other / transport）
#[inline]
pub fn record_upstream_response(kind: &'static str) {
    metrics::counter!("accrual_upstream_responses_total", "kind" => kind).increment(1);
}
