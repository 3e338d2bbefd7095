//! 积分计算服务客户端
//!
//! `GET {address}/api/orders/{number}` 的响应按状态码归类为 [`AccrualResponse`]，
//! 由对账任务决定中止、冷却还是跳过。只有网络层失败才返回 `Err`。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use loyalty_shared::observability::{metrics, tracing::inject_to_headers};

use crate::error::{LoyaltyError, Result};
use crate::models::{OrderNumber, OrderStatus};

/// 计算服务返回的订单结果
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccrualReport {
    pub order: String,
    pub status: OrderStatus,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub accrual: Option<Decimal>,
}

impl AccrualReport {
    /// 实际入账金额：仅 PROCESSED 时取上报值，保留两位小数
    pub fn settled_amount(&self) -> Decimal {
        match (self.status, self.accrual) {
            (OrderStatus::Processed, Some(amount)) if amount > Decimal::ZERO => amount.round_dp(2),
            _ => Decimal::ZERO,
        }
    }
}

/// 一次查询的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualResponse {
    /// 200
    Ready(AccrualReport),
    /// 429，`Retry-After` 可能缺失
    RateLimited { retry_after: Option<Duration> },
    /// 500
    InternalError,
    /// 其他状态码，如 204 订单未登记
    Unexpected(u16),
    /// 200 但响应体无法解析
    Malformed(String),
}

/// 积分计算服务接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualClient: Send + Sync {
    async fn fetch(&self, number: OrderNumber) -> Result<AccrualResponse>;
}

/// 基于 reqwest 的实现
pub struct HttpAccrualClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccrualClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoyaltyError::Internal(format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn order_url(&self, number: OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    async fn fetch(&self, number: OrderNumber) -> Result<AccrualResponse> {
        let url = self.order_url(number);

        let resp = self
            .client
            .get(&url)
            .headers(trace_headers())
            .send()
            .await
            .map_err(|e| {
                metrics::record_upstream_response("transport");
                LoyaltyError::Upstream(format!("请求 {url} 失败: {e}"))
            })?;

        let status = resp.status();
        debug!(order = %number, status = status.as_u16(), "计算服务响应");

        let response = match status {
            StatusCode::OK => {
                let body = resp.bytes().await.map_err(|e| {
                    metrics::record_upstream_response("transport");
                    LoyaltyError::Upstream(format!("读取 {url} 响应失败: {e}"))
                })?;
                parse_report(&body, number)
            }
            StatusCode::TOO_MANY_REQUESTS => AccrualResponse::RateLimited {
                retry_after: parse_retry_after(resp.headers()),
            },
            StatusCode::INTERNAL_SERVER_ERROR => AccrualResponse::InternalError,
            other => AccrualResponse::Unexpected(other.as_u16()),
        };

        metrics::record_upstream_response(response_kind(&response));
        Ok(response)
    }
}

fn parse_report(body: &[u8], number: OrderNumber) -> AccrualResponse {
    match serde_json::from_slice::<AccrualReport>(body) {
        Ok(report) if report.order.trim() == number.to_string() => AccrualResponse::Ready(report),
        Ok(report) => AccrualResponse::Malformed(format!(
            "响应订单号 {} 与请求 {} 不一致",
            report.order, number
        )),
        Err(e) => AccrualResponse::Malformed(e.to_string()),
    }
}

/// 只支持秒数形式
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn trace_headers() -> HeaderMap {
    let mut carrier = HashMap::new();
    inject_to_headers(&mut carrier);

    let mut headers = HeaderMap::new();
    for (key, value) in carrier {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

fn response_kind(response: &AccrualResponse) -> &'static str {
    match response {
        AccrualResponse::Ready(_) => "ok",
        AccrualResponse::RateLimited { .. } => "rate_limited",
        AccrualResponse::InternalError => "server_error",
        AccrualResponse::Unexpected(_) => "other",
        AccrualResponse::Malformed(_) => "malformed",
    }
}
