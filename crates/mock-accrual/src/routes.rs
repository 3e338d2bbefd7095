//! Mock 计算服务 REST 接口
//!
//! - `GET /api/orders/{number}`：200 结果 / 204 未登记 / 429 限流
//! - `POST /api/orders`：登记订单，202 / 400 / 409

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::{debug, info, warn};

use crate::models::RegisterOrderRequest;
use crate::rate_limit::RateLimiter;
use crate::store::{AccrualStore, StoreError};

/// 运行参数
#[derive(Debug, Clone, Default)]
pub struct MockAccrualConfig {
    /// 查询未知订单时自动登记，并在每次查询时推进状态
    pub auto_register: bool,
    /// 每分钟最多查询次数，0 表示不限
    pub max_requests_per_minute: u32,
}

/// 服务状态
#[derive(Clone)]
pub struct MockAccrualState {
    pub store: AccrualStore,
    limiter: Arc<RateLimiter>,
    auto_register: bool,
}

impl MockAccrualState {
    pub fn new(config: MockAccrualConfig) -> Self {
        Self {
            store: AccrualStore::new(),
            limiter: Arc::new(RateLimiter::new(config.max_requests_per_minute)),
            auto_register: config.auto_register,
        }
    }
}

/// 构建路由
pub fn router(state: MockAccrualState) -> Router {
    Router::new()
        .route("/api/orders/{number}", get(get_order))
        .route("/api/orders", post(register_order))
        .with_state(state)
}

/// GET /api/orders/{number}
async fn get_order(State(state): State<MockAccrualState>, Path(number): Path<String>) -> Response {
    if let Err(retry_after) = state.limiter.check() {
        warn!(order = %number, "请求过多，返回 429");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.as_secs().to_string())],
            format!(
                "No more than {} requests per minute allowed",
                state.limiter.limit()
            ),
        )
            .into_response();
    }

    match state.store.poll(&number, state.auto_register) {
        Some(record) => {
            debug!(order = %number, status = ?record.status, "返回计算结果");
            Json(record).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// POST /api/orders
async fn register_order(
    State(state): State<MockAccrualState>,
    payload: Result<Json<RegisterOrderRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(req) => req,
        Err(e) => return (StatusCode::BAD_REQUEST, e.body_text()).into_response(),
    };

    match state.store.register(req) {
        Ok(record) => {
            info!(order = %record.order, status = ?record.status, "订单已登记");
            (StatusCode::ACCEPTED, Json(record)).into_response()
        }
        Err(e @ StoreError::InvalidOrder(_)) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e @ StoreError::AlreadyRegistered(_)) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
    }
}
