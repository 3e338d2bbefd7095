//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::timeout::TimeoutLayer;

use loyalty_shared::observability::middleware as obs_middleware;

use crate::{handlers, middleware::auth_middleware, state::AppState};

/// 公开路由：注册与登录
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::user::register))
        .route("/login", post(handlers::user::login))
}

/// 需要登录的路由
fn account_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/orders",
            post(handlers::orders::upload_order).get(handlers::orders::list_orders),
        )
        .route("/balance", get(handlers::balance::get_balance))
        .route("/balance/withdraw", post(handlers::balance::withdraw))
        .route("/withdrawals", get(handlers::balance::list_withdrawals))
        .route(
            "/balance/withdrawals",
            get(handlers::balance::list_withdrawals),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// `/api/user` 下的全部路由
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(auth_routes())
        .merge(account_routes(state))
}

/// 完整的应用路由，含探针与通用中间件
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/api/user", api_routes(state.clone()))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}

/// 存活探针
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "loyalty-service"
    }))
}

/// 就绪探针：检查存储是否可用
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = state.store.health_check().await.is_ok();
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "service": "loyalty-service",
            "checks": {
                "database": if db_ok { "ok" } else { "fail" }
            }
        })),
    )
}
