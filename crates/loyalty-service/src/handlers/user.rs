//! 注册与登录处理器
//!
//! 成功后令牌同时通过三种方式下发：`Authorization` 响应头、`jwt` Cookie 与 JSON 响应体。

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use validator::Validate;

use crate::dto::{CredentialsRequest, TokenResponse};
use crate::error::{LoyaltyError, Result};
use crate::middleware::JWT_COOKIE;
use crate::service::Session;
use crate::state::AppState;

/// 用户注册
///
/// POST /api/user/register
pub async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response> {
    let req = credentials(payload)?;
    let session = state.users.register(&req.login, &req.password).await?;
    session_response(&session)
}

/// 用户登录
///
/// POST /api/user/login
pub async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response> {
    let req = credentials(payload)?;
    let session = state.users.login(&req.login, &req.password).await?;
    session_response(&session)
}

fn credentials(
    payload: std::result::Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<CredentialsRequest> {
    let Json(req) = payload.map_err(|e| LoyaltyError::Validation(e.body_text()))?;
    req.validate()?;
    Ok(req)
}

fn session_response(session: &Session) -> Result<Response> {
    let token = &session.token;
    let max_age = (token.expires_at - Utc::now()).num_seconds().max(0);

    let bearer = HeaderValue::from_str(&format!("Bearer {}", token.token))
        .map_err(|e| LoyaltyError::Internal(format!("无效的 Token 头: {e}")))?;
    let cookie = HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        JWT_COOKIE, token.token, max_age
    ))
    .map_err(|e| LoyaltyError::Internal(format!("无效的 Cookie: {e}")))?;

    let mut response = Json(TokenResponse::from(token)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::AUTHORIZATION, bearer);
    headers.insert(header::SET_COOKIE, cookie);
    Ok(response)
}
