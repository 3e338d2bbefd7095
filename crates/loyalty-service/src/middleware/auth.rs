//! JWT 认证中间件
//!
//! 依次尝试 `Authorization: Bearer` 与 `jwt` Cookie，验证通过后将
//! [`AuthenticatedUser`] 注入请求扩展。

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, Cookie, HeaderMapExt, authorization::Bearer};

use crate::error::LoyaltyError;
use crate::state::AppState;

/// 会话 Cookie 名称
pub const JWT_COOKIE: &str = "jwt";

/// 认证中间件，只挂载在受保护路由上
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(&request) else {
        return LoyaltyError::Unauthorized("缺少认证 Token".to_string()).into_response();
    };

    match state.jwt_manager.verify_token(&token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Bearer 优先，其次 Cookie
fn extract_token(request: &Request<Body>) -> Option<String> {
    let headers = request.headers();

    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }

    headers
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(JWT_COOKIE).map(str::to_string))
}
