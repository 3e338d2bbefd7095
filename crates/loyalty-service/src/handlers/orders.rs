//! 订单处理器

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::auth::AuthenticatedUser;
use crate::dto::OrderResponse;
use crate::error::{LoyaltyError, Result};
use crate::service::SubmitOutcome;
use crate::state::AppState;

/// 上传订单号，请求体为纯文本
///
/// POST /api/user/orders
pub async fn upload_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<Response> {
    let raw = std::str::from_utf8(&body)
        .map_err(|_| LoyaltyError::InvalidOrderNumber("请求体不是有效的 UTF-8".to_string()))?;

    let response = match state.orders.submit(user.id, raw).await? {
        SubmitOutcome::Accepted(order) => {
            (StatusCode::ACCEPTED, Json(OrderResponse::from(order))).into_response()
        }
        SubmitOutcome::AlreadyUploaded(order) => {
            (StatusCode::OK, Json(OrderResponse::from(order))).into_response()
        }
    };
    Ok(response)
}

/// 当前用户的订单，按上传时间升序，没有订单时返回 204
///
/// GET /api/user/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Response> {
    let orders = state.orders.list(user.id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(Json(body).into_response())
}
