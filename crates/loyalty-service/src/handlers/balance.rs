//! 余额与提现处理器

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::auth::AuthenticatedUser;
use crate::dto::{BalanceResponse, WithdrawRequest, WithdrawalResponse};
use crate::error::{LoyaltyError, Result};
use crate::state::AppState;

/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<BalanceResponse>> {
    let balance = state.balances.balance(user.id).await?;
    Ok(Json(balance.into()))
}

/// 提现，请求体无法解析时返回 422
///
/// POST /api/user/balance/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: std::result::Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Json<WithdrawalResponse>> {
    let Json(req) = payload.map_err(|e| LoyaltyError::UnprocessableRequest(e.body_text()))?;

    let withdrawal = state
        .balances
        .withdraw(user.id, &req.order, req.sum)
        .await?;
    Ok(Json(withdrawal.into()))
}

/// 提现记录，按处理时间升序，没有记录时返回 204
///
/// GET /api/user/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Response> {
    let withdrawals = state.balances.withdrawals(user.id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<WithdrawalResponse> = withdrawals
        .into_iter()
        .map(WithdrawalResponse::from)
        .collect();
    Ok(Json(body).into_response())
}
