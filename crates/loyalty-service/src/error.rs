//! 积分服务错误类型
//!
//! 覆盖校验、冲突、余额不足、资源不存在、存储与上游六类错误，
//! 并统一映射为 HTTP 响应。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

/// 积分服务错误类型
#[derive(Debug, Error)]
pub enum LoyaltyError {
    // ==================== 校验错误 ====================
    /// 请求体格式错误（400）
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error("订单号格式错误: {0}")]
    InvalidOrderNumber(String),

    #[error("金额无效: {0}")]
    InvalidAmount(String),

    /// 请求体无法处理（422）
    #[error("请求无法处理: {0}")]
    UnprocessableRequest(String),

    // ==================== 认证错误 ====================
    #[error("未授权: {0}")]
    Unauthorized(String),

    #[error("用户名或密码错误")]
    InvalidCredentials,

    // ==================== 冲突错误 ====================
    #[error("登录名已被占用: {0}")]
    LoginTaken(String),

    #[error("订单 {0} 已由其他用户上传")]
    OrderOwnedByAnotherUser(String),

    #[error("订单已存在: {0}")]
    OrderAlreadyExists(String),

    #[error("订单 {0} 已用于提现")]
    WithdrawalExists(String),

    // ==================== 业务错误 ====================
    #[error("余额不足: 需要 {required}, 可用 {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: &'static str, id: String },

    // ==================== 存储错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("存储操作超时: {operation}")]
    Timeout { operation: &'static str },

    // ==================== 上游错误 ====================
    #[error("积分计算服务错误: {0}")]
    Upstream(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, LoyaltyError>;

impl LoyaltyError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidOrderNumber(_) | Self::InvalidAmount(_) | Self::UnprocessableRequest(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Unauthorized(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::LoginTaken(_)
            | Self::OrderOwnedByAnotherUser(_)
            | Self::OrderAlreadyExists(_)
            | Self::WithdrawalExists(_) => StatusCode::CONFLICT,
            Self::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Timeout { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// 获取错误码（API 契约的一部分）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidOrderNumber(_) => "INVALID_ORDER_NUMBER",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::UnprocessableRequest(_) => "UNPROCESSABLE_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::LoginTaken(_) => "LOGIN_TAKEN",
            Self::OrderOwnedByAnotherUser(_) => "ORDER_OWNED_BY_ANOTHER_USER",
            Self::OrderAlreadyExists(_) => "ORDER_ALREADY_EXISTS",
            Self::WithdrawalExists(_) => "WITHDRAWAL_EXISTS",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Timeout { .. } => "STORAGE_TIMEOUT",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Timeout { .. } | Self::Upstream(_)
        )
    }

    /// 是否为业务结果（而非系统故障），业务结果只记 warn 不记 error
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Timeout { .. } | Self::Upstream(_) | Self::Internal(_)
        )
    }
}

impl IntoResponse for LoyaltyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Timeout { operation } => {
                tracing::error!(operation, "存储操作超时");
                "服务繁忙，请稍后重试".to_string()
            }
            Self::Upstream(e) => {
                tracing::error!(error = %e, "上游服务失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for LoyaltyError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<bcrypt::BcryptError> for LoyaltyError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::Internal(format!("密码处理失败: {}", err))
    }
}

impl From<tokio::task::JoinError> for LoyaltyError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("后台任务失败: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(LoyaltyError, StatusCode, &'static str)> {
        vec![
            (LoyaltyError::Validation("login is required".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (LoyaltyError::InvalidOrderNumber("12345".into()), StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ORDER_NUMBER"),
            (LoyaltyError::InvalidAmount("-1".into()), StatusCode::UNPROCESSABLE_ENTITY, "INVALID_AMOUNT"),
            (LoyaltyError::UnprocessableRequest("EOF".into()), StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE_REQUEST"),
            (LoyaltyError::Unauthorized("missing token".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (LoyaltyError::InvalidCredentials, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            (LoyaltyError::LoginTaken("alice".into()), StatusCode::CONFLICT, "LOGIN_TAKEN"),
            (LoyaltyError::OrderOwnedByAnotherUser("79927398713".into()), StatusCode::CONFLICT, "ORDER_OWNED_BY_ANOTHER_USER"),
            (LoyaltyError::OrderAlreadyExists("79927398713".into()), StatusCode::CONFLICT, "ORDER_ALREADY_EXISTS"),
            (LoyaltyError::WithdrawalExists("2377225624".into()), StatusCode::CONFLICT, "WITHDRAWAL_EXISTS"),
            (
                LoyaltyError::InsufficientFunds { required: Decimal::from(100), available: Decimal::ZERO },
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_FUNDS",
            ),
            (LoyaltyError::NotFound { entity: "balance", id: "7".into() }, StatusCode::NOT_FOUND, "NOT_FOUND"),
            (LoyaltyError::Database(sqlx::Error::PoolTimedOut), StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            (LoyaltyError::Timeout { operation: "withdraw" }, StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_TIMEOUT"),
            (LoyaltyError::Upstream("connection reset".into()), StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            (LoyaltyError::Internal("unexpected state".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ]
    }

    #[test]
    fn test_all_variants_status_code() {
        for (error, expected_status, label) in all_error_variants() {
            assert_eq!(error.status_code(), expected_status, "状态码不匹配: variant={label}");
        }
    }

    #[test]
    fn test_all_variants_error_code() {
        for (error, _status, expected_code) in all_error_variants() {
            assert_eq!(error.error_code(), expected_code);
        }
    }

    #[test]
    fn test_retryable_and_business_classification() {
        assert!(LoyaltyError::Timeout { operation: "x" }.is_retryable());
        assert!(LoyaltyError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!LoyaltyError::InvalidCredentials.is_retryable());

        assert!(
            LoyaltyError::InsufficientFunds { required: Decimal::ONE, available: Decimal::ZERO }
                .is_business_error()
        );
        assert!(!LoyaltyError::Internal("boom".into()).is_business_error());
    }

    #[tokio::test]
    async fn test_into_response_body_structure() {
        for (error, expected_status, expected_code) in all_error_variants() {
            let label = format!("{:?}", error);
            let response = error.into_response();
            assert_eq!(response.status(), expected_status, "响应状态码不匹配: {label}");

            let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("读取响应体失败");
            let body: serde_json::Value =
                serde_json::from_slice(&body_bytes).expect("响应体不是合法 JSON");

            assert_eq!(body["success"], json!(false), "{label}");
            assert_eq!(body["code"], json!(expected_code), "{label}");
            assert!(!body["message"].as_str().unwrap_or("").is_empty(), "{label}");
            assert!(body["data"].is_null(), "{label}");
        }
    }

    #[tokio::test]
    async fn test_system_errors_hide_internal_details() {
        let system_errors: Vec<(LoyaltyError, &str)> = vec![
            (LoyaltyError::Upstream("http://10.0.0.5:8081 refused".into()), "10.0.0.5"),
            (LoyaltyError::Internal("stack overflow at module X".into()), "stack overflow"),
        ];

        for (error, secret) in system_errors {
            let response = error.into_response();
            let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body = String::from_utf8(body_bytes.to_vec()).unwrap();
            assert!(!body.contains(secret), "响应泄露了内部细节: {body}");
        }
    }
}
