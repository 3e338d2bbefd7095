//! 模拟数据模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 计算状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl AccrualStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Invalid | Self::Processed)
    }
}

/// 订单计算结果，即 `GET /api/orders/{number}` 的响应体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualRecord {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub accrual: Option<Decimal>,
}

impl AccrualRecord {
    pub fn registered(order: impl Into<String>) -> Self {
        Self {
            order: order.into(),
            status: AccrualStatus::Registered,
            accrual: None,
        }
    }
}

/// 登记订单请求，status 缺省为 REGISTERED
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterOrderRequest {
    pub order: String,
    #[serde(default)]
    pub status: Option<AccrualStatus>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub accrual: Option<Decimal>,
}
