//! 订单模型
//!
//! 订单号在数据库中以 BIGINT 存储，对外（JSON、URL）始终以十进制字符串表示。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::UserId;
use crate::error::LoyaltyError;
use crate::luhn;

/// 已通过 Luhn 校验的订单号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct OrderNumber(i64);

impl OrderNumber {
    /// 校验并构造订单号
    pub fn new(value: u64) -> Result<Self, LoyaltyError> {
        if !luhn::is_valid(value) {
            return Err(LoyaltyError::InvalidOrderNumber(value.to_string()));
        }
        let value = i64::try_from(value)
            .map_err(|_| LoyaltyError::InvalidOrderNumber(value.to_string()))?;
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl FromStr for OrderNumber {
    type Err = LoyaltyError;

    /// 允许首尾空白；只接受十进制数字
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LoyaltyError::InvalidOrderNumber(trimmed.to_string()));
        }
        let value = trimmed
            .parse::<u64>()
            .map_err(|_| LoyaltyError::InvalidOrderNumber(trimmed.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for OrderNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OrderNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => OrderNumber::new(n).map_err(serde::de::Error::custom),
        }
    }
}

/// 订单状态
///
/// NEW 由本服务写入，其余状态来自积分计算服务。
/// INVALID 与 PROCESSED 为终态，之后不再变化。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 已上传，尚未被计算服务处理
    #[default]
    #[serde(alias = "new")]
    New,
    /// 计算服务已登记
    #[serde(alias = "registered")]
    Registered,
    /// 计算中
    #[serde(alias = "processing")]
    Processing,
    /// 计算服务拒绝计算
    #[serde(alias = "invalid")]
    Invalid,
    /// 计算完成
    #[serde(alias = "processed")]
    Processed,
}

impl OrderStatus {
    /// 仍需向计算服务查询的状态
    pub const PENDING: [OrderStatus; 3] = [Self::New, Self::Registered, Self::Processing];

    pub fn is_pending(&self) -> bool {
        Self::PENDING.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Registered => "REGISTERED",
            Self::Processing => "PROCESSING",
            Self::Invalid => "INVALID",
            Self::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 订单
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub number: OrderNumber,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// 计算前为 0
    pub accrual: Decimal,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    /// 新上传的订单
    pub fn new(number: OrderNumber, user_id: UserId, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            number,
            user_id,
            status: OrderStatus::New,
            accrual: Decimal::ZERO,
            uploaded_at,
        }
    }
}
