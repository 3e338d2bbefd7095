//! 积分余额模型
//!
//! 不变式：`current = accrued - withdrawn`，且 current 永不为负。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::UserId;

/// 用户积分余额
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Balance {
    pub user_id: UserId,
    /// 当前可用
    pub current: Decimal,
    /// 累计获得
    pub accrued: Decimal,
    /// 累计提现
    pub withdrawn: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// 注册时创建的零余额
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            current: Decimal::ZERO,
            accrued: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
            updated_at: now,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.current >= Decimal::ZERO && self.current == self.accrued - self.withdrawn
    }
}
