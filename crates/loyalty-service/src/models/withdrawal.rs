//! 提现记录模型

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{OrderNumber, UserId};

/// 提现记录，与余额扣减在同一事务中创建，之后不可变
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Withdrawal {
    /// 结算引用的订单号，全局唯一
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub amount: Decimal,
    pub processed_at: DateTime<Utc>,
}
