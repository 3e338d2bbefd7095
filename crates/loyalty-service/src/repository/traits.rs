//! 存储 Trait 定义
//!
//! 服务层与对账任务只依赖 [`AccountStore`]，便于替换实现与 mock 测试。
//! 每个方法都是独立的原子操作。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{Balance, Order, OrderNumber, OrderStatus, UserId, Withdrawal};

/// `apply_accrual` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccrualApplied {
    /// 订单已更新（必要时余额已入账）
    Applied { user_id: UserId },
    /// 订单已是终态，本次结果被忽略
    AlreadySettled,
    /// 订单不存在
    NotFound,
}

/// 账户存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    // ==================== 用户 ====================

    /// 创建用户及其零余额。登录名已存在时返回 `LoginTaken`
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId>;

    async fn find_user_by_login(&self, login: &str) -> Result<Option<UserId>>;

    /// 登录名不存在时返回 false
    async fn verify_password(&self, login: &str, candidate: &str) -> Result<bool>;

    // ==================== 订单 ====================

    /// 订单号已存在时返回 `OrderAlreadyExists`
    async fn insert_order(
        &self,
        number: OrderNumber,
        user_id: UserId,
        status: OrderStatus,
        uploaded_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_order(&self, number: OrderNumber) -> Result<Option<Order>>;

    /// 按上传时间升序
    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// 状态为 NEW / REGISTERED / PROCESSING 的订单，按上传时间升序
    async fn list_orders_pending_accrual(&self) -> Result<Vec<OrderNumber>>;

    /// 单事务内更新订单状态与积分，积分大于 0 时给订单所有者入账
    async fn apply_accrual(
        &self,
        number: OrderNumber,
        status: OrderStatus,
        amount: Decimal,
    ) -> Result<AccrualApplied>;

    // ==================== 余额与提现 ====================

    async fn get_balance(&self, user_id: UserId) -> Result<Balance>;

    /// 按处理时间升序
    async fn list_withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>>;

    /// 单事务内校验余额、扣减并写入提现记录。余额不足时返回 `InsufficientFunds`
    async fn withdraw(
        &self,
        number: OrderNumber,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Withdrawal>;

    /// 存储健康检查
    async fn health_check(&self) -> Result<()>;
}
