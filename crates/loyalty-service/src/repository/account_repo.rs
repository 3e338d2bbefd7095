//! PostgreSQL 账户存储
//!
//! 所有多步写操作都在单个事务内完成；事务对象在任一错误路径上被 drop 即回滚。
//! 每个操作受 `statement_timeout` 约束，超时同样回滚。

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument, warn};

use super::traits::{AccountStore, AccrualApplied};
use crate::auth;
use crate::error::{LoyaltyError, Result};
use crate::models::{Balance, Order, OrderNumber, OrderStatus, User, UserId, Withdrawal};

const USERS_LOGIN_KEY: &str = "users_login_key";
const ORDERS_PKEY: &str = "orders_pkey";
const WITHDRAWALS_PKEY: &str = "withdrawals_pkey";

/// PostgreSQL 账户存储
pub struct PgAccountStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgAccountStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// 为存储操作施加超时，超时后 future 被丢弃，未提交的事务随之回滚
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "存储操作超时"
                );
                Err(LoyaltyError::Timeout { operation })
            }
        }
    }

    // ==================== 事务内操作 ====================

    /// 在事务中锁定并读取余额行
    pub async fn lock_balance_in_tx(conn: &mut PgConnection, user_id: UserId) -> Result<Balance> {
        sqlx::query_as::<_, Balance>(
            r#"
            SELECT user_id, current, accrued, withdrawn, updated_at
            FROM balances
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| LoyaltyError::NotFound {
            entity: "balance",
            id: user_id.to_string(),
        })
    }

    /// 在事务中入账；余额行不存在视为错误，调用方事务随之回滚
    pub async fn credit_in_tx(conn: &mut PgConnection, user_id: UserId, amount: Decimal) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE balances
            SET current = current + $2,
                accrued = accrued + $2,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .execute(conn)
        .await?;

        if result.rows_affected() != 1 {
            return Err(LoyaltyError::NotFound {
                entity: "balance",
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    /// 在事务中扣减余额
    pub async fn debit_in_tx(conn: &mut PgConnection, user_id: UserId, amount: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE balances
            SET current = current - $2,
                withdrawn = withdrawn + $2,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// 在事务中写入提现记录
    pub async fn insert_withdrawal_in_tx(conn: &mut PgConnection, withdrawal: &Withdrawal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO withdrawals (order_number, user_id, amount, processed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(withdrawal.order_number)
        .bind(withdrawal.user_id)
        .bind(withdrawal.amount)
        .bind(withdrawal.processed_at)
        .execute(conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, WITHDRAWALS_PKEY) {
                LoyaltyError::WithdrawalExists(withdrawal.order_number.to_string())
            } else {
                e.into()
            }
        })?;
        Ok(())
    }
}

/// 唯一约束冲突判断；约束名缺失时按冲突处理
fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint().is_none_or(|c| c == constraint)
        }
        _ => false,
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    #[instrument(skip(self, password_hash))]
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId> {
        self.bounded("create_user", async {
            let mut tx = self.pool.begin().await?;

            // 串行化 ID 分配：SHARE ROW EXCLUSIVE 与自身互斥，不阻塞普通读
            sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
                .execute(&mut *tx)
                .await?;

            let user_id: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM users")
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO users (id, login, password_hash, created_at)
                VALUES ($1, $2, $3, NOW())
                "#,
            )
            .bind(user_id)
            .bind(login)
            .bind(password_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, USERS_LOGIN_KEY) {
                    LoyaltyError::LoginTaken(login.to_string())
                } else {
                    e.into()
                }
            })?;

            sqlx::query("INSERT INTO balances (user_id) VALUES ($1)")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            debug!(user_id, "用户已创建");
            Ok(user_id)
        })
        .await
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<UserId>> {
        self.bounded("find_user_by_login", async {
            let id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE login = $1")
                .bind(login)
                .fetch_optional(&self.pool)
                .await?;
            Ok(id)
        })
        .await
    }

    #[instrument(skip(self, candidate))]
    async fn verify_password(&self, login: &str, candidate: &str) -> Result<bool> {
        let user = self
            .bounded("verify_password", async {
                let user = sqlx::query_as::<_, User>(
                    r#"
                    SELECT id, login, password_hash, created_at
                    FROM users
                    WHERE login = $1
                    "#,
                )
                .bind(login)
                .fetch_optional(&self.pool)
                .await?;
                Ok(user)
            })
            .await?;

        let Some(user) = user else {
            return Ok(false);
        };

        let candidate = candidate.to_string();
        tokio::task::spawn_blocking(move || auth::verify_password(&candidate, &user.password_hash))
            .await?
    }

    async fn insert_order(
        &self,
        number: OrderNumber,
        user_id: UserId,
        status: OrderStatus,
        uploaded_at: DateTime<Utc>,
    ) -> Result<()> {
        self.bounded("insert_order", async {
            sqlx::query(
                r#"
                INSERT INTO orders (number, user_id, status, accrual, uploaded_at)
                VALUES ($1, $2, $3, 0, $4)
                "#,
            )
            .bind(number)
            .bind(user_id)
            .bind(status)
            .bind(uploaded_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e, ORDERS_PKEY) {
                    LoyaltyError::OrderAlreadyExists(number.to_string())
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn get_order(&self, number: OrderNumber) -> Result<Option<Order>> {
        self.bounded("get_order", async {
            let order = sqlx::query_as::<_, Order>(
                r#"
                SELECT number, user_id, status, accrual, uploaded_at
                FROM orders
                WHERE number = $1
                "#,
            )
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
            Ok(order)
        })
        .await
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.bounded("list_orders_by_user", async {
            let orders = sqlx::query_as::<_, Order>(
                r#"
                SELECT number, user_id, status, accrual, uploaded_at
                FROM orders
                WHERE user_id = $1
                ORDER BY uploaded_at ASC, number ASC
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(orders)
        })
        .await
    }

    async fn list_orders_pending_accrual(&self) -> Result<Vec<OrderNumber>> {
        self.bounded("list_orders_pending_accrual", async {
            let numbers = sqlx::query_scalar::<_, OrderNumber>(
                r#"
                SELECT number
                FROM orders
                WHERE status IN ('NEW', 'REGISTERED', 'PROCESSING')
                ORDER BY uploaded_at ASC, number ASC
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(numbers)
        })
        .await
    }

    #[instrument(skip(self), fields(order = %number))]
    async fn apply_accrual(
        &self,
        number: OrderNumber,
        status: OrderStatus,
        amount: Decimal,
    ) -> Result<AccrualApplied> {
        self.bounded("apply_accrual", async {
            let mut tx = self.pool.begin().await?;

            // 只更新未终结的订单，重复投递的结果在此被吸收
            let owner = sqlx::query_scalar::<_, i64>(
                r#"
                UPDATE orders
                SET status = $2, accrual = $3
                WHERE number = $1
                  AND status IN ('NEW', 'REGISTERED', 'PROCESSING')
                RETURNING user_id
                "#,
            )
            .bind(number)
            .bind(status)
            .bind(amount)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(user_id) = owner else {
                let exists = sqlx::query_scalar::<_, i64>("SELECT user_id FROM orders WHERE number = $1")
                    .bind(number)
                    .fetch_optional(&mut *tx)
                    .await?;
                return Ok(if exists.is_some() {
                    AccrualApplied::AlreadySettled
                } else {
                    AccrualApplied::NotFound
                });
            };

            if amount > Decimal::ZERO {
                Self::credit_in_tx(&mut tx, user_id, amount).await?;
            }

            tx.commit().await?;
            Ok(AccrualApplied::Applied { user_id })
        })
        .await
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Balance> {
        self.bounded("get_balance", async {
            sqlx::query_as::<_, Balance>(
                r#"
                SELECT user_id, current, accrued, withdrawn, updated_at
                FROM balances
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LoyaltyError::NotFound {
                entity: "balance",
                id: user_id.to_string(),
            })
        })
        .await
    }

    async fn list_withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        self.bounded("list_withdrawals_by_user", async {
            let withdrawals = sqlx::query_as::<_, Withdrawal>(
                r#"
                SELECT order_number, user_id, amount, processed_at
                FROM withdrawals
                WHERE user_id = $1
                ORDER BY processed_at ASC, order_number ASC
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(withdrawals)
        })
        .await
    }

    #[instrument(skip(self), fields(order = %number))]
    async fn withdraw(
        &self,
        number: OrderNumber,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Withdrawal> {
        self.bounded("withdraw", async {
            let mut tx = self.pool.begin().await?;

            // 行锁保证同一用户的并发提现串行执行，检查与扣减之间余额不会变化
            let balance = Self::lock_balance_in_tx(&mut tx, user_id).await?;
            if balance.current < amount {
                return Err(LoyaltyError::InsufficientFunds {
                    required: amount,
                    available: balance.current,
                });
            }

            let withdrawal = Withdrawal {
                order_number: number,
                user_id,
                amount,
                processed_at: Utc::now(),
            };
            Self::insert_withdrawal_in_tx(&mut tx, &withdrawal).await?;
            Self::debit_in_tx(&mut tx, user_id, amount).await?;

            tx.commit().await?;
            Ok(withdrawal)
        })
        .await
    }

    async fn health_check(&self) -> Result<()> {
        self.bounded("health_check", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}
