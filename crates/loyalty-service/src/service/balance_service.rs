//! 余额与提现服务
//!
//! 提现引用的订单号只做 Luhn 校验，不要求是调用者上传过的订单。
//! 余额检查与扣减由存储层在同一事务内完成。

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use loyalty_shared::observability::metrics;

use crate::error::{LoyaltyError, Result};
use crate::models::{Balance, OrderNumber, UserId, Withdrawal};
use crate::repository::AccountStore;

/// 金额最多两位小数，与存储精度一致
const MAX_AMOUNT_SCALE: u32 = 2;

pub struct BalanceService {
    store: Arc<dyn AccountStore>,
}

impl BalanceService {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Balance> {
        self.store.get_balance(user_id).await
    }

    /// 提现记录，按处理时间升序
    pub async fn withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        self.store.list_withdrawals_by_user(user_id).await
    }

    /// 提现
    #[instrument(skip(self, raw_order))]
    pub async fn withdraw(&self, user_id: UserId, raw_order: &str, amount: Decimal) -> Result<Withdrawal> {
        let number = match raw_order.parse::<OrderNumber>() {
            Ok(number) => number,
            Err(e) => {
                metrics::record_withdrawal("rejected");
                return Err(e);
            }
        };
        validate_amount(amount).inspect_err(|_| metrics::record_withdrawal("rejected"))?;

        match self.store.withdraw(number, user_id, amount).await {
            Ok(withdrawal) => {
                metrics::record_withdrawal("success");
                info!(user_id, order = %number, %amount, "提现成功");
                Ok(withdrawal)
            }
            Err(e @ LoyaltyError::InsufficientFunds { .. }) => {
                metrics::record_withdrawal("insufficient_funds");
                warn!(user_id, order = %number, %amount, "余额不足");
                Err(e)
            }
            Err(e) => {
                metrics::record_withdrawal(if e.is_business_error() { "rejected" } else { "error" });
                Err(e)
            }
        }
    }
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LoyaltyError::InvalidAmount(format!("{} 必须大于 0", amount)));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(LoyaltyError::InvalidAmount(format!(
            "{} 超过 {} 位小数",
            amount, MAX_AMOUNT_SCALE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockAccountStore;
    use chrono::Utc;
    use mockall::predicate::*;

    const ORDER: &str = "2377225624";

    #[tokio::test]
    async fn test_withdraw_delegates_to_store() {
        let number: OrderNumber = ORDER.parse().unwrap();
        let amount = Decimal::new(751, 0);

        let mut store = MockAccountStore::new();
        store
            .expect_withdraw()
            .with(eq(number), eq(5), eq(amount))
            .times(1)
            .returning(|number, user_id, amount| {
                Ok(Withdrawal {
                    order_number: number,
                    user_id,
                    amount,
                    processed_at: Utc::now(),
                })
            });

        let service = BalanceService::new(Arc::new(store));
        let withdrawal = service.withdraw(5, ORDER, amount).await.unwrap();
        assert_eq!(withdrawal.amount, amount);
        assert_eq!(withdrawal.order_number, number);
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_distinguishable() {
        let mut store = MockAccountStore::new();
        store.expect_withdraw().returning(|_, _, amount| {
            Err(LoyaltyError::InsufficientFunds {
                required: amount,
                available: Decimal::ZERO,
            })
        });

        let service = BalanceService::new(Arc::new(store));
        let err = service.withdraw(1, ORDER, Decimal::from(100)).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::InsufficientFunds { .. }));
        assert!(err.is_business_error());
    }

    #[tokio::test]
    async fn test_invalid_order_number_rejected_before_store() {
        let mut store = MockAccountStore::new();
        store.expect_withdraw().never();

        let service = BalanceService::new(Arc::new(store));
        let err = service
            .withdraw(1, "1234567812345678", Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::InvalidOrderNumber(_)));
    }

    #[tokio::test]
    async fn test_invalid_amounts_rejected_before_store() {
        let mut store = MockAccountStore::new();
        store.expect_withdraw().never();

        let service = BalanceService::new(Arc::new(store));
        for amount in [Decimal::ZERO, Decimal::from(-5), Decimal::new(1001, 3)] {
            let err = service.withdraw(1, ORDER, amount).await.unwrap_err();
            assert!(matches!(err, LoyaltyError::InvalidAmount(_)), "{amount}");
        }
    }

    #[test]
    fn test_trailing_zeros_do_not_count_as_precision() {
        assert!(validate_amount(Decimal::new(1000, 3)).is_ok());
        assert!(validate_amount(Decimal::new(1050, 2)).is_ok());
    }
}
