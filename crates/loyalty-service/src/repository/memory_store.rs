//! 内存账户存储
//!
//! 单把互斥锁保护全部状态，每个操作在锁内完成“先校验、后修改”，
//! 因而与 PostgreSQL 实现具有相同的原子性语义。适用于本地开发和测试。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::traits::{AccountStore, AccrualApplied};
use crate::auth;
use crate::error::{LoyaltyError, Result};
use crate::models::{Balance, Order, OrderNumber, OrderStatus, User, UserId, Withdrawal};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<String, User>,
    balances: HashMap<UserId, Balance>,
    orders: BTreeMap<OrderNumber, Order>,
    withdrawals: BTreeMap<OrderNumber, Withdrawal>,
}

impl MemoryState {
    fn next_user_id(&self) -> UserId {
        self.users.values().map(|u| u.id).max().unwrap_or(0) + 1
    }
}

/// 内存账户存储
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    state: Mutex<MemoryState>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserId> {
        let mut state = self.state.lock();
        if state.users.contains_key(login) {
            return Err(LoyaltyError::LoginTaken(login.to_string()));
        }

        let now = Utc::now();
        let user_id = state.next_user_id();
        state.users.insert(
            login.to_string(),
            User {
                id: user_id,
                login: login.to_string(),
                password_hash: password_hash.to_string(),
                created_at: now,
            },
        );
        state.balances.insert(user_id, Balance::empty(user_id, now));
        Ok(user_id)
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<UserId>> {
        Ok(self.state.lock().users.get(login).map(|u| u.id))
    }

    async fn verify_password(&self, login: &str, candidate: &str) -> Result<bool> {
        // 锁外做 bcrypt 计算
        let hash = self
            .state
            .lock()
            .users
            .get(login)
            .map(|u| u.password_hash.clone());

        let Some(hash) = hash else {
            return Ok(false);
        };

        let candidate = candidate.to_string();
        tokio::task::spawn_blocking(move || auth::verify_password(&candidate, &hash)).await?
    }

    async fn insert_order(
        &self,
        number: OrderNumber,
        user_id: UserId,
        status: OrderStatus,
        uploaded_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.orders.contains_key(&number) {
            return Err(LoyaltyError::OrderAlreadyExists(number.to_string()));
        }
        let order = Order {
            status,
            ..Order::new(number, user_id, uploaded_at)
        };
        state.orders.insert(number, order);
        Ok(())
    }

    async fn get_order(&self, number: OrderNumber) -> Result<Option<Order>> {
        Ok(self.state.lock().orders.get(&number).cloned())
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .state
            .lock()
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.uploaded_at, o.number));
        Ok(orders)
    }

    async fn list_orders_pending_accrual(&self) -> Result<Vec<OrderNumber>> {
        let mut pending: Vec<(DateTime<Utc>, OrderNumber)> = self
            .state
            .lock()
            .orders
            .values()
            .filter(|o| o.status.is_pending())
            .map(|o| (o.uploaded_at, o.number))
            .collect();
        pending.sort();
        Ok(pending.into_iter().map(|(_, number)| number).collect())
    }

    async fn apply_accrual(
        &self,
        number: OrderNumber,
        status: OrderStatus,
        amount: Decimal,
    ) -> Result<AccrualApplied> {
        let mut state = self.state.lock();

        let user_id = match state.orders.get(&number) {
            None => return Ok(AccrualApplied::NotFound),
            Some(order) if order.status.is_terminal() => return Ok(AccrualApplied::AlreadySettled),
            Some(order) => order.user_id,
        };

        // 先校验入账目标，再同时修改订单与余额
        if amount > Decimal::ZERO && !state.balances.contains_key(&user_id) {
            return Err(LoyaltyError::NotFound {
                entity: "balance",
                id: user_id.to_string(),
            });
        }

        if let Some(order) = state.orders.get_mut(&number) {
            order.status = status;
            order.accrual = amount;
        }
        if amount > Decimal::ZERO {
            if let Some(balance) = state.balances.get_mut(&user_id) {
                balance.current += amount;
                balance.accrued += amount;
                balance.updated_at = Utc::now();
            }
        }

        Ok(AccrualApplied::Applied { user_id })
    }

    async fn get_balance(&self, user_id: UserId) -> Result<Balance> {
        self.state
            .lock()
            .balances
            .get(&user_id)
            .cloned()
            .ok_or_else(|| LoyaltyError::NotFound {
                entity: "balance",
                id: user_id.to_string(),
            })
    }

    async fn list_withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        let mut withdrawals: Vec<Withdrawal> = self
            .state
            .lock()
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| (w.processed_at, w.order_number));
        Ok(withdrawals)
    }

    async fn withdraw(
        &self,
        number: OrderNumber,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Withdrawal> {
        let mut state = self.state.lock();

        let available = state
            .balances
            .get(&user_id)
            .map(|b| b.current)
            .ok_or_else(|| LoyaltyError::NotFound {
                entity: "balance",
                id: user_id.to_string(),
            })?;
        if available < amount {
            return Err(LoyaltyError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        if state.withdrawals.contains_key(&number) {
            return Err(LoyaltyError::WithdrawalExists(number.to_string()));
        }

        let now = Utc::now();
        let withdrawal = Withdrawal {
            order_number: number,
            user_id,
            amount,
            processed_at: now,
        };
        state.withdrawals.insert(number, withdrawal.clone());
        if let Some(balance) = state.balances.get_mut(&user_id) {
            balance.current -= amount;
            balance.withdrawn += amount;
            balance.updated_at = now;
        }

        Ok(withdrawal)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn order(raw: &str) -> OrderNumber {
        raw.parse().unwrap()
    }

    async fn user_with_points(store: &MemoryAccountStore, login: &str, points: i64) -> UserId {
        let user_id = store.create_user(login, "hash").await.unwrap();
        let number = order("79927398713");
        store
            .insert_order(number, user_id, OrderStatus::New, Utc::now())
            .await
            .unwrap();
        store
            .apply_accrual(number, OrderStatus::Processed, Decimal::from(points))
            .await
            .unwrap();
        user_id
    }

    #[tokio::test]
    async fn test_create_user_allocates_sequential_ids_with_zero_balance() {
        let store = MemoryAccountStore::new();
        let alice = store.create_user("alice", "h1").await.unwrap();
        let bob = store.create_user("bob", "h2").await.unwrap();

        assert_eq!(alice, 1);
        assert_eq!(bob, 2);

        let balance = store.get_balance(alice).await.unwrap();
        assert_eq!(balance.current, Decimal::ZERO);
        assert!(balance.is_consistent());
    }

    #[tokio::test]
    async fn test_duplicate_login_rejected() {
        let store = MemoryAccountStore::new();
        store.create_user("alice", "h1").await.unwrap();

        let err = store.create_user("alice", "h2").await.unwrap_err();
        assert!(matches!(err, LoyaltyError::LoginTaken(_)));
    }

    #[tokio::test]
    async fn test_verify_password() {
        let store = MemoryAccountStore::new();
        let hash = auth::hash_password("pw", 4).unwrap();
        store.create_user("alice", &hash).await.unwrap();

        assert!(store.verify_password("alice", "pw").await.unwrap());
        assert!(!store.verify_password("alice", "nope").await.unwrap());
        assert!(!store.verify_password("ghost", "pw").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_order_rejected() {
        let store = MemoryAccountStore::new();
        let user_id = store.create_user("alice", "h").await.unwrap();
        let number = order("79927398713");

        store
            .insert_order(number, user_id, OrderStatus::New, Utc::now())
            .await
            .unwrap();
        let err = store
            .insert_order(number, user_id, OrderStatus::New, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::OrderAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_pending_orders_exclude_terminal() {
        let store = MemoryAccountStore::new();
        let user_id = store.create_user("alice", "h").await.unwrap();
        let first = order("79927398713");
        let second = order("12345678903");
        let now = Utc::now();

        store.insert_order(first, user_id, OrderStatus::New, now).await.unwrap();
        store
            .insert_order(second, user_id, OrderStatus::New, now + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(store.list_orders_pending_accrual().await.unwrap(), vec![first, second]);

        store
            .apply_accrual(first, OrderStatus::Invalid, Decimal::ZERO)
            .await
            .unwrap();
        assert_eq!(store.list_orders_pending_accrual().await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn test_apply_accrual_credits_once() {
        let store = MemoryAccountStore::new();
        let user_id = user_with_points(&store, "alice", 500).await;

        let again = store
            .apply_accrual(order("79927398713"), OrderStatus::Processed, Decimal::from(500))
            .await
            .unwrap();

        assert_eq!(again, AccrualApplied::AlreadySettled);
        let balance = store.get_balance(user_id).await.unwrap();
        assert_eq!(balance.current, Decimal::from(500));
        assert_eq!(balance.accrued, Decimal::from(500));
    }

    #[tokio::test]
    async fn test_apply_accrual_unknown_order() {
        let store = MemoryAccountStore::new();
        let result = store
            .apply_accrual(order("79927398713"), OrderStatus::Processed, Decimal::ONE)
            .await
            .unwrap();
        assert_eq!(result, AccrualApplied::NotFound);
    }

    #[tokio::test]
    async fn test_apply_accrual_missing_balance_changes_nothing() {
        let store = MemoryAccountStore::new();
        let user_id = store.create_user("alice", "h").await.unwrap();
        let number = order("79927398713");
        store
            .insert_order(number, user_id, OrderStatus::New, Utc::now())
            .await
            .unwrap();
        store.state.lock().balances.remove(&user_id);

        let result = store
            .apply_accrual(number, OrderStatus::Processed, Decimal::from(500))
            .await;

        assert!(result.is_err());
        let stored = store.get_order(number).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::New);
        assert_eq!(stored.accrual, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_funds_leaves_balance() {
        let store = MemoryAccountStore::new();
        let user_id = store.create_user("alice", "h").await.unwrap();

        let err = store
            .withdraw(order("2377225624"), user_id, Decimal::from(100))
            .await
            .unwrap_err();

        assert!(matches!(err, LoyaltyError::InsufficientFunds { .. }));
        assert_eq!(store.get_balance(user_id).await.unwrap().current, Decimal::ZERO);
        assert!(store.list_withdrawals_by_user(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_debits_and_records() {
        let store = MemoryAccountStore::new();
        let user_id = user_with_points(&store, "alice", 500).await;

        let withdrawal = store
            .withdraw(order("2377225624"), user_id, Decimal::new(7515, 1))
            .await;
        // 751.5 > 500
        assert!(withdrawal.is_err());

        let withdrawal = store
            .withdraw(order("2377225624"), user_id, Decimal::new(1505, 1))
            .await
            .unwrap();
        assert_eq!(withdrawal.amount, Decimal::new(1505, 1));

        let balance = store.get_balance(user_id).await.unwrap();
        assert_eq!(balance.current, Decimal::new(3495, 1));
        assert_eq!(balance.withdrawn, Decimal::new(1505, 1));
        assert!(balance.is_consistent());

        let err = store
            .withdraw(order("2377225624"), user_id, Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::WithdrawalExists(_)));
    }

    #[tokio::test]
    async fn test_concurrent_withdrawals_never_overdraw() {
        let store = Arc::new(MemoryAccountStore::new());
        let user_id = user_with_points(&store, "alice", 500).await;

        // 10 笔各 100 的并发提现，只能成功 5 笔
        let payloads: Vec<u64> = (1..=10).map(|i| 1000 + i).collect();
        let mut handles = Vec::new();
        for payload in payloads {
            let store = store.clone();
            let number = payload * 10 + crate::luhn::check_digit(payload) as u64;
            handles.push(tokio::spawn(async move {
                store
                    .withdraw(OrderNumber::new(number).unwrap(), user_id, Decimal::from(100))
                    .await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        let balance = store.get_balance(user_id).await.unwrap();
        assert_eq!(balance.current, Decimal::ZERO);
        assert_eq!(balance.withdrawn, Decimal::from(500));
    }
}
