//! 订单上传服务
//!
//! ## 上传流程
//!
//! 1. 解析并做 Luhn 校验 -> 2. 查询已有订单 -> 3. 归属判断 -> 4. 写入 NEW 订单
//!
//! 同一用户重复上传是幂等的；并发上传同一订单号时，插入冲突后重新读取并按归属判定。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use loyalty_shared::observability::metrics;

use crate::error::{LoyaltyError, Result};
use crate::models::{Order, OrderNumber, OrderStatus, UserId};
use crate::repository::AccountStore;

/// 上传结果
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// 新订单已接受，等待计算
    Accepted(Order),
    /// 该用户之前已上传过
    AlreadyUploaded(Order),
}

pub struct OrderService {
    store: Arc<dyn AccountStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// 上传订单号
    #[instrument(skip(self, raw))]
    pub async fn submit(&self, user_id: UserId, raw: &str) -> Result<SubmitOutcome> {
        let number = match raw.parse::<OrderNumber>() {
            Ok(number) => number,
            Err(e) => {
                metrics::record_order_submission("invalid");
                return Err(e);
            }
        };

        if let Some(existing) = self.store.get_order(number).await? {
            return Self::resolve_existing(existing, user_id);
        }

        let uploaded_at = Utc::now();
        match self
            .store
            .insert_order(number, user_id, OrderStatus::New, uploaded_at)
            .await
        {
            Ok(()) => {
                metrics::record_order_submission("accepted");
                info!(user_id, order = %number, "订单已接受");
                Ok(SubmitOutcome::Accepted(Order::new(number, user_id, uploaded_at)))
            }
            Err(LoyaltyError::OrderAlreadyExists(_)) => {
                // 与并发请求竞争失败，以已落库的订单为准
                let existing = self.store.get_order(number).await?.ok_or_else(|| {
                    LoyaltyError::Internal(format!("订单 {} 插入冲突后不可见", number))
                })?;
                Self::resolve_existing(existing, user_id)
            }
            Err(e) => {
                metrics::record_order_submission("error");
                Err(e)
            }
        }
    }

    /// 用户的全部订单，按上传时间升序
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.store.list_orders_by_user(user_id).await
    }

    fn resolve_existing(existing: Order, user_id: UserId) -> Result<SubmitOutcome> {
        if existing.user_id == user_id {
            metrics::record_order_submission("duplicate");
            Ok(SubmitOutcome::AlreadyUploaded(existing))
        } else {
            metrics::record_order_submission("conflict");
            warn!(
                user_id,
                owner = existing.user_id,
                order = %existing.number,
                "订单已由其他用户上传"
            );
            Err(LoyaltyError::OrderOwnedByAnotherUser(existing.number.to_string()))
        }
    }
}
