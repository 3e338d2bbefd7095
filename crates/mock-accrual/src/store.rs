//! 内存存储
//!
//! 使用 DashMap 保存订单计算结果。开启自动登记时，未知的合法订单在首次查询时登记，
//! 之后每次查询推进一步：REGISTERED -> PROCESSING -> PROCESSED。
//! 订单号能被 7 整除的订单最终为 INVALID。

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::luhn;
use crate::models::{AccrualRecord, AccrualStatus, RegisterOrderRequest};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("订单号无效: {0}")]
    InvalidOrder(String),

    #[error("订单已登记: {0}")]
    AlreadyRegistered(String),
}

#[derive(Debug, Clone, Default)]
pub struct AccrualStore {
    records: Arc<DashMap<String, AccrualRecord>>,
}

impl AccrualStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 手动登记订单
    pub fn register(&self, req: RegisterOrderRequest) -> Result<AccrualRecord, StoreError> {
        let order = req.order.trim().to_string();
        if !luhn::is_valid(&order) {
            return Err(StoreError::InvalidOrder(order));
        }

        let status = req.status.unwrap_or(AccrualStatus::Registered);
        let record = AccrualRecord {
            order: order.clone(),
            status,
            accrual: if status == AccrualStatus::Processed {
                req.accrual
            } else {
                None
            },
        };

        match self.records.entry(order) {
            Entry::Occupied(entry) => Err(StoreError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(record.clone());
                Ok(record)
            }
        }
    }

    /// 查询订单结果
    ///
    /// `advance` 为 true 时先推进状态；未知订单在 `advance` 为 true 时自动登记
    pub fn poll(&self, order: &str, advance: bool) -> Option<AccrualRecord> {
        if !advance {
            return self.get(order);
        }
        if !luhn::is_valid(order) {
            return None;
        }

        match self.records.entry(order.to_string()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                step(record);
                Some(record.clone())
            }
            Entry::Vacant(entry) => {
                let record = AccrualRecord::registered(order);
                entry.insert(record.clone());
                Some(record)
            }
        }
    }

    pub fn get(&self, order: &str) -> Option<AccrualRecord> {
        self.records.get(order).map(|r| r.clone())
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }
}

/// 推进一步，终态不变
fn step(record: &mut AccrualRecord) {
    match record.status {
        AccrualStatus::Registered => record.status = AccrualStatus::Processing,
        AccrualStatus::Processing => {
            let number = record.order.parse::<u128>().unwrap_or_default();
            if number % 7 == 0 {
                record.status = AccrualStatus::Invalid;
            } else {
                record.status = AccrualStatus::Processed;
                record.accrual = Some(accrual_for(number));
            }
        }
        AccrualStatus::Invalid | AccrualStatus::Processed => {}
    }
}

/// 由订单号确定的积分：取后五位，范围 1.00 - 1000.99
fn accrual_for(number: u128) -> Decimal {
    let cents = (number % 100_000) as i64 + 100;
    Decimal::new(cents, 2)
}
