//! 积分对账
//!
//! [`AccrualWorker`] 轮询待计算订单，通过 [`AccrualClient`] 查询外部计算服务并落库结果。

mod client;
mod worker;

pub use client::{AccrualClient, AccrualReport, AccrualResponse, HttpAccrualClient};
pub use worker::{AccrualWorker, TickOutcome};
