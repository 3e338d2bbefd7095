//! 积分对账 Worker
//!
//! 定期拉取待计算订单并向计算服务查询结果：
//! 1. 计算服务 500 或网络失败时中止本轮，下轮重试
//! 2. 429 时中止本轮并冷却，优先使用 `Retry-After`
//! 3. 其余异常只跳过当前订单
//!
//! 每轮在同一个任务内串行执行，轮次之间不会重叠。
//! 同一结果重复落库是安全的：终态订单不再变化。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use loyalty_shared::observability::metrics;

use super::client::{AccrualClient, AccrualResponse};
use crate::models::OrderNumber;
use crate::repository::{AccountStore, AccrualApplied};

/// 单轮对账结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 没有待计算订单
    Idle,
    /// 全部订单已处理（含跳过）
    Completed { applied: usize, skipped: usize },
    /// 计算服务故障，本轮中止
    Aborted,
    /// 被限流，需冷却后再继续
    RateLimited { retry_after: Option<Duration> },
}

impl TickOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Completed { .. } => "completed",
            Self::Aborted => "aborted",
            Self::RateLimited { .. } => "rate_limited",
        }
    }
}

/// 单个订单的处理结果
enum OrderStep {
    Applied,
    Skipped,
    Abort,
    Cooldown(Option<Duration>),
}

pub struct AccrualWorker {
    store: Arc<dyn AccountStore>,
    client: Arc<dyn AccrualClient>,
    /// 轮询间隔
    poll_interval: Duration,
    /// 429 未携带 Retry-After 时的冷却时间
    cooldown: Duration,
}

impl AccrualWorker {
    pub fn new(
        store: Arc<dyn AccountStore>,
        client: Arc<dyn AccrualClient>,
        poll_interval: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            client,
            poll_interval,
            cooldown,
        }
    }

    /// 主循环，直到 shutdown 信号变为 true 或发送端被丢弃
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.poll_interval,
            cooldown = ?self.cooldown,
            "AccrualWorker 已启动"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            if let TickOutcome::RateLimited { retry_after } = self.tick().await {
                let pause = retry_after.unwrap_or(self.cooldown);
                warn!(pause = ?pause, "计算服务限流，暂停轮询");

                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = shutdown.changed() => break,
                }
                interval.reset();
            }
        }

        info!("AccrualWorker 已停止");
    }

    /// 执行一轮对账
    pub async fn tick(&self) -> TickOutcome {
        let started = Instant::now();
        let outcome = self.reconcile().await;
        metrics::record_accrual_tick(outcome.label(), started.elapsed().as_secs_f64());
        outcome
    }

    async fn reconcile(&self) -> TickOutcome {
        let pending = match self.store.list_orders_pending_accrual().await {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "查询待计算订单失败");
                return TickOutcome::Aborted;
            }
        };

        if pending.is_empty() {
            return TickOutcome::Idle;
        }

        let (mut applied, mut skipped) = (0, 0);
        for number in pending {
            match self.reconcile_order(number).await {
                OrderStep::Applied => applied += 1,
                OrderStep::Skipped => skipped += 1,
                OrderStep::Abort => return TickOutcome::Aborted,
                OrderStep::Cooldown(retry_after) => {
                    return TickOutcome::RateLimited { retry_after };
                }
            }
        }

        debug!(applied, skipped, "本轮对账完成");
        TickOutcome::Completed { applied, skipped }
    }

    async fn reconcile_order(&self, number: OrderNumber) -> OrderStep {
        let report = match self.client.fetch(number).await {
            Ok(AccrualResponse::Ready(report)) => report,
            Ok(AccrualResponse::RateLimited { retry_after }) => {
                return OrderStep::Cooldown(retry_after);
            }
            Ok(AccrualResponse::InternalError) => {
                warn!(order = %number, "计算服务内部错误，中止本轮");
                return OrderStep::Abort;
            }
            Ok(AccrualResponse::Unexpected(status)) => {
                debug!(order = %number, status, "订单暂无结果，跳过");
                return OrderStep::Skipped;
            }
            Ok(AccrualResponse::Malformed(reason)) => {
                warn!(order = %number, reason = %reason, "计算服务响应无法解析，跳过");
                return OrderStep::Skipped;
            }
            Err(e) => {
                warn!(order = %number, error = %e, "计算服务不可达，中止本轮");
                return OrderStep::Abort;
            }
        };

        let amount = report.settled_amount();
        match self.store.apply_accrual(number, report.status, amount).await {
            Ok(AccrualApplied::Applied { user_id }) => {
                metrics::record_accrual_applied(report.status.as_str());
                info!(
                    order = %number,
                    user_id,
                    status = %report.status,
                    %amount,
                    "积分结果已落库"
                );
                OrderStep::Applied
            }
            Ok(AccrualApplied::AlreadySettled) => {
                debug!(order = %number, "订单已是终态，忽略");
                OrderStep::Skipped
            }
            Ok(AccrualApplied::NotFound) => {
                warn!(order = %number, "订单不存在，忽略");
                OrderStep::Skipped
            }
            Err(e) => {
                error!(order = %number, error = %e, "积分结果落库失败");
                OrderStep::Skipped
            }
        }
    }
}
