//! 服务层
//!
//! 业务规则所在层，依赖 [`crate::repository::AccountStore`] 抽象。

mod balance_service;
mod order_service;
mod user_service;

pub use balance_service::BalanceService;
pub use order_service::{OrderService, SubmitOutcome};
pub use user_service::{Session, UserService};
