//! Mock Accrual
//!
//! 模拟积分计算服务，用于开发和测试环境。
//!
//! # 主要模块
//!
//! - `models`: 订单计算结果
//! - `store`: DashMap 内存存储与状态推进
//! - `rate_limit`: 每分钟请求数限制
//! - `routes`: REST 接口
//!
//! # 使用示例
//!
//! ```rust
//! use mock_accrual::{MockAccrualConfig, MockAccrualState, routes};
//!
//! let state = MockAccrualState::new(MockAccrualConfig {
//!     auto_register: true,
//!     max_requests_per_minute: 0,
//! });
//! let app = routes::router(state);
//! ```

pub mod luhn;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod store;

pub use models::{AccrualRecord, AccrualStatus, RegisterOrderRequest};
pub use routes::{MockAccrualConfig, MockAccrualState};
pub use store::{AccrualStore, StoreError};
