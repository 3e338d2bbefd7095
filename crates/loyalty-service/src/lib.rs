//! 积分服务
//!
//! 用户上传购物订单号，外部计算服务给出积分后入账，用户可用积分抵扣新订单。
//!
//! ## 模块结构
//!
//! - `luhn`: 订单号校验
//! - `models`: 订单、用户、余额、提现记录
//! - `repository`: 存储抽象及 PostgreSQL / 内存实现
//! - `service`: 注册登录、订单上传、余额与提现
//! - `accrual`: 积分计算服务客户端与对账 Worker
//! - `auth` / `middleware`: JWT 会话
//! - `dto` / `handlers` / `routes` / `state`: HTTP 接口
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 存储：PostgreSQL（sqlx），金额使用 rust_decimal
//! - 数据验证：validator

pub mod accrual;
pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod luhn;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;

pub use error::{LoyaltyError, Result};
pub use routes::build_router;
pub use state::AppState;

/// 内嵌的数据库迁移
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
