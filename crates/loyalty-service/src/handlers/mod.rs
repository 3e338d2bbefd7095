//! HTTP 请求处理器

pub mod balance;
pub mod orders;
pub mod user;
