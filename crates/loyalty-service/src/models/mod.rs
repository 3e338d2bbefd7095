//! 数据模型定义

mod balance;
mod order;
mod user;
mod withdrawal;

pub use balance::*;
pub use order::*;
pub use user::*;
pub use withdrawal::*;
