//! 存储层
//!
//! - 存储只负责持久化与事务边界，不包含业务规则
//! - `PgAccountStore` 为生产实现，`MemoryAccountStore` 用于本地开发与测试
//! - 服务层通过 [`AccountStore`] trait 依赖抽象

mod account_repo;
mod memory_store;
mod traits;

pub use account_repo::PgAccountStore;
pub use memory_store::MemoryAccountStore;
pub use traits::*;
