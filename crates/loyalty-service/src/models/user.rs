//! 用户模型

use chrono::{DateTime, Utc};

/// 用户 ID，注册时按 max(id)+1 分配
pub type UserId = i64;

/// 用户
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub login: String,
    /// bcrypt 哈希，不会出现在任何响应中
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
