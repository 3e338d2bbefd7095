//! 密码处理
//!
//! bcrypt 计算开销大，异步上下文中应通过 `spawn_blocking` 调用。

use bcrypt::{hash, verify};

use crate::error::LoyaltyError;

/// 对密码进行哈希处理
pub fn hash_password(password: &str, cost: u32) -> Result<String, LoyaltyError> {
    hash(password, cost).map_err(|e| LoyaltyError::Internal(format!("密码哈希失败: {}", e)))
}

/// 比较明文密码与存储的哈希值
pub fn verify_password(password: &str, hash: &str) -> Result<bool, LoyaltyError> {
    verify(password, hash).map_err(|e| LoyaltyError::Internal(format!("密码验证失败: {}", e)))
}
