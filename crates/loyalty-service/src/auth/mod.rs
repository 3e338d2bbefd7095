//! 认证模块
//!
//! JWT 会话令牌与 bcrypt 密码哈希。

mod jwt;
mod password;

pub use jwt::{AuthenticatedUser, Claims, IssuedToken, JwtConfig, JwtManager};
pub use password::{hash_password, verify_password};
