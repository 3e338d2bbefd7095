//! 中间件模块

mod auth;

pub use auth::{JWT_COOKIE, auth_middleware};
