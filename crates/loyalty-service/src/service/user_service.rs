//! 用户服务
//!
//! 注册与登录，成功后签发会话令牌。

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::auth::{self, IssuedToken, JwtManager};
use crate::error::{LoyaltyError, Result};
use crate::models::UserId;
use crate::repository::AccountStore;

/// 注册或登录成功后的会话
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub login: String,
    pub token: IssuedToken,
}

pub struct UserService {
    store: Arc<dyn AccountStore>,
    jwt: Arc<JwtManager>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(store: Arc<dyn AccountStore>, jwt: Arc<JwtManager>, bcrypt_cost: u32) -> Self {
        Self {
            store,
            jwt,
            bcrypt_cost,
        }
    }

    /// 注册新用户
    ///
    /// 先查重以便快速失败；并发注册同名用户时由存储层唯一约束兜底。
    #[instrument(skip(self, password))]
    pub async fn register(&self, login: &str, password: &str) -> Result<Session> {
        if self.store.find_user_by_login(login).await?.is_some() {
            warn!(login, "登录名已被占用");
            return Err(LoyaltyError::LoginTaken(login.to_string()));
        }

        let password = password.to_string();
        let cost = self.bcrypt_cost;
        let password_hash =
            tokio::task::spawn_blocking(move || auth::hash_password(&password, cost)).await??;

        let user_id = self.store.create_user(login, &password_hash).await?;
        let token = self.jwt.generate_token(user_id, login)?;

        info!(user_id, login, "用户注册成功");

        Ok(Session {
            user_id,
            login: login.to_string(),
            token,
        })
    }

    /// 登录，登录名不存在与密码错误返回同一错误
    #[instrument(skip(self, password))]
    pub async fn login(&self, login: &str, password: &str) -> Result<Session> {
        if !self.store.verify_password(login, password).await? {
            warn!(login, "登录失败");
            return Err(LoyaltyError::InvalidCredentials);
        }

        let user_id = self
            .store
            .find_user_by_login(login)
            .await?
            .ok_or(LoyaltyError::InvalidCredentials)?;
        let token = self.jwt.generate_token(user_id, login)?;

        info!(user_id, login, "用户登录成功");

        Ok(Session {
            user_id,
            login: login.to_string(),
            token,
        })
    }
}
