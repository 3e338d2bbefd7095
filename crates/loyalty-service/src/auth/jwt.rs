//! JWT Token 处理
//!
//! 注册和登录成功后签发会话令牌，中间件验证后得到 [`AuthenticatedUser`]。

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use loyalty_shared::config::AuthConfig;

use crate::error::LoyaltyError;
use crate::models::UserId;

/// JWT 配置
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// Token 过期时间（秒）
    pub expires_in_secs: i64,
    pub issuer: String,
}

impl From<&AuthConfig> for JwtConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            expires_in_secs: config.token_ttl_secs,
            issuer: config.issuer.clone(),
        }
    }
}

/// JWT Claims（Token 载荷）
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// 用户 ID（字符串形式，符合 JWT 规范）
    pub sub: String,
    /// 用户 ID
    pub uid: UserId,
    pub login: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// 已认证用户，由认证中间件注入请求扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub login: String,
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.uid,
            login: claims.login,
        }
    }
}

/// 签发结果
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// JWT 管理器
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT Token
    pub fn generate_token(&self, user_id: UserId, login: &str) -> Result<IssuedToken, LoyaltyError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.expires_in_secs);

        let claims = Claims {
            sub: user_id.to_string(),
            uid: user_id,
            login: login.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| LoyaltyError::Internal(format!("JWT 生成失败: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_at: exp,
        })
    }

    /// 验证并解析 JWT Token
    pub fn verify_token(&self, token: &str) -> Result<AuthenticatedUser, LoyaltyError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    LoyaltyError::Unauthorized("Token 已过期".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    LoyaltyError::Unauthorized("无效的 Token".to_string())
                }
                _ => LoyaltyError::Unauthorized(format!("Token 验证失败: {}", e)),
            },
        )?;

        let claims = token_data.claims;
        if claims.sub != claims.uid.to_string() {
            return Err(LoyaltyError::Unauthorized("Token 载荷不一致".to_string()));
        }

        Ok(claims.into())
    }

    pub fn expires_in_secs(&self) -> i64 {
        self.config.expires_in_secs
    }
}
