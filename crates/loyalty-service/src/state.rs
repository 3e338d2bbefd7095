//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use loyalty_shared::config::AuthConfig;

use crate::auth::{JwtConfig, JwtManager};
use crate::repository::AccountStore;
use crate::service::{BalanceService, OrderService, UserService};

/// Axum 应用共享状态
///
/// 所有服务共享同一个存储句柄，通过 Arc 在 handler 间共享
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AccountStore>,
    pub users: Arc<UserService>,
    pub orders: Arc<OrderService>,
    pub balances: Arc<BalanceService>,
    pub jwt_manager: Arc<JwtManager>,
}

impl AppState {
    /// 基于存储与认证配置装配全部服务
    pub fn new(store: Arc<dyn AccountStore>, auth: &AuthConfig) -> Self {
        let jwt_manager = Arc::new(JwtManager::new(JwtConfig::from(auth)));

        Self {
            users: Arc::new(UserService::new(
                store.clone(),
                jwt_manager.clone(),
                auth.bcrypt_cost,
            )),
            orders: Arc::new(OrderService::new(store.clone())),
            balances: Arc::new(BalanceService::new(store.clone())),
            jwt_manager,
            store,
        }
    }
}
