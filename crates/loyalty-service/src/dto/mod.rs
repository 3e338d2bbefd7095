//! 请求与响应 DTO

pub mod request;
pub mod response;

pub use request::{CredentialsRequest, WithdrawRequest};
pub use response::{BalanceResponse, OrderResponse, TokenResponse, WithdrawalResponse};
