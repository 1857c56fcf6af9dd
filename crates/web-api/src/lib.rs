//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / WebSocket 请求委托给应用层的用例服务。
//! 凭证校验、按操作授权与审计发射都在这一层显式完成。

mod auth;
mod error;
mod policy;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, Identity, JwtService};
pub use config::JwtConfig;
pub use error::ApiError;
pub use policy::OperationPolicy;
pub use routes::router;
pub use state::AppState;
