//! PostgreSQL 持久化
//!
//! 连接池创建、错误映射与各仓储实现。

pub mod repositories;

pub use repositories::{PgAlertRepository, PgChatRoomRepository, PgMessageRepository};

use domain::RepositoryError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// 创建 PostgreSQL 连接池
pub async fn create_pg_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

pub(crate) fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

/// 连接级瞬时故障可重试；约束冲突、行不存在等不重试
pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}
