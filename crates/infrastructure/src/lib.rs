//! 基础设施层
//!
//! PostgreSQL 仓储、进程内会话注册表、审计日志外发等适配器实现。

pub mod audit_sink;
pub mod db;
pub mod registry;
pub mod retry;

pub use audit_sink::HttpAuditSink;
pub use db::{create_pg_pool, PgAlertRepository, PgChatRoomRepository, PgMessageRepository};
pub use registry::SessionRegistry;
pub use retry::{retry_async, RetryPolicy};
