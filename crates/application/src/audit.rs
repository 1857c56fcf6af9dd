//! 审计事件发射器
//!
//! 特权操作产生的审计事件与请求路径完全解耦：emit 永不向调用方
//! 报错、永不阻塞，仅把事件推入进程生命周期的后台任务；
//! 外部日志收集端不可用时记录本地日志后丢弃。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use domain::{Role, Timestamp, UserId};

/// 审计事件
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// 操作标签，例如 "alert.assign"
    pub action: String,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub message: String,
    pub source_addr: Option<String>,
    pub occurred_at: Timestamp,
}

#[derive(Debug, Error)]
pub enum AuditSinkError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// 外部日志收集端端口。核心只发射，从不读回。
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn publish(&self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}

/// 审计事件发射器
///
/// 每个触发动作至多发射一次；送达收集端是尽力而为。
#[derive(Clone)]
pub struct AuditEmitter {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl AuditEmitter {
    /// 发射审计事件。永不失败：后台任务已退出时仅记录警告。
    pub fn emit(&self, event: AuditEvent) {
        if let Err(err) = self.tx.send(event) {
            tracing::warn!(error = %err, "audit worker is gone, event dropped");
        }
    }
}

/// 启动审计后台任务，返回发射器和任务句柄
///
/// 任务随进程存活；收集端失败记录警告后继续消费下一个事件。
pub fn spawn_audit_worker(sink: Arc<dyn AuditSink>) -> (AuditEmitter, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(err) = sink.publish(&event).await {
                tracing::warn!(
                    error = %err,
                    action = %event.action,
                    actor_id = %event.actor_id,
                    "failed to publish audit event, dropping"
                );
            }
        }
        tracing::info!("审计任务结束");
    });
    (AuditEmitter { tx }, handle)
}

/// 默认收集端：结构化写入本地日志
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn publish(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        tracing::info!(
            action = %event.action,
            actor_id = %event.actor_id,
            actor_role = event.actor_role.as_str(),
            entity_type = %event.entity_type,
            entity_id = event.entity_id.as_deref().unwrap_or("-"),
            source_addr = event.source_addr.as_deref().unwrap_or("-"),
            "{}",
            event.message
        );
        Ok(())
    }
}

/// 内存实现（用于测试）
pub mod memory {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryAuditSink {
        events: Mutex<Vec<AuditEvent>>,
        fail: bool,
    }

    impl MemoryAuditSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// 总是失败的收集端，用于验证失败被吞掉
        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub async fn events(&self) -> Vec<AuditEvent> {
            self.events.lock().await.clone()
        }
    }

    #[async_trait]
    impl AuditSink for MemoryAuditSink {
        async fn publish(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
            if self.fail {
                return Err(AuditSinkError::Unavailable("forced failure".to_string()));
            }
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryAuditSink;
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn event(action: &str) -> AuditEvent {
        AuditEvent {
            action: action.to_string(),
            actor_id: UserId::new(Uuid::new_v4()),
            actor_role: Role::Moderator,
            entity_type: "alert".to_string(),
            entity_id: Some(Uuid::new_v4().to_string()),
            message: "status updated".to_string(),
            source_addr: Some("127.0.0.1".to_string()),
            occurred_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_worker_forwards_events_to_sink() {
        let sink = Arc::new(MemoryAuditSink::new());
        let (emitter, handle) = spawn_audit_worker(sink.clone());

        emitter.emit(event("alert.assign"));
        emitter.emit(event("alert.status"));
        drop(emitter);
        handle.await.unwrap();

        let events = sink.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "alert.assign");
        assert_eq!(events[1].action, "alert.status");
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let sink = Arc::new(MemoryAuditSink::failing());
        let (emitter, handle) = spawn_audit_worker(sink);

        // emit 不返回错误；收集端失败不得影响触发路径
        emitter.emit(event("alert.assign"));
        drop(emitter);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_emit_after_worker_shutdown_does_not_panic() {
        let sink = Arc::new(MemoryAuditSink::new());
        let (emitter, handle) = spawn_audit_worker(sink);
        handle.abort();
        let _ = handle.await;

        emitter.emit(event("alert.assign"));
    }
}
