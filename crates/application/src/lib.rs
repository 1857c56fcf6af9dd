//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、房间内有序落库、
//! 以及对外部适配器（例如消息分发、审计日志、存储）的抽象。

pub mod audit;
pub mod broadcaster;
pub mod clock;
pub mod content_filter;
pub mod directory;
pub mod dto;
pub mod error;
pub mod presence;
pub mod repository;
pub mod services;

pub use audit::{spawn_audit_worker, AuditEmitter, AuditEvent, AuditSink, TracingAuditSink};
pub use broadcaster::{BroadcastError, MessageBroadcast, MessageFanout};
pub use clock::{Clock, ManualClock, SystemClock};
pub use content_filter::ContentFilter;
pub use directory::{NullUserDirectory, UserDirectory, UserSummary};
pub use dto::{AlertView, MessageDto, RoomDto};
pub use error::ApplicationError;
pub use presence::{spawn_sweeper, PresenceRecord, PresenceTracker};
// 跟踪器对外广播的事件类型
pub use domain::PresenceEvent;
pub use repository::{AlertRepository, ChatRoomRepository, MessageRepository};
pub use services::{
    ChatService, ChatServiceDependencies, ModerationService, ModerationServiceDependencies,
};
