//! 交易会话与内容审核系统核心领域模型
//!
//! 包含会话、消息、监控告警等核心实体，以及相关的业务规则。

pub mod alert;
pub mod chat_room;
pub mod errors;
pub mod events;
pub mod message;
pub mod role;
pub mod session;
pub mod value_objects;

// 重新导出常用类型
pub use alert::{AlertStatus, MonitoringAlert};
pub use chat_room::ChatRoom;
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use events::PresenceEvent;
pub use message::Message;
pub use role::Role;
pub use session::Session;
pub use value_objects::{
    AlertId, MessageContent, MessageId, RoomId, SessionId, Timestamp, UserId,
};
