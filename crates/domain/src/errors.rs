//! 领域模型错误定义
//!
//! 定义了系统中所有可能的错误类型，提供清晰的错误上下文。

use thiserror::Error;

use crate::alert::AlertStatus;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 房间不存在
    #[error("room not found")]
    RoomNotFound,

    /// 发送者不是房间成员（买家、卖家或当前指派的审核员）
    #[error("user is not a member of the room")]
    NotAMember,

    /// 告警不存在
    #[error("alert not found")]
    AlertNotFound,

    /// 消息不存在
    #[error("message not found")]
    MessageNotFound,

    /// 告警状态流转非法
    #[error("invalid alert status transition: {from:?} -> {to:?}")]
    InvalidStatusTransition { from: AlertStatus, to: AlertStatus },

    /// 参数验证错误
    #[error("invalid argument: {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 操作不被允许（例如编辑他人消息、编辑已删除消息）
    #[error("operation not allowed")]
    OperationNotAllowed,
}

impl DomainError {
    /// 创建参数验证错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 存储层错误
///
/// 瞬时故障在仓储边界有限次重试后仍失败时以 Storage 形式向上抛出。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
