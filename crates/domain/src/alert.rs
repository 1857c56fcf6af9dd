//! 监控告警实体定义
//!
//! 消息命中违禁词或用户主动举报时生成告警，由审核员跟进到终态。
//! 告警永不硬删除，保留完整审计链。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{AlertId, RoomId, Timestamp, UserId};

/// 告警状态
///
/// 状态机采用严格流转表：Open -> InReview -> Resolved，
/// Dismissed 可从 Open 或 InReview 进入；Resolved 与 Dismissed 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// 待处理
    Open,
    /// 审核中
    InReview,
    /// 已处理
    Resolved,
    /// 已驳回
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::InReview => "in_review",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "open" => Ok(AlertStatus::Open),
            "in_review" => Ok(AlertStatus::InReview),
            "resolved" => Ok(AlertStatus::Resolved),
            "dismissed" => Ok(AlertStatus::Dismissed),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown alert status '{other}'"),
            )),
        }
    }

    /// 严格流转表。相同状态视为幂等，允许。
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (AlertStatus::Open, AlertStatus::InReview)
                | (AlertStatus::Open, AlertStatus::Dismissed)
                | (AlertStatus::InReview, AlertStatus::Resolved)
                | (AlertStatus::InReview, AlertStatus::Dismissed)
                | (AlertStatus::InReview, AlertStatus::Open)
        )
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Dismissed)
    }
}

/// 监控告警实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringAlert {
    /// 告警唯一ID
    pub id: AlertId,
    /// 举报人（命中违禁词时为发送者的交易对手方）
    pub reporter_id: UserId,
    /// 被举报用户
    pub problematic_user_id: UserId,
    /// 关联的会话房间（主动举报可以不带房间）
    pub room_id: Option<RoomId>,
    /// 当前状态
    pub status: AlertStatus,
    /// 当前负责的审核员（可空）
    pub responsible_id: Option<UserId>,
    /// 创建时间
    pub created_at: Timestamp,
    /// 更新时间
    pub updated_at: Timestamp,
}

impl MonitoringAlert {
    /// 创建新告警，初始状态为 Open、无负责人
    pub fn new(
        id: AlertId,
        reporter_id: UserId,
        problematic_user_id: UserId,
        room_id: Option<RoomId>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            reporter_id,
            problematic_user_id,
            room_id,
            status: AlertStatus::Open,
            responsible_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 创建具有完整字段的告警（用于从数据库加载）
    #[allow(clippy::too_many_arguments)]
    pub fn with_fields(
        id: AlertId,
        reporter_id: UserId,
        problematic_user_id: UserId,
        room_id: Option<RoomId>,
        status: AlertStatus,
        responsible_id: Option<UserId>,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            reporter_id,
            problematic_user_id,
            room_id,
            status,
            responsible_id,
            created_at,
            updated_at,
        }
    }

    /// 指派负责人。覆盖旧指派（后写者胜）。
    ///
    /// 对 Open 告警指派非空负责人会同时推进到 InReview；
    /// 撤销指派不会自动回退状态。
    pub fn assign_responsible(&mut self, responsible_id: Option<UserId>, now: Timestamp) {
        self.responsible_id = responsible_id;
        if responsible_id.is_some() && self.status == AlertStatus::Open {
            self.status = AlertStatus::InReview;
        }
        self.updated_at = now;
    }

    /// 按严格流转表更新状态
    pub fn update_status(&mut self, next: AlertStatus, now: Timestamp) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
