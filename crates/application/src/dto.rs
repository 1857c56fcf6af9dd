//! 对外数据传输对象

use serde::Serialize;

use domain::{
    AlertId, AlertStatus, ChatRoom, Message, MessageId, MonitoringAlert, Role, RoomId, Timestamp,
    UserId,
};

use crate::directory::UserSummary;

#[derive(Debug, Clone, Serialize)]
pub struct RoomDto {
    pub id: RoomId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub moderator_id: Option<UserId>,
    pub created_at: Timestamp,
}

impl From<&ChatRoom> for RoomDto {
    fn from(room: &ChatRoom) -> Self {
        Self {
            id: room.id,
            buyer_id: room.buyer_id,
            seller_id: room.seller_id,
            moderator_id: room.moderator_id,
            created_at: room.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDto {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_role: Role,
    pub content: String,
    pub edited: bool,
    pub deleted: bool,
    pub flagged: bool,
    pub created_at: Timestamp,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            room_id: message.room_id,
            sender_id: message.sender_id,
            sender_role: message.sender_role,
            content: message.content.as_str().to_string(),
            edited: message.edited,
            deleted: message.deleted,
            flagged: message.flagged,
            created_at: message.created_at,
        }
    }
}

/// 告警面板视图：告警本体加上相关身份摘要，最新的在前
#[derive(Debug, Clone, Serialize)]
pub struct AlertView {
    pub id: AlertId,
    pub status: AlertStatus,
    pub room_id: Option<RoomId>,
    pub reporter: UserSummary,
    pub problematic_user: UserSummary,
    pub responsible: Option<UserSummary>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AlertView {
    pub fn new(
        alert: &MonitoringAlert,
        reporter: UserSummary,
        problematic_user: UserSummary,
        responsible: Option<UserSummary>,
    ) -> Self {
        Self {
            id: alert.id,
            status: alert.status,
            room_id: alert.room_id,
            reporter,
            problematic_user,
            responsible,
            created_at: alert.created_at,
            updated_at: alert.updated_at,
        }
    }
}
