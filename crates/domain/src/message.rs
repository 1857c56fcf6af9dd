//! 消息实体定义
//!
//! 消息一经创建即不可变，仅 edited / deleted / flagged 三个标记可以翻转。
//! 软删除保留原始内容，供审核追溯。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::role::Role;
use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_role: Role,
    pub content: MessageContent,
    pub edited: bool,
    pub deleted: bool,
    pub flagged: bool,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        sender_id: UserId,
        sender_role: Role,
        content: MessageContent,
        created_at: Timestamp,
    ) -> DomainResult<Self> {
        if sender_role == Role::Admin {
            // 管理员不参与会话，消息只能由买家、卖家或审核员发出
            return Err(DomainError::invalid_argument(
                "sender_role",
                "admin cannot post messages",
            ));
        }

        Ok(Self {
            id,
            room_id,
            sender_id,
            sender_role,
            content,
            edited: false,
            deleted: false,
            flagged: false,
            created_at,
        })
    }

    /// 编辑消息内容并置 edited 标记
    pub fn edit(&mut self, new_content: MessageContent) -> DomainResult<()> {
        if self.deleted {
            return Err(DomainError::OperationNotAllowed);
        }
        self.content = new_content;
        self.edited = true;
        Ok(())
    }

    /// 软删除：仅置标记，内容保留
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// 命中违禁词后标记待审核
    pub fn mark_flagged(&mut self) {
        self.flagged = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn message() -> Message {
        Message::new(
            MessageId::new(Uuid::new_v4()),
            RoomId::new(Uuid::new_v4()),
            UserId::new(Uuid::new_v4()),
            Role::Buyer,
            MessageContent::new("hello").unwrap(),
            OffsetDateTime::now_utc(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_message_has_clean_flags() {
        let message = message();
        assert!(!message.edited);
        assert!(!message.deleted);
        assert!(!message.flagged);
    }

    #[test]
    fn test_admin_cannot_author_messages() {
        let result = Message::new(
            MessageId::new(Uuid::new_v4()),
            RoomId::new(Uuid::new_v4()),
            UserId::new(Uuid::new_v4()),
            Role::Admin,
            MessageContent::new("hi").unwrap(),
            OffsetDateTime::now_utc(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_edit_replaces_content_and_sets_flag() {
        let mut message = message();
        message
            .edit(MessageContent::new("updated").unwrap())
            .unwrap();
        assert_eq!(message.content.as_str(), "updated");
        assert!(message.edited);
    }

    #[test]
    fn test_edit_after_delete_is_rejected() {
        let mut message = message();
        message.mark_deleted();
        let result = message.edit(MessageContent::new("too late").unwrap());
        assert_eq!(result, Err(DomainError::OperationNotAllowed));
    }

    #[test]
    fn test_soft_delete_retains_content() {
        let mut message = message();
        message.mark_deleted();
        assert!(message.deleted);
        assert_eq!(message.content.as_str(), "hello");
    }
}
