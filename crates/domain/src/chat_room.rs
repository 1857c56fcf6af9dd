//! 会话房间实体定义
//!
//! 一个房间对应一笔交易中买家与卖家的会话，可选地由一名审核员负责。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{RoomId, Timestamp, UserId};

/// 会话房间实体
///
/// 不变式：任一时刻最多只有一个非空的 moderator_id（单一负责人指派）。
/// 指派可以被覆盖，但不会同时属于两名审核员。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    /// 房间唯一ID
    pub id: RoomId,
    /// 买家ID
    pub buyer_id: UserId,
    /// 卖家ID
    pub seller_id: UserId,
    /// 当前负责的审核员ID（可空）
    pub moderator_id: Option<UserId>,
    /// 创建时间
    pub created_at: Timestamp,
    /// 更新时间
    pub updated_at: Timestamp,
}

impl ChatRoom {
    /// 创建新的买卖双方会话房间
    pub fn new(id: RoomId, buyer_id: UserId, seller_id: UserId, now: Timestamp) -> DomainResult<Self> {
        if buyer_id == seller_id {
            return Err(DomainError::invalid_argument(
                "seller_id",
                "buyer and seller must be different users",
            ));
        }

        Ok(Self {
            id,
            buyer_id,
            seller_id,
            moderator_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// 创建具有完整字段的房间（用于从数据库加载）
    pub fn with_fields(
        id: RoomId,
        buyer_id: UserId,
        seller_id: UserId,
        moderator_id: Option<UserId>,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> DomainResult<Self> {
        if buyer_id == seller_id {
            return Err(DomainError::invalid_argument(
                "seller_id",
                "buyer and seller must be different users",
            ));
        }

        Ok(Self {
            id,
            buyer_id,
            seller_id,
            moderator_id,
            created_at,
            updated_at,
        })
    }

    /// 指派或撤销负责的审核员（覆盖旧指派，后写者胜）
    pub fn assign_moderator(&mut self, moderator_id: Option<UserId>, now: Timestamp) {
        self.moderator_id = moderator_id;
        self.updated_at = now;
    }

    /// 检查用户是否为房间成员（买家、卖家或当前指派的审核员）
    pub fn is_member(&self, user_id: UserId) -> bool {
        user_id == self.buyer_id
            || user_id == self.seller_id
            || self.moderator_id == Some(user_id)
    }

    /// 获取交易对手方：买家的对手是卖家，反之亦然
    ///
    /// 审核员没有对手方，返回 None。
    pub fn counterpart_of(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.buyer_id {
            Some(self.seller_id)
        } else if user_id == self.seller_id {
            Some(self.buyer_id)
        } else {
            None
        }
    }

    /// 消息分发目标：买家、卖家及当前指派的审核员
    pub fn fanout_targets(&self) -> Vec<UserId> {
        let mut targets = vec![self.buyer_id, self.seller_id];
        if let Some(moderator_id) = self.moderator_id {
            targets.push(moderator_id);
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn room() -> ChatRoom {
        ChatRoom::new(
            RoomId::new(Uuid::new_v4()),
            UserId::new(Uuid::new_v4()),
            UserId::new(Uuid::new_v4()),
            OffsetDateTime::now_utc(),
        )
        .unwrap()
    }

    #[test]
    fn test_buyer_and_seller_must_differ() {
        let id = RoomId::new(Uuid::new_v4());
        let user = UserId::new(Uuid::new_v4());
        let result = ChatRoom::new(id, user, user, OffsetDateTime::now_utc());
        assert!(result.is_err());
    }

    #[test]
    fn test_membership() {
        let mut room = room();
        let moderator = UserId::new(Uuid::new_v4());
        let stranger = UserId::new(Uuid::new_v4());

        assert!(room.is_member(room.buyer_id));
        assert!(room.is_member(room.seller_id));
        assert!(!room.is_member(moderator));
        assert!(!room.is_member(stranger));

        room.assign_moderator(Some(moderator), OffsetDateTime::now_utc());
        assert!(room.is_member(moderator));
    }

    #[test]
    fn test_assignment_overwrites() {
        let mut room = room();
        let first = UserId::new(Uuid::new_v4());
        let second = UserId::new(Uuid::new_v4());
        let now = OffsetDateTime::now_utc();

        room.assign_moderator(Some(first), now);
        assert_eq!(room.moderator_id, Some(first));

        // 后写者胜，旧指派被覆盖而不是报错
        room.assign_moderator(Some(second), now);
        assert_eq!(room.moderator_id, Some(second));
        assert!(!room.is_member(first));

        room.assign_moderator(None, now);
        assert_eq!(room.moderator_id, None);
    }

    #[test]
    fn test_counterpart() {
        let room = room();
        assert_eq!(room.counterpart_of(room.buyer_id), Some(room.seller_id));
        assert_eq!(room.counterpart_of(room.seller_id), Some(room.buyer_id));
        assert_eq!(room.counterpart_of(UserId::new(Uuid::new_v4())), None);
    }

    #[test]
    fn test_fanout_targets_include_assigned_moderator() {
        let mut room = room();
        assert_eq!(room.fanout_targets().len(), 2);

        let moderator = UserId::new(Uuid::new_v4());
        room.assign_moderator(Some(moderator), OffsetDateTime::now_utc());
        let targets = room.fanout_targets();
        assert_eq!(targets.len(), 3);
        assert!(targets.contains(&moderator));
    }
}
