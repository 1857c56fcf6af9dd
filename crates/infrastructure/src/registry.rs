//! 进程内会话注册表
//!
//! 连接管理器生命周期内显式持有的会话句柄表：会话ID到出站通道、
//! 用户ID到会话集合。消息分发对每个在线会话至多一次、尽力而为，
//! 出站缓冲满（慢速客户端）时丢弃该会话的本次投递而不是阻塞。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use application::{BroadcastError, MessageBroadcast, MessageDto, MessageFanout};
use domain::{Role, SessionId, UserId};

struct SessionHandle {
    user_id: UserId,
    role: Role,
    sender: mpsc::Sender<MessageDto>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    user_sessions: RwLock<HashMap<UserId, HashSet<SessionId>>>,
    buffer: usize,
}

impl SessionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            user_sessions: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// 登记会话，返回该会话的出站消息接收端
    pub async fn register(
        &self,
        session_id: SessionId,
        user_id: UserId,
        role: Role,
    ) -> mpsc::Receiver<MessageDto> {
        let (sender, receiver) = mpsc::channel(self.buffer);

        let mut sessions = self.sessions.write().await;
        let mut user_sessions = self.user_sessions.write().await;
        sessions.insert(
            session_id,
            SessionHandle {
                user_id,
                role,
                sender,
            },
        );
        user_sessions.entry(user_id).or_default().insert(session_id);

        tracing::debug!(session_id = %session_id, user_id = %user_id, "会话已登记到注册表");
        receiver
    }

    /// 移除会话句柄。幂等。
    pub async fn unregister(&self, session_id: SessionId) {
        let mut sessions = self.sessions.write().await;
        let mut user_sessions = self.user_sessions.write().await;

        if let Some(handle) = sessions.remove(&session_id) {
            if let Some(ids) = user_sessions.get_mut(&handle.user_id) {
                ids.remove(&session_id);
                if ids.is_empty() {
                    user_sessions.remove(&handle.user_id);
                }
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn sessions_of(&self, user_id: UserId) -> Vec<SessionId> {
        self.user_sessions
            .read()
            .await
            .get(&user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageFanout for SessionRegistry {
    async fn deliver(&self, broadcast: MessageBroadcast) -> Result<(), BroadcastError> {
        let dto = MessageDto::from(&broadcast.message);

        let sessions = self.sessions.read().await;
        let user_sessions = self.user_sessions.read().await;

        // 目标会话集合：参与者的所有会话；被标记的消息加上全部在线员工会话。
        // 去重保证对每个会话至多投递一次。
        let mut target_sessions: HashSet<SessionId> = HashSet::new();
        for target in &broadcast.targets {
            if let Some(ids) = user_sessions.get(target) {
                target_sessions.extend(ids.iter().copied());
            }
        }
        if broadcast.to_staff {
            target_sessions.extend(
                sessions
                    .iter()
                    .filter(|(_, handle)| handle.role.is_staff())
                    .map(|(id, _)| *id),
            );
        }

        let mut delivered = 0usize;
        for session_id in &target_sessions {
            let Some(handle) = sessions.get(session_id) else {
                continue;
            };
            // try_send 有界非阻塞：缓冲满时放弃本次投递，
            // 客户端重连后通过历史查询补齐
            match handle.sender.try_send(dto.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        session_id = %session_id,
                        user_id = %handle.user_id,
                        "会话出站缓冲已满，本次投递丢弃"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(session_id = %session_id, "会话接收端已关闭");
                }
            }
        }

        tracing::debug!(
            room_id = %broadcast.room_id,
            message_id = %broadcast.message.id,
            delivered,
            "消息分发完成"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Message, MessageContent, MessageId, Role, RoomId, Timestamp};
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn message(room_id: RoomId, sender: UserId, at: Timestamp) -> Message {
        Message::new(
            MessageId::new(Uuid::new_v4()),
            room_id,
            sender,
            Role::Buyer,
            MessageContent::new("hi").unwrap(),
            at,
        )
        .unwrap()
    }

    fn broadcast(targets: Vec<UserId>, sender: UserId, to_staff: bool) -> MessageBroadcast {
        let room_id = RoomId::new(Uuid::new_v4());
        MessageBroadcast {
            room_id,
            targets,
            to_staff,
            message: message(room_id, sender, OffsetDateTime::now_utc()),
        }
    }

    #[tokio::test]
    async fn test_delivers_to_all_target_sessions() {
        let registry = SessionRegistry::new(8);
        let buyer = UserId::new(Uuid::new_v4());
        let seller = UserId::new(Uuid::new_v4());

        let mut buyer_rx = registry
            .register(SessionId::generate(), buyer, Role::Buyer)
            .await;
        let mut buyer_rx2 = registry
            .register(SessionId::generate(), buyer, Role::Buyer)
            .await;
        let mut seller_rx = registry
            .register(SessionId::generate(), seller, Role::Seller)
            .await;

        registry
            .deliver(broadcast(vec![buyer, seller], buyer, false))
            .await
            .unwrap();

        // 发送者的所有会话与对方会话各收到一次
        assert!(buyer_rx.try_recv().is_ok());
        assert!(buyer_rx2.try_recv().is_ok());
        assert!(seller_rx.try_recv().is_ok());
        assert!(buyer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_offline_target_is_skipped() {
        let registry = SessionRegistry::new(8);
        let buyer = UserId::new(Uuid::new_v4());
        let seller = UserId::new(Uuid::new_v4());

        let mut buyer_rx = registry
            .register(SessionId::generate(), buyer, Role::Buyer)
            .await;

        // seller 无在线会话：不报错，不补发
        registry
            .deliver(broadcast(vec![buyer, seller], buyer, false))
            .await
            .unwrap();
        assert!(buyer_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_flagged_message_reaches_online_staff() {
        let registry = SessionRegistry::new(8);
        let buyer = UserId::new(Uuid::new_v4());
        let moderator = UserId::new(Uuid::new_v4());

        let mut buyer_rx = registry
            .register(SessionId::generate(), buyer, Role::Buyer)
            .await;
        // 在线但未被指派到该房间的审核员
        let mut moderator_rx = registry
            .register(SessionId::generate(), moderator, Role::Moderator)
            .await;

        registry
            .deliver(broadcast(vec![buyer], buyer, true))
            .await
            .unwrap();

        assert!(buyer_rx.try_recv().is_ok());
        assert!(moderator_rx.try_recv().is_ok());

        // 未标记的消息不会打扰无关员工
        registry
            .deliver(broadcast(vec![buyer], buyer, false))
            .await
            .unwrap();
        assert!(moderator_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_staff_target_is_deduplicated() {
        let registry = SessionRegistry::new(8);
        let buyer = UserId::new(Uuid::new_v4());
        let moderator = UserId::new(Uuid::new_v4());

        let mut moderator_rx = registry
            .register(SessionId::generate(), moderator, Role::Moderator)
            .await;

        // 审核员既是分发目标又是在线员工：仍然只收到一次
        registry
            .deliver(broadcast(vec![buyer, moderator], buyer, true))
            .await
            .unwrap();
        assert!(moderator_rx.try_recv().is_ok());
        assert!(moderator_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery_and_is_idempotent() {
        let registry = SessionRegistry::new(8);
        let buyer = UserId::new(Uuid::new_v4());
        let session = SessionId::generate();

        let mut rx = registry.register(session, buyer, Role::Buyer).await;
        registry.unregister(session).await;
        registry.unregister(session).await;
        assert_eq!(registry.session_count().await, 0);

        registry
            .deliver(broadcast(vec![buyer], buyer, false))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_session_does_not_block() {
        let registry = SessionRegistry::new(1);
        let buyer = UserId::new(Uuid::new_v4());
        let _rx = registry.register(SessionId::generate(), buyer, Role::Buyer).await;

        // 缓冲为1：第二次投递对慢速会话直接丢弃而不是阻塞
        registry
            .deliver(broadcast(vec![buyer], buyer, false))
            .await
            .unwrap();
        registry
            .deliver(broadcast(vec![buyer], buyer, false))
            .await
            .unwrap();
    }
}
