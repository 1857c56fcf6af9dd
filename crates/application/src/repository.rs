use async_trait::async_trait;
use domain::{
    AlertId, AlertStatus, ChatRoom, Message, MessageId, MonitoringAlert, RepositoryError, RoomId,
    Timestamp, UserId,
};

#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError>;
    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError>;

    /// 原子地更新房间的负责审核员（单语句写入，后写者胜）。
    /// 不允许读-改-写，否则并发指派会丢更新。
    async fn set_moderator(
        &self,
        id: RoomId,
        moderator_id: Option<UserId>,
        now: Timestamp,
    ) -> Result<ChatRoom, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    // 保存消息到数据库，确保每条消息立即持久化
    async fn save(&self, message: Message) -> Result<Message, RepositoryError>;

    // 根据ID查找消息
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError>;

    // 标记位更新（编辑/软删除/违禁标记）
    async fn update(&self, message: Message) -> Result<Message, RepositoryError>;

    // 获取房间最近的消息，按落库顺序升序返回（支持分页）
    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn create(&self, alert: MonitoringAlert) -> Result<MonitoringAlert, RepositoryError>;
    async fn find_by_id(&self, id: AlertId) -> Result<Option<MonitoringAlert>, RepositoryError>;

    /// 全部告警，最新的在前
    async fn list_newest_first(&self) -> Result<Vec<MonitoringAlert>, RepositoryError>;

    /// 原子地指派负责人。对 Open 告警指派非空负责人时在同一语句内推进到 InReview。
    async fn assign_responsible(
        &self,
        id: AlertId,
        responsible_id: Option<UserId>,
        now: Timestamp,
    ) -> Result<MonitoringAlert, RepositoryError>;

    /// 带前置状态校验的状态更新（compare-and-set）。
    /// 当前状态已不是 expected 时返回 Conflict，调用方重新读取后决定。
    async fn update_status(
        &self,
        id: AlertId,
        expected: AlertStatus,
        next: AlertStatus,
        now: Timestamp,
    ) -> Result<MonitoringAlert, RepositoryError>;
}

/// 内存实现（用于测试和单进程开发）
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemoryChatRoomRepository {
        rooms: RwLock<HashMap<RoomId, ChatRoom>>,
    }

    impl MemoryChatRoomRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ChatRoomRepository for MemoryChatRoomRepository {
        async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
            let mut rooms = self.rooms.write().await;
            if rooms.contains_key(&room.id) {
                return Err(RepositoryError::Conflict);
            }
            rooms.insert(room.id, room.clone());
            Ok(room)
        }

        async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError> {
            Ok(self.rooms.read().await.get(&id).cloned())
        }

        async fn set_moderator(
            &self,
            id: RoomId,
            moderator_id: Option<UserId>,
            now: Timestamp,
        ) -> Result<ChatRoom, RepositoryError> {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            room.assign_moderator(moderator_id, now);
            Ok(room.clone())
        }
    }

    #[derive(Default)]
    pub struct MemoryMessageRepository {
        // 按插入顺序保存，落库顺序即房间内的分发顺序
        messages: RwLock<Vec<Message>>,
    }

    impl MemoryMessageRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl MessageRepository for MemoryMessageRepository {
        async fn save(&self, message: Message) -> Result<Message, RepositoryError> {
            let mut messages = self.messages.write().await;
            if messages.iter().any(|m| m.id == message.id) {
                return Err(RepositoryError::Conflict);
            }
            messages.push(message.clone());
            Ok(message)
        }

        async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
            Ok(self
                .messages
                .read()
                .await
                .iter()
                .find(|m| m.id == id)
                .cloned())
        }

        async fn update(&self, message: Message) -> Result<Message, RepositoryError> {
            let mut messages = self.messages.write().await;
            let slot = messages
                .iter_mut()
                .find(|m| m.id == message.id)
                .ok_or(RepositoryError::NotFound)?;
            *slot = message.clone();
            Ok(message)
        }

        async fn list_recent(
            &self,
            room_id: RoomId,
            limit: u32,
            before: Option<MessageId>,
        ) -> Result<Vec<Message>, RepositoryError> {
            let messages = self.messages.read().await;
            let room_messages: Vec<&Message> =
                messages.iter().filter(|m| m.room_id == room_id).collect();

            let end = match before {
                Some(before_id) => room_messages
                    .iter()
                    .position(|m| m.id == before_id)
                    .unwrap_or(room_messages.len()),
                None => room_messages.len(),
            };

            let start = end.saturating_sub(limit as usize);
            Ok(room_messages[start..end].iter().map(|m| (*m).clone()).collect())
        }
    }

    #[derive(Default)]
    pub struct MemoryAlertRepository {
        alerts: RwLock<Vec<MonitoringAlert>>,
    }

    impl MemoryAlertRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl AlertRepository for MemoryAlertRepository {
        async fn create(&self, alert: MonitoringAlert) -> Result<MonitoringAlert, RepositoryError> {
            let mut alerts = self.alerts.write().await;
            if alerts.iter().any(|a| a.id == alert.id) {
                return Err(RepositoryError::Conflict);
            }
            alerts.push(alert.clone());
            Ok(alert)
        }

        async fn find_by_id(&self, id: AlertId) -> Result<Option<MonitoringAlert>, RepositoryError> {
            Ok(self
                .alerts
                .read()
                .await
                .iter()
                .find(|a| a.id == id)
                .cloned())
        }

        async fn list_newest_first(&self) -> Result<Vec<MonitoringAlert>, RepositoryError> {
            let alerts = self.alerts.read().await;
            let mut all: Vec<MonitoringAlert> = alerts.clone();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(all)
        }

        async fn assign_responsible(
            &self,
            id: AlertId,
            responsible_id: Option<UserId>,
            now: Timestamp,
        ) -> Result<MonitoringAlert, RepositoryError> {
            let mut alerts = self.alerts.write().await;
            let alert = alerts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or(RepositoryError::NotFound)?;
            alert.assign_responsible(responsible_id, now);
            Ok(alert.clone())
        }

        async fn update_status(
            &self,
            id: AlertId,
            expected: AlertStatus,
            next: AlertStatus,
            now: Timestamp,
        ) -> Result<MonitoringAlert, RepositoryError> {
            let mut alerts = self.alerts.write().await;
            let alert = alerts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or(RepositoryError::NotFound)?;
            if alert.status != expected {
                return Err(RepositoryError::Conflict);
            }
            alert.status = next;
            alert.updated_at = now;
            Ok(alert.clone())
        }
    }
}
