//! 会话消息管道
//!
//! 接收发往房间的消息：校验成员资格、落库、违禁词检查、
//! 命中后生成监控告警，并向在线参与者分发。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use domain::{
    AlertId, ChatRoom, DomainError, Message, MessageContent, MessageId, MonitoringAlert, Role,
    RoomId, UserId,
};

use crate::broadcaster::{MessageBroadcast, MessageFanout};
use crate::clock::Clock;
use crate::content_filter::ContentFilter;
use crate::dto::{MessageDto, RoomDto};
use crate::error::ApplicationError;
use crate::repository::{AlertRepository, ChatRoomRepository, MessageRepository};

/// 发消息请求
#[derive(Debug, Clone)]
pub struct PostMessageRequest {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_role: Role,
    pub content: String,
}

pub struct ChatServiceDependencies {
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub alert_repository: Arc<dyn AlertRepository>,
    pub fanout: Arc<dyn MessageFanout>,
    pub content_filter: Arc<ContentFilter>,
    pub clock: Arc<dyn Clock>,
}

pub struct ChatService {
    room_repository: Arc<dyn ChatRoomRepository>,
    message_repository: Arc<dyn MessageRepository>,
    alert_repository: Arc<dyn AlertRepository>,
    fanout: Arc<dyn MessageFanout>,
    content_filter: Arc<ContentFilter>,
    clock: Arc<dyn Clock>,
    // 房间内消息的落库+分发顺序锁
    room_locks: Mutex<HashMap<RoomId, Arc<Mutex<()>>>>,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self {
            room_repository: deps.room_repository,
            message_repository: deps.message_repository,
            alert_repository: deps.alert_repository,
            fanout: deps.fanout,
            content_filter: deps.content_filter,
            clock: deps.clock,
            room_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 创建买卖双方会话房间。创建者必须是其中一方，员工角色除外。
    pub async fn create_room(
        &self,
        buyer_id: UserId,
        seller_id: UserId,
        creator_id: UserId,
        creator_role: Role,
    ) -> Result<RoomDto, ApplicationError> {
        if !creator_role.is_staff() && creator_id != buyer_id && creator_id != seller_id {
            return Err(ApplicationError::Authorization);
        }

        let now = self.clock.now();
        let room = ChatRoom::new(RoomId::new(Uuid::new_v4()), buyer_id, seller_id, now)?;
        let room = self.room_repository.create(room).await?;

        tracing::info!(room_id = %room.id, buyer_id = %buyer_id, seller_id = %seller_id, "会话房间已创建");
        Ok(RoomDto::from(&room))
    }

    /// 查询房间。仅成员和员工可见。
    pub async fn get_room(
        &self,
        room_id: RoomId,
        caller_id: UserId,
        caller_role: Role,
    ) -> Result<RoomDto, ApplicationError> {
        let room = self.require_room(room_id).await?;
        if !caller_role.is_staff() && !room.is_member(caller_id) {
            return Err(ApplicationError::Domain(DomainError::NotAMember));
        }
        Ok(RoomDto::from(&room))
    }

    /// 发送消息
    ///
    /// 房间内持锁完成 落库 -> 违禁检查 -> 告警 -> 分发，
    /// 保证同一房间的分发顺序与落库顺序一致（仅房间内有序）。
    pub async fn post_message(
        &self,
        request: PostMessageRequest,
    ) -> Result<MessageDto, ApplicationError> {
        let room = self.require_room(request.room_id).await?;
        if !room.is_member(request.sender_id) {
            return Err(ApplicationError::Domain(DomainError::NotAMember));
        }

        let content = MessageContent::new(request.content)?;
        let lock = self.room_lock(room.id).await;
        let _ordering = lock.lock().await;

        let now = self.clock.now();
        let mut message = Message::new(
            MessageId::new(Uuid::new_v4()),
            room.id,
            request.sender_id,
            request.sender_role,
            content,
            now,
        )?;

        if let Some(term) = self.content_filter.first_match(message.content.as_str()) {
            tracing::info!(
                room_id = %room.id,
                sender_id = %request.sender_id,
                term = %term,
                "消息命中违禁词，标记待审核"
            );
            message.mark_flagged();
        }

        let message = self.message_repository.save(message).await?;

        if message.flagged {
            self.escalate_flagged(&room, &message).await?;
        }

        let broadcast = MessageBroadcast {
            room_id: room.id,
            targets: room.fanout_targets(),
            to_staff: message.flagged,
            message: message.clone(),
        };
        if let Err(err) = self.fanout.deliver(broadcast).await {
            // 分发尽力而为，失败不回滚已落库的消息
            tracing::warn!(error = %err, room_id = %room.id, "消息分发失败");
        }

        Ok(MessageDto::from(&message))
    }

    /// 编辑消息。只有发送者本人可以编辑；原始内容被替换但 edited 标记保留痕迹。
    pub async fn edit_message(
        &self,
        message_id: MessageId,
        editor_id: UserId,
        new_content: String,
    ) -> Result<MessageDto, ApplicationError> {
        let mut message = self.require_message(message_id).await?;
        if message.sender_id != editor_id {
            return Err(ApplicationError::Domain(DomainError::OperationNotAllowed));
        }

        message.edit(MessageContent::new(new_content)?)?;
        let message = self.message_repository.update(message).await?;
        Ok(MessageDto::from(&message))
    }

    /// 软删除消息。发送者本人或员工角色可删；内容保留供审核追溯。
    pub async fn soft_delete_message(
        &self,
        message_id: MessageId,
        actor_id: UserId,
        actor_role: Role,
    ) -> Result<(), ApplicationError> {
        let mut message = self.require_message(message_id).await?;
        if message.sender_id != actor_id && !actor_role.is_staff() {
            return Err(ApplicationError::Domain(DomainError::OperationNotAllowed));
        }

        message.mark_deleted();
        self.message_repository.update(message).await?;
        Ok(())
    }

    /// 房间历史，按落库顺序升序。非员工调用方看不到已软删除的消息。
    pub async fn get_history(
        &self,
        room_id: RoomId,
        caller_id: UserId,
        caller_role: Role,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<MessageDto>, ApplicationError> {
        let room = self.require_room(room_id).await?;
        if !caller_role.is_staff() && !room.is_member(caller_id) {
            return Err(ApplicationError::Domain(DomainError::NotAMember));
        }

        let messages = self
            .message_repository
            .list_recent(room_id, limit, before)
            .await?;

        Ok(messages
            .iter()
            .filter(|m| caller_role.is_staff() || !m.deleted)
            .map(MessageDto::from)
            .collect())
    }

    async fn require_room(&self, room_id: RoomId) -> Result<ChatRoom, ApplicationError> {
        self.room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::RoomNotFound))
    }

    async fn require_message(&self, message_id: MessageId) -> Result<Message, ApplicationError> {
        self.message_repository
            .find_by_id(message_id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::MessageNotFound))
    }

    /// 命中违禁词后生成 Open 告警。
    /// 举报人取发送者的交易对手方；审核员自己触发时记在自己名下。
    async fn escalate_flagged(
        &self,
        room: &ChatRoom,
        message: &Message,
    ) -> Result<(), ApplicationError> {
        let reporter = room
            .counterpart_of(message.sender_id)
            .unwrap_or(message.sender_id);
        let alert = MonitoringAlert::new(
            AlertId::new(Uuid::new_v4()),
            reporter,
            message.sender_id,
            Some(room.id),
            self.clock.now(),
        );
        let alert = self.alert_repository.create(alert).await?;
        tracing::info!(
            alert_id = %alert.id,
            room_id = %room.id,
            problematic_user = %message.sender_id,
            "已生成监控告警"
        );
        Ok(())
    }

    async fn room_lock(&self, room_id: RoomId) -> Arc<Mutex<()>> {
        let mut locks = self.room_locks.lock().await;
        locks
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::memory::MemoryFanout;
    use crate::clock::ManualClock;
    use crate::repository::memory::{
        MemoryAlertRepository, MemoryChatRoomRepository, MemoryMessageRepository,
    };
    use domain::AlertStatus;
    use time::OffsetDateTime;

    struct Fixture {
        service: ChatService,
        fanout: Arc<MemoryFanout>,
        alerts: Arc<MemoryAlertRepository>,
        rooms: Arc<MemoryChatRoomRepository>,
        buyer: UserId,
        seller: UserId,
    }

    async fn fixture() -> Fixture {
        let rooms = Arc::new(MemoryChatRoomRepository::new());
        let messages = Arc::new(MemoryMessageRepository::new());
        let alerts = Arc::new(MemoryAlertRepository::new());
        let fanout = Arc::new(MemoryFanout::new());
        let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
        let filter = Arc::new(ContentFilter::new(vec!["free contact info".to_string()]));

        let service = ChatService::new(ChatServiceDependencies {
            room_repository: rooms.clone(),
            message_repository: messages,
            alert_repository: alerts.clone(),
            fanout: fanout.clone(),
            content_filter: filter,
            clock,
        });

        Fixture {
            service,
            fanout,
            alerts,
            rooms,
            buyer: UserId::new(Uuid::new_v4()),
            seller: UserId::new(Uuid::new_v4()),
        }
    }

    async fn create_room(fixture: &Fixture) -> RoomId {
        fixture
            .service
            .create_room(fixture.buyer, fixture.seller, fixture.buyer, Role::Buyer)
            .await
            .unwrap()
            .id
    }

    fn post(fixture: &Fixture, room_id: RoomId, content: &str) -> PostMessageRequest {
        PostMessageRequest {
            room_id,
            sender_id: fixture.buyer,
            sender_role: Role::Buyer,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_post_message_round_trip() {
        let fixture = fixture().await;
        let room_id = create_room(&fixture).await;

        let first = fixture
            .service
            .post_message(post(&fixture, room_id, "is it available?"))
            .await
            .unwrap();
        let second = fixture
            .service
            .post_message(post(&fixture, room_id, "still there?"))
            .await
            .unwrap();

        // 落库后立即读取：内容、发送者、顺序位置一致
        let history = fixture
            .service
            .get_history(room_id, fixture.buyer, Role::Buyer, 50, None)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[0].content, "is it available?");
        assert_eq!(history[0].sender_id, fixture.buyer);
        assert_eq!(history[1].id, second.id);
    }

    #[tokio::test]
    async fn test_post_to_unknown_room() {
        let fixture = fixture().await;
        let result = fixture
            .service
            .post_message(post(&fixture, RoomId::new(Uuid::new_v4()), "hi"))
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::RoomNotFound))
        ));
    }

    #[tokio::test]
    async fn test_stranger_cannot_post() {
        let fixture = fixture().await;
        let room_id = create_room(&fixture).await;

        let result = fixture
            .service
            .post_message(PostMessageRequest {
                room_id,
                sender_id: UserId::new(Uuid::new_v4()),
                sender_role: Role::Buyer,
                content: "let me in".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::NotAMember))
        ));
    }

    #[tokio::test]
    async fn test_unassigned_moderator_cannot_post() {
        let fixture = fixture().await;
        let room_id = create_room(&fixture).await;
        let moderator = UserId::new(Uuid::new_v4());

        let request = PostMessageRequest {
            room_id,
            sender_id: moderator,
            sender_role: Role::Moderator,
            content: "checking in".to_string(),
        };
        let result = fixture.service.post_message(request.clone()).await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::NotAMember))
        ));

        // 指派后即可发言
        let now = OffsetDateTime::now_utc();
        fixture
            .rooms
            .set_moderator(room_id, Some(moderator), now)
            .await
            .unwrap();
        assert!(fixture.service.post_message(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_flagged_message_creates_open_alert_and_fans_out() {
        let fixture = fixture().await;
        let room_id = create_room(&fixture).await;

        let message = fixture
            .service
            .post_message(post(&fixture, room_id, "free contact info: a@b.example"))
            .await
            .unwrap();
        assert!(message.flagged);

        // Open 告警：举报人为对手方，被举报人为发送者
        let alerts = fixture.alerts.list_newest_first().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].status, AlertStatus::Open);
        assert_eq!(alerts[0].reporter_id, fixture.seller);
        assert_eq!(alerts[0].problematic_user_id, fixture.buyer);
        assert_eq!(alerts[0].room_id, Some(room_id));

        // 分发目标包含双方，被标记的消息照常分发并抄送在线员工
        let deliveries = fixture.fanout.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].targets.contains(&fixture.buyer));
        assert!(deliveries[0].targets.contains(&fixture.seller));
        assert!(deliveries[0].message.flagged);
        assert!(deliveries[0].to_staff);
    }

    #[tokio::test]
    async fn test_clean_message_creates_no_alert() {
        let fixture = fixture().await;
        let room_id = create_room(&fixture).await;

        fixture
            .service
            .post_message(post(&fixture, room_id, "how about 50?"))
            .await
            .unwrap();
        assert!(fixture.alerts.list_newest_first().await.unwrap().is_empty());

        let deliveries = fixture.fanout.deliveries().await;
        assert!(!deliveries[0].to_staff);
    }

    #[tokio::test]
    async fn test_edit_is_sender_only() {
        let fixture = fixture().await;
        let room_id = create_room(&fixture).await;
        let message = fixture
            .service
            .post_message(post(&fixture, room_id, "typo"))
            .await
            .unwrap();

        let result = fixture
            .service
            .edit_message(message.id, fixture.seller, "hijacked".to_string())
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::OperationNotAllowed))
        ));

        let edited = fixture
            .service
            .edit_message(message.id, fixture.buyer, "fixed".to_string())
            .await
            .unwrap();
        assert!(edited.edited);
        assert_eq!(edited.content, "fixed");
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_members_not_staff() {
        let fixture = fixture().await;
        let room_id = create_room(&fixture).await;
        let message = fixture
            .service
            .post_message(post(&fixture, room_id, "regret this"))
            .await
            .unwrap();

        fixture
            .service
            .soft_delete_message(message.id, fixture.buyer, Role::Buyer)
            .await
            .unwrap();

        let member_view = fixture
            .service
            .get_history(room_id, fixture.buyer, Role::Buyer, 50, None)
            .await
            .unwrap();
        assert!(member_view.is_empty());

        // 员工仍然能看到软删除的消息，内容保留
        let staff = UserId::new(Uuid::new_v4());
        let staff_view = fixture
            .service
            .get_history(room_id, staff, Role::Admin, 50, None)
            .await
            .unwrap();
        assert_eq!(staff_view.len(), 1);
        assert!(staff_view[0].deleted);
        assert_eq!(staff_view[0].content, "regret this");
    }

    #[tokio::test]
    async fn test_room_creation_requires_participant_or_staff() {
        let fixture = fixture().await;
        let outsider = UserId::new(Uuid::new_v4());

        let result = fixture
            .service
            .create_room(fixture.buyer, fixture.seller, outsider, Role::Buyer)
            .await;
        assert!(matches!(result, Err(ApplicationError::Authorization)));

        let by_staff = fixture
            .service
            .create_room(fixture.buyer, fixture.seller, outsider, Role::Admin)
            .await;
        assert!(by_staff.is_ok());
    }
}
