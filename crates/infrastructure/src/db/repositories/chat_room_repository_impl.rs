use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use application::ChatRoomRepository;
use domain::{ChatRoom, RepositoryError, RoomId, Timestamp, UserId};

use crate::db::{invalid_data, is_transient, map_sqlx_err};
use crate::retry::{retry_async, RetryPolicy};

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    buyer_id: Uuid,
    seller_id: Uuid,
    moderator_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<RoomRecord> for ChatRoom {
    type Error = RepositoryError;

    fn try_from(value: RoomRecord) -> Result<Self, Self::Error> {
        ChatRoom::with_fields(
            RoomId::from(value.id),
            UserId::from(value.buyer_id),
            UserId::from(value.seller_id),
            value.moderator_id.map(UserId::from),
            value.created_at,
            value.updated_at,
        )
        .map_err(|err| invalid_data(err.to_string()))
    }
}

pub struct PgChatRoomRepository {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, RoomRecord>(
                r#"
                INSERT INTO chat_rooms (id, buyer_id, seller_id, moderator_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, buyer_id, seller_id, moderator_id, created_at, updated_at
                "#,
            )
            .bind(Uuid::from(room.id))
            .bind(Uuid::from(room.buyer_id))
            .bind(Uuid::from(room.seller_id))
            .bind(room.moderator_id.map(Uuid::from))
            .bind(room.created_at)
            .bind(room.updated_at)
            .fetch_one(&self.pool)
            .await
        })
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
            _ => map_sqlx_err(err),
        })?;

        record.try_into()
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError> {
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, RoomRecord>(
                r#"
                SELECT id, buyer_id, seller_id, moderator_id, created_at, updated_at
                FROM chat_rooms WHERE id = $1
                "#,
            )
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
        })
        .await
        .map_err(map_sqlx_err)?;

        record.map(ChatRoom::try_from).transpose()
    }

    async fn set_moderator(
        &self,
        id: RoomId,
        moderator_id: Option<UserId>,
        now: Timestamp,
    ) -> Result<ChatRoom, RepositoryError> {
        // 单语句写入：并发指派后写者胜，不存在丢更新窗口
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, RoomRecord>(
                r#"
                UPDATE chat_rooms
                SET moderator_id = $2, updated_at = $3
                WHERE id = $1
                RETURNING id, buyer_id, seller_id, moderator_id, created_at, updated_at
                "#,
            )
            .bind(Uuid::from(id))
            .bind(moderator_id.map(Uuid::from))
            .bind(now)
            .fetch_optional(&self.pool)
            .await
        })
        .await
        .map_err(map_sqlx_err)?;

        record
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }
}
