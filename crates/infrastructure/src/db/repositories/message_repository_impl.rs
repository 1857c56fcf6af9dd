use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use application::MessageRepository;
use domain::{Message, MessageContent, MessageId, RepositoryError, Role, RoomId, UserId};

use crate::db::{invalid_data, is_transient, map_sqlx_err};
use crate::retry::{retry_async, RetryPolicy};

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    sender_role: String,
    content: String,
    edited: bool,
    deleted: bool,
    flagged: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let sender_role =
            Role::parse(&value.sender_role).map_err(|err| invalid_data(err.to_string()))?;
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;

        let mut message = Message::new(
            MessageId::from(value.id),
            RoomId::from(value.room_id),
            UserId::from(value.sender_id),
            sender_role,
            content,
            value.created_at,
        )
        .map_err(|err| invalid_data(err.to_string()))?;
        message.edited = value.edited;
        message.deleted = value.deleted;
        message.flagged = value.flagged;
        Ok(message)
    }
}

pub struct PgMessageRepository {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn save(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, MessageRecord>(
                r#"
                INSERT INTO messages
                    (id, room_id, sender_id, sender_role, content, edited, deleted, flagged, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id, room_id, sender_id, sender_role, content, edited, deleted, flagged, created_at
                "#,
            )
            .bind(Uuid::from(message.id))
            .bind(Uuid::from(message.room_id))
            .bind(Uuid::from(message.sender_id))
            .bind(message.sender_role.as_str())
            .bind(message.content.as_str())
            .bind(message.edited)
            .bind(message.deleted)
            .bind(message.flagged)
            .bind(message.created_at)
            .fetch_one(&self.pool)
            .await
        })
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
            _ => map_sqlx_err(err),
        })?;

        record.try_into()
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, MessageRecord>(
                r#"
                SELECT id, room_id, sender_id, sender_role, content, edited, deleted, flagged, created_at
                FROM messages WHERE id = $1
                "#,
            )
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
        })
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn update(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, MessageRecord>(
                r#"
                UPDATE messages
                SET content = $2, edited = $3, deleted = $4, flagged = $5
                WHERE id = $1
                RETURNING id, room_id, sender_id, sender_role, content, edited, deleted, flagged, created_at
                "#,
            )
            .bind(Uuid::from(message.id))
            .bind(message.content.as_str())
            .bind(message.edited)
            .bind(message.deleted)
            .bind(message.flagged)
            .fetch_optional(&self.pool)
            .await
        })
        .await
        .map_err(map_sqlx_err)?;

        record
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    async fn list_recent(
        &self,
        room_id: RoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, RepositoryError> {
        // seq 为落库顺序；取最近一页后翻转为升序返回
        let records = retry_async(&self.retry, is_transient, || async {
            match before {
                Some(before_id) => {
                    sqlx::query_as::<_, MessageRecord>(
                        r#"
                        SELECT id, room_id, sender_id, sender_role, content, edited, deleted, flagged, created_at
                        FROM messages
                        WHERE room_id = $1
                          AND seq < (SELECT seq FROM messages WHERE id = $2)
                        ORDER BY seq DESC
                        LIMIT $3
                        "#,
                    )
                    .bind(Uuid::from(room_id))
                    .bind(Uuid::from(before_id))
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await
                }
                None => {
                    sqlx::query_as::<_, MessageRecord>(
                        r#"
                        SELECT id, room_id, sender_id, sender_role, content, edited, deleted, flagged, created_at
                        FROM messages
                        WHERE room_id = $1
                        ORDER BY seq DESC
                        LIMIT $2
                        "#,
                    )
                    .bind(Uuid::from(room_id))
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await
                }
            }
        })
        .await
        .map_err(map_sqlx_err)?;

        let mut messages: Vec<Message> = records
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<_, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}
