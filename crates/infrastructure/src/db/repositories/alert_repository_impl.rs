use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use application::AlertRepository;
use domain::{
    AlertId, AlertStatus, MonitoringAlert, RepositoryError, RoomId, Timestamp, UserId,
};

use crate::db::{invalid_data, is_transient, map_sqlx_err};
use crate::retry::{retry_async, RetryPolicy};

#[derive(Debug, FromRow)]
struct AlertRecord {
    id: Uuid,
    reporter_id: Uuid,
    problematic_user_id: Uuid,
    room_id: Option<Uuid>,
    status: String,
    responsible_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<AlertRecord> for MonitoringAlert {
    type Error = RepositoryError;

    fn try_from(value: AlertRecord) -> Result<Self, Self::Error> {
        let status =
            AlertStatus::parse(&value.status).map_err(|err| invalid_data(err.to_string()))?;
        Ok(MonitoringAlert::with_fields(
            AlertId::from(value.id),
            UserId::from(value.reporter_id),
            UserId::from(value.problematic_user_id),
            value.room_id.map(RoomId::from),
            status,
            value.responsible_id.map(UserId::from),
            value.created_at,
            value.updated_at,
        ))
    }
}

const ALERT_COLUMNS: &str =
    "id, reporter_id, problematic_user_id, room_id, status, responsible_id, created_at, updated_at";

pub struct PgAlertRepository {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn create(&self, alert: MonitoringAlert) -> Result<MonitoringAlert, RepositoryError> {
        let sql = format!(
            r#"
            INSERT INTO monitoring_alerts
                (id, reporter_id, problematic_user_id, room_id, status, responsible_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ALERT_COLUMNS}
            "#
        );
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, AlertRecord>(&sql)
                .bind(Uuid::from(alert.id))
                .bind(Uuid::from(alert.reporter_id))
                .bind(Uuid::from(alert.problematic_user_id))
                .bind(alert.room_id.map(Uuid::from))
                .bind(alert.status.as_str())
                .bind(alert.responsible_id.map(Uuid::from))
                .bind(alert.created_at)
                .bind(alert.updated_at)
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

    async fn find_by_id(&self, id: AlertId) -> Result<Option<MonitoringAlert>, RepositoryError> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM monitoring_alerts WHERE id = $1");
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, AlertRecord>(&sql)
                .bind(Uuid::from(id))
                .fetch_optional(&self.pool)
                .await
        })
        .await
        .map_err(map_sqlx_err)?;

        record.map(MonitoringAlert::try_from).transpose()
    }

    async fn list_newest_first(&self) -> Result<Vec<MonitoringAlert>, RepositoryError> {
        let sql =
            format!("SELECT {ALERT_COLUMNS} FROM monitoring_alerts ORDER BY created_at DESC");
        let records = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, AlertRecord>(&sql)
                .fetch_all(&self.pool)
                .await
        })
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(MonitoringAlert::try_from).collect()
    }

    async fn assign_responsible(
        &self,
        id: AlertId,
        responsible_id: Option<UserId>,
        now: Timestamp,
    ) -> Result<MonitoringAlert, RepositoryError> {
        // 指派与 Open -> InReview 推进在同一条语句内完成（后写者胜）
        let sql = format!(
            r#"
            UPDATE monitoring_alerts
            SET responsible_id = $2,
                status = CASE
                    WHEN $2::uuid IS NOT NULL AND status = 'open' THEN 'in_review'
                    ELSE status
                END,
                updated_at = $3
            WHERE id = $1
            RETURNING {ALERT_COLUMNS}
            "#
        );
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, AlertRecord>(&sql)
                .bind(Uuid::from(id))
                .bind(responsible_id.map(Uuid::from))
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

    async fn update_status(
        &self,
        id: AlertId,
        expected: AlertStatus,
        next: AlertStatus,
        now: Timestamp,
    ) -> Result<MonitoringAlert, RepositoryError> {
        // compare-and-set：当前状态已变化时不写入，返回 Conflict
        let sql = format!(
            r#"
            UPDATE monitoring_alerts
            SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {ALERT_COLUMNS}
            "#
        );
        let record = retry_async(&self.retry, is_transient, || async {
            sqlx::query_as::<_, AlertRecord>(&sql)
                .bind(Uuid::from(id))
                .bind(expected.as_str())
                .bind(next.as_str())
                .bind(now)
                .fetch_optional(&self.pool)
                .await
        })
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => record.try_into(),
            None => {
                // 区分 不存在 与 状态被并发修改
                match self.find_by_id(id).await? {
                    Some(_) => Err(RepositoryError::Conflict),
                    None => Err(RepositoryError::NotFound),
                }
            }
        }
    }
}
