//! 审核协调器
//!
//! 持有告警的指派状态与状态机：任一房间/告警同一时刻至多一名
//! 负责审核员；状态按严格流转表推进。指派采用后写者胜，
//! 并发覆盖而不是报错。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use domain::{AlertId, AlertStatus, DomainError, MonitoringAlert, RepositoryError, RoomId, UserId};

use crate::clock::Clock;
use crate::directory::UserDirectory;
use crate::dto::AlertView;
use crate::error::ApplicationError;
use crate::repository::{AlertRepository, ChatRoomRepository};

/// 状态更新与并发修改赛跑时的重读次数上限
const STATUS_UPDATE_ATTEMPTS: u32 = 3;

pub struct ModerationServiceDependencies {
    pub alert_repository: Arc<dyn AlertRepository>,
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub directory: Arc<dyn UserDirectory>,
    pub clock: Arc<dyn Clock>,
}

pub struct ModerationService {
    alert_repository: Arc<dyn AlertRepository>,
    room_repository: Arc<dyn ChatRoomRepository>,
    directory: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    // 串行化同一告警的 告警行+房间行 两步指派写入
    assignment_locks: Mutex<HashMap<AlertId, Arc<Mutex<()>>>>,
}

impl ModerationService {
    pub fn new(deps: ModerationServiceDependencies) -> Self {
        Self {
            alert_repository: deps.alert_repository,
            room_repository: deps.room_repository,
            directory: deps.directory,
            clock: deps.clock,
            assignment_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 全部告警，最新的在前，带身份摘要
    pub async fn list_alerts(&self) -> Result<Vec<AlertView>, ApplicationError> {
        let alerts = self.alert_repository.list_newest_first().await?;
        let mut views = Vec::with_capacity(alerts.len());
        for alert in &alerts {
            views.push(self.view_of(alert).await);
        }
        Ok(views)
    }

    /// 指派或撤销负责审核员（后写者胜）
    ///
    /// 对 Open 告警指派非空负责人会同时推进到 InReview；
    /// 撤销不回退状态。告警关联房间时同步房间的 moderator_id，
    /// 维持单一负责人不变式。
    pub async fn assign_responsible(
        &self,
        alert_id: AlertId,
        responsible_id: Option<UserId>,
    ) -> Result<AlertView, ApplicationError> {
        let lock = self.assignment_lock(alert_id).await;
        let _serialized = lock.lock().await;

        let now = self.clock.now();
        let alert = self
            .alert_repository
            .assign_responsible(alert_id, responsible_id, now)
            .await
            .map_err(map_alert_err)?;

        if let Some(room_id) = alert.room_id {
            self.sync_room_moderator(room_id, responsible_id).await;
        }

        tracing::info!(
            alert_id = %alert_id,
            responsible = responsible_id.map(|id| id.to_string()).unwrap_or_else(|| "none".to_string()),
            status = alert.status.as_str(),
            "告警负责人已更新"
        );

        Ok(self.view_of(&alert).await)
    }

    /// 按严格流转表更新告警状态
    ///
    /// 读取当前状态、校验流转、再以 compare-and-set 写入；
    /// 与并发修改赛跑时重读有限次后放弃。
    pub async fn update_status(
        &self,
        alert_id: AlertId,
        next: AlertStatus,
    ) -> Result<AlertView, ApplicationError> {
        let now = self.clock.now();

        for _ in 0..STATUS_UPDATE_ATTEMPTS {
            let current = self.require_alert(alert_id).await?;
            if !current.status.can_transition_to(next) {
                return Err(ApplicationError::Domain(
                    DomainError::InvalidStatusTransition {
                        from: current.status,
                        to: next,
                    },
                ));
            }

            match self
                .alert_repository
                .update_status(alert_id, current.status, next, now)
                .await
            {
                Ok(alert) => {
                    tracing::info!(alert_id = %alert_id, status = next.as_str(), "告警状态已更新");
                    return Ok(self.view_of(&alert).await);
                }
                Err(RepositoryError::Conflict) => continue,
                Err(err) => return Err(map_alert_err(err)),
            }
        }

        Err(ApplicationError::Repository(RepositoryError::Conflict))
    }

    /// 主动举报：直接生成 Open 告警
    pub async fn report_user(
        &self,
        reporter_id: UserId,
        problematic_user_id: UserId,
        room_id: Option<RoomId>,
    ) -> Result<AlertView, ApplicationError> {
        if reporter_id == problematic_user_id {
            return Err(ApplicationError::Domain(DomainError::invalid_argument(
                "problematic_user_id",
                "cannot report yourself",
            )));
        }

        if let Some(room_id) = room_id {
            // 带房间的举报要求房间真实存在
            self.room_repository
                .find_by_id(room_id)
                .await?
                .ok_or(ApplicationError::Domain(DomainError::RoomNotFound))?;
        }

        let alert = MonitoringAlert::new(
            AlertId::new(Uuid::new_v4()),
            reporter_id,
            problematic_user_id,
            room_id,
            self.clock.now(),
        );
        let alert = self.alert_repository.create(alert).await?;

        tracing::info!(
            alert_id = %alert.id,
            reporter = %reporter_id,
            problematic_user = %problematic_user_id,
            "用户举报已生成告警"
        );
        Ok(self.view_of(&alert).await)
    }

    pub async fn get_alert(&self, alert_id: AlertId) -> Result<AlertView, ApplicationError> {
        let alert = self.require_alert(alert_id).await?;
        Ok(self.view_of(&alert).await)
    }

    async fn require_alert(&self, alert_id: AlertId) -> Result<MonitoringAlert, ApplicationError> {
        self.alert_repository
            .find_by_id(alert_id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::AlertNotFound))
    }

    async fn sync_room_moderator(&self, room_id: RoomId, responsible_id: Option<UserId>) {
        if let Err(err) = self
            .room_repository
            .set_moderator(room_id, responsible_id, self.clock.now())
            .await
        {
            // 指派已在告警上生效；房间同步失败只能记录，下一次指派会覆盖
            tracing::error!(error = ?err, room_id = %room_id, "同步房间负责人失败");
        }
    }

    async fn view_of(&self, alert: &MonitoringAlert) -> AlertView {
        let reporter = self.directory.summarize(alert.reporter_id).await;
        let problematic_user = self.directory.summarize(alert.problematic_user_id).await;
        let responsible = match alert.responsible_id {
            Some(id) => Some(self.directory.summarize(id).await),
            None => None,
        };
        AlertView::new(alert, reporter, problematic_user, responsible)
    }

    async fn assignment_lock(&self, alert_id: AlertId) -> Arc<Mutex<()>> {
        let mut locks = self.assignment_locks.lock().await;
        locks
            .entry(alert_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn map_alert_err(err: RepositoryError) -> ApplicationError {
    match err {
        RepositoryError::NotFound => ApplicationError::Domain(DomainError::AlertNotFound),
        other => ApplicationError::Repository(other),
    }
}
