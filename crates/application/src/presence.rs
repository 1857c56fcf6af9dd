//! 在线状态跟踪器
//!
//! 以进程内会话表维护每个用户的在线状态：
//! 首个会话注册时上线，最后一个会话注销或心跳超时清扫后下线。
//! 在线状态记录只由本模块修改，消息处理路径从不直接写入。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use config::PresenceConfig;
use domain::{PresenceEvent, Role, Session, SessionId, Timestamp, UserId};

use crate::clock::Clock;

/// 单个用户的在线状态快照
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub online: bool,
    pub last_seen: Timestamp,
}

#[derive(Default)]
struct PresenceState {
    sessions: HashMap<SessionId, Session>,
    user_sessions: HashMap<UserId, HashSet<SessionId>>,
    last_seen: HashMap<UserId, Timestamp>,
}

/// 会话表在线状态跟踪器
///
/// 同一用户允许多个并发会话（多设备）；online 当且仅当存在至少
/// 一个未过期会话。时间通过注入的 Clock 读取，测试可控。
pub struct PresenceTracker {
    state: RwLock<PresenceState>,
    clock: Arc<dyn Clock>,
    grace_period: time::Duration,
    events: broadcast::Sender<PresenceEvent>,
}

impl PresenceTracker {
    pub fn new(config: &PresenceConfig, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: RwLock::new(PresenceState::default()),
            clock,
            grace_period: time::Duration::seconds(config.grace_period_secs() as i64),
            events,
        }
    }

    /// 订阅上线/下线事件（面板等监听方使用）
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    /// 注册新会话。对已认证用户总是成功，多设备并发注册互不冲突。
    pub async fn register_session(&self, user_id: UserId, role: Role) -> SessionId {
        let now = self.clock.now();
        let session = Session::new(SessionId::generate(), user_id, role, now);
        let session_id = session.id;

        let mut state = self.state.write().await;
        let was_offline = {
            let user_sessions = state.user_sessions.entry(user_id).or_default();
            let was_offline = user_sessions.is_empty();
            user_sessions.insert(session_id);
            was_offline
        };
        state.sessions.insert(session_id, session);
        state.last_seen.insert(user_id, now);
        drop(state);

        tracing::info!(user_id = %user_id, session_id = %session_id, "会话注册成功");

        if was_offline {
            let _ = self.events.send(PresenceEvent::Online { user_id, at: now });
        }

        session_id
    }

    /// 刷新会话心跳。会话已过期或不存在时静默忽略，
    /// 客户端应重新握手。
    pub async fn heartbeat(&self, session_id: SessionId) {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let user_id = match state.sessions.get_mut(&session_id) {
            Some(session) => {
                session.touch(now);
                Some(session.user_id)
            }
            None => {
                tracing::debug!(session_id = %session_id, "心跳对应的会话不存在，忽略");
                None
            }
        };
        if let Some(user_id) = user_id {
            state.last_seen.insert(user_id, now);
        }
    }

    /// 显式注销会话。幂等：重复调用与调用一次效果相同。
    /// 注销的是该用户最后一个会话时发出下线事件。
    pub async fn unregister_session(&self, session_id: SessionId) {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let Some(session) = state.sessions.remove(&session_id) else {
            return;
        };
        let user_id = session.user_id;

        let went_offline = match state.user_sessions.get_mut(&user_id) {
            Some(sessions) => {
                sessions.remove(&session_id);
                sessions.is_empty()
            }
            None => true,
        };
        if went_offline {
            state.user_sessions.remove(&user_id);
        }
        state.last_seen.insert(user_id, now);
        drop(state);

        tracing::info!(user_id = %user_id, session_id = %session_id, "会话已注销");

        if went_offline {
            let _ = self.events.send(PresenceEvent::Offline { user_id, at: now });
        }
    }

    /// 用户是否在线（存在至少一个未过期会话）
    pub async fn is_online(&self, user_id: UserId) -> bool {
        let now = self.clock.now();
        let state = self.state.read().await;
        match state.user_sessions.get(&user_id) {
            Some(sessions) => sessions.iter().any(|id| {
                state
                    .sessions
                    .get(id)
                    .is_some_and(|s| !s.is_expired(now, self.grace_period))
            }),
            None => false,
        }
    }

    /// 用户的在线状态快照
    pub async fn presence_of(&self, user_id: UserId) -> Option<PresenceRecord> {
        let online = self.is_online(user_id).await;
        let state = self.state.read().await;
        let last_seen = state.last_seen.get(&user_id).copied()?;
        Some(PresenceRecord {
            user_id,
            online,
            last_seen,
        })
    }

    /// 当前所有在线用户
    pub async fn online_users(&self) -> Vec<UserId> {
        let state = self.state.read().await;
        state.user_sessions.keys().copied().collect()
    }

    /// 用户的活跃会话数
    pub async fn session_count(&self, user_id: UserId) -> usize {
        let state = self.state.read().await;
        state
            .user_sessions
            .get(&user_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// 清扫过期会话
    ///
    /// 这是唯一一处没有显式客户端动作也会衰减在线状态的地方，
    /// 用于覆盖传输层断开通知不可靠的场景（例如网络突然中断）。
    /// 返回被清扫的会话ID。
    pub async fn sweep_expired(&self) -> Vec<SessionId> {
        let now = self.clock.now();
        let expired: Vec<SessionId> = {
            let state = self.state.read().await;
            state
                .sessions
                .values()
                .filter(|s| s.is_expired(now, self.grace_period))
                .map(|s| s.id)
                .collect()
        };

        for session_id in &expired {
            tracing::info!(session_id = %session_id, "心跳超时，清扫过期会话");
            self.unregister_session(*session_id).await;
        }

        expired
    }
}

/// 启动后台清扫任务（进程生命周期，每个心跳间隔运行一次）
pub fn spawn_sweeper(tracker: Arc<PresenceTracker>, config: &PresenceConfig) -> JoinHandle<()> {
    let interval = std::time::Duration::from_secs(config.heartbeat_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let swept = tracker.sweep_expired().await;
            if !swept.is_empty() {
                tracing::info!(count = swept.len(), "presence sweep removed expired sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;

    fn config() -> PresenceConfig {
        PresenceConfig {
            heartbeat_interval_secs: 30,
            grace_multiplier: 3,
        }
    }

    fn tracker() -> (Arc<PresenceTracker>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
        let tracker = Arc::new(PresenceTracker::new(&config(), clock.clone()));
        (tracker, clock)
    }

    #[tokio::test]
    async fn test_register_brings_user_online() {
        let (tracker, _clock) = tracker();
        let user = UserId::new(Uuid::new_v4());

        assert!(!tracker.is_online(user).await);
        tracker.register_session(user, Role::Buyer).await;
        assert!(tracker.is_online(user).await);
    }

    #[tokio::test]
    async fn test_multi_device_presence_is_union() {
        let (tracker, _clock) = tracker();
        let user = UserId::new(Uuid::new_v4());

        let first = tracker.register_session(user, Role::Buyer).await;
        let second = tracker.register_session(user, Role::Buyer).await;
        assert_eq!(tracker.session_count(user).await, 2);

        tracker.unregister_session(first).await;
        assert!(tracker.is_online(user).await);

        tracker.unregister_session(second).await;
        assert!(!tracker.is_online(user).await);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let (tracker, _clock) = tracker();
        let user = UserId::new(Uuid::new_v4());
        let mut events = tracker.subscribe();

        let first = tracker.register_session(user, Role::Seller).await;
        let second = tracker.register_session(user, Role::Seller).await;

        // 对同一会话重复注销不应使在线计数二次递减
        tracker.unregister_session(first).await;
        tracker.unregister_session(first).await;
        assert!(tracker.is_online(user).await);
        assert_eq!(tracker.session_count(user).await, 1);

        tracker.unregister_session(second).await;
        assert!(!tracker.is_online(user).await);

        // 事件序列：一次上线、一次下线
        assert!(matches!(
            events.try_recv().unwrap(),
            PresenceEvent::Online { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            PresenceEvent::Offline { .. }
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_session_alive() {
        let (tracker, clock) = tracker();
        let user = UserId::new(Uuid::new_v4());
        let session = tracker.register_session(user, Role::Buyer).await;

        // 宽限期 90s：持续心跳下跨过若干个清扫周期仍在线
        for _ in 0..4 {
            clock.advance(Duration::seconds(30));
            tracker.heartbeat(session).await;
            assert!(tracker.sweep_expired().await.is_empty());
        }
        assert!(tracker.is_online(user).await);
    }

    #[tokio::test]
    async fn test_sweep_flips_user_offline_without_explicit_disconnect() {
        let (tracker, clock) = tracker();
        let user = UserId::new(Uuid::new_v4());
        let mut events = tracker.subscribe();

        let session = tracker.register_session(user, Role::Buyer).await;
        let _ = events.try_recv();

        // 停止心跳，越过宽限期
        clock.advance(Duration::seconds(91));
        let swept = tracker.sweep_expired().await;

        assert_eq!(swept, vec![session]);
        assert!(!tracker.is_online(user).await);
        assert!(matches!(
            events.try_recv().unwrap(),
            PresenceEvent::Offline { .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_heartbeat_is_silent_noop() {
        let (tracker, clock) = tracker();
        let user = UserId::new(Uuid::new_v4());
        let session = tracker.register_session(user, Role::Buyer).await;

        clock.advance(Duration::seconds(91));
        tracker.sweep_expired().await;

        // 会话已被清扫，迟到的心跳不报错也不复活会话
        tracker.heartbeat(session).await;
        assert!(!tracker.is_online(user).await);
    }

    #[tokio::test]
    async fn test_presence_record_invariant() {
        let (tracker, clock) = tracker();
        let user = UserId::new(Uuid::new_v4());

        assert!(tracker.presence_of(user).await.is_none());

        let session = tracker.register_session(user, Role::Buyer).await;
        let record = tracker.presence_of(user).await.unwrap();
        assert!(record.online);

        clock.advance(Duration::seconds(10));
        tracker.unregister_session(session).await;
        let record = tracker.presence_of(user).await.unwrap();
        assert!(!record.online);
    }
}
