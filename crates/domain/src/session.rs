//! 传输层会话记录
//!
//! 会话仅存活于进程内，由连接管理器在握手成功时创建、断开或心跳超时时销毁。
//! 同一用户允许多个并发会话（多设备）。

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::role::Role;
use crate::value_objects::{SessionId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub role: Role,
    pub connected_at: Timestamp,
    pub last_heartbeat: Timestamp,
}

impl Session {
    pub fn new(id: SessionId, user_id: UserId, role: Role, now: Timestamp) -> Self {
        Self {
            id,
            user_id,
            role,
            connected_at: now,
            last_heartbeat: now,
        }
    }

    /// 刷新心跳时间
    pub fn touch(&mut self, now: Timestamp) {
        self.last_heartbeat = now;
    }

    /// 最后一次心跳距今是否超过宽限期
    pub fn is_expired(&self, now: Timestamp, grace_period: Duration) -> bool {
        now - self.last_heartbeat > grace_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn test_expiry() {
        let now = OffsetDateTime::now_utc();
        let mut session = Session::new(
            SessionId::generate(),
            UserId::new(Uuid::new_v4()),
            Role::Buyer,
            now,
        );
        let grace = Duration::seconds(90);

        assert!(!session.is_expired(now, grace));
        assert!(!session.is_expired(now + Duration::seconds(90), grace));
        assert!(session.is_expired(now + Duration::seconds(91), grace));

        // 心跳刷新后重新计时
        session.touch(now + Duration::seconds(60));
        assert!(!session.is_expired(now + Duration::seconds(120), grace));
    }
}
