//! 在线状态变更事件
//!
//! 由在线状态跟踪器在用户上线/下线时发出，供面板等监听方订阅。

use serde::{Deserialize, Serialize};

use crate::value_objects::{Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// 用户第一个会话注册成功
    Online { user_id: UserId, at: Timestamp },
    /// 用户最后一个会话注销（显式断开或心跳超时清扫）
    Offline { user_id: UserId, at: Timestamp },
}

impl PresenceEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            PresenceEvent::Online { user_id, .. } => *user_id,
            PresenceEvent::Offline { user_id, .. } => *user_id,
        }
    }
}
