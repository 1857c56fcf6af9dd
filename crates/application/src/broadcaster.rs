use async_trait::async_trait;
use domain::{Message, RoomId, UserId};
use thiserror::Error;

/// 一次房间消息分发：目标是房间买家、卖家及当前指派的审核员的所有在线会话。
/// 被标记的消息额外分发给所有在线的员工会话，便于审核实时跟进。
#[derive(Debug, Clone, serde::Serialize)]
pub struct MessageBroadcast {
    pub room_id: RoomId,
    pub targets: Vec<UserId>,
    pub to_staff: bool,
    pub message: Message,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 消息分发端口
///
/// 投递语义：对每个在线会话至多一次、尽力而为；对慢速目标不得阻塞
/// 超过有界的单次发送预算。断线的会话不补发，重连后走历史查询。
#[async_trait]
pub trait MessageFanout: Send + Sync {
    async fn deliver(&self, broadcast: MessageBroadcast) -> Result<(), BroadcastError>;
}

/// 内存实现（用于测试）
pub mod memory {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryFanout {
        delivered: Mutex<Vec<MessageBroadcast>>,
    }

    impl MemoryFanout {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn deliveries(&self) -> Vec<MessageBroadcast> {
            self.delivered.lock().await.clone()
        }
    }

    #[async_trait]
    impl MessageFanout for MemoryFanout {
        async fn deliver(&self, broadcast: MessageBroadcast) -> Result<(), BroadcastError> {
            self.delivered.lock().await.push(broadcast);
            Ok(())
        }
    }
}
