//! 用户目录端口
//!
//! 用户资料由外部协作方持有，核心只在告警面板里需要
//! 把ID换成可读的身份摘要。查不到时退回ID字符串。

use async_trait::async_trait;
use serde::Serialize;

use domain::UserId;

/// 身份摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn summarize(&self, user_id: UserId) -> UserSummary;
}

/// 无外部目录时的实现：只返回ID
#[derive(Debug, Default)]
pub struct NullUserDirectory;

#[async_trait]
impl UserDirectory for NullUserDirectory {
    async fn summarize(&self, user_id: UserId) -> UserSummary {
        UserSummary {
            id: user_id,
            display_name: None,
        }
    }
}

/// 内存实现（用于测试）
pub mod memory {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MemoryUserDirectory {
        names: HashMap<UserId, String>,
    }

    impl MemoryUserDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&mut self, user_id: UserId, name: impl Into<String>) {
            self.names.insert(user_id, name.into());
        }
    }

    #[async_trait]
    impl UserDirectory for MemoryUserDirectory {
        async fn summarize(&self, user_id: UserId) -> UserSummary {
            UserSummary {
                id: user_id,
                display_name: self.names.get(&user_id).cloned(),
            }
        }
    }
}
