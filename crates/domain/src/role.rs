//! 用户角色定义
//!
//! 角色由外部颁发的凭证携带，核心只做验证和授权判断。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// 买家
    Buyer,
    /// 卖家
    Seller,
    /// 审核员
    Moderator,
    /// 管理员
    Admin,
}

impl Role {
    /// 是否为平台员工角色（可访问审核操作面）
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(DomainError::invalid_argument(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}
