//! 按操作的授权 + 审计管线
//!
//! 每个特权操作携带一个显式的静态描述符：允许的角色集合与审计
//! 动作标签。处理流程固定为 授权 -> 执行 -> 成功后异步发审计，
//! 没有任何环境化的元数据查找或全局中间件。

use application::{AuditEmitter, AuditEvent};
use domain::Role;

use crate::auth::Identity;
use crate::error::ApiError;

/// 员工角色集合（审核操作面）
pub const STAFF: &[Role] = &[Role::Moderator, Role::Admin];

/// 任何已认证角色
pub const ANY_ROLE: &[Role] = &[Role::Buyer, Role::Seller, Role::Moderator, Role::Admin];

/// 单个操作的授权与审计描述符
#[derive(Debug, Clone, Copy)]
pub struct OperationPolicy {
    pub required_roles: &'static [Role],
    pub action: &'static str,
    pub entity_type: &'static str,
}

impl OperationPolicy {
    pub const fn new(
        required_roles: &'static [Role],
        action: &'static str,
        entity_type: &'static str,
    ) -> Self {
        Self {
            required_roles,
            action,
            entity_type,
        }
    }

    /// 角色不在允许集合里返回授权失败，绝不静默返回空结果
    pub fn authorize(&self, identity: &Identity) -> Result<(), ApiError> {
        if self.required_roles.contains(&identity.role) {
            Ok(())
        } else {
            tracing::warn!(
                action = self.action,
                user_id = %identity.user_id,
                role = identity.role.as_str(),
                "操作被拒绝：角色不足"
            );
            Err(ApiError::forbidden(format!(
                "role '{}' may not perform {}",
                identity.role.as_str(),
                self.action
            )))
        }
    }

    /// 操作成功后发射审计事件（异步、永不失败）
    pub fn emit_audit(
        &self,
        audit: &AuditEmitter,
        identity: &Identity,
        entity_id: Option<String>,
        message: impl Into<String>,
        source_addr: Option<String>,
    ) {
        audit.emit(AuditEvent {
            action: self.action.to_string(),
            actor_id: identity.user_id,
            actor_role: identity.role,
            entity_type: self.entity_type.to_string(),
            entity_id,
            message: message.into(),
            source_addr,
            occurred_at: time::OffsetDateTime::now_utc(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::UserId;
    use uuid::Uuid;

    const TEST_POLICY: OperationPolicy = OperationPolicy::new(STAFF, "alert.assign", "alert");

    fn identity(role: Role) -> Identity {
        Identity {
            user_id: UserId::new(Uuid::new_v4()),
            role,
        }
    }

    #[test]
    fn test_staff_roles_pass() {
        assert!(TEST_POLICY.authorize(&identity(Role::Moderator)).is_ok());
        assert!(TEST_POLICY.authorize(&identity(Role::Admin)).is_ok());
    }

    #[test]
    fn test_wrong_role_gets_explicit_failure() {
        let err = TEST_POLICY.authorize(&identity(Role::Buyer)).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }
}
