//! JWT 凭证门
//!
//! 校验外部颁发的 bearer 凭证并解出身份（用户ID + 角色）。
//! REST 走 Authorization 头；WebSocket 握手不是普通 HTTP，
//! 凭证放在 token 查询参数里。公开路由完全绕过本模块。

use axum::http::HeaderMap;
use config::JwtConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain::{Role, UserId};

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub role: Role,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// 已验证的请求身份，显式传入每个下游操作
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token（核心不对终端用户发凭证，此方法供测试和运维工具使用）
    pub fn generate_token(&self, user_id: Uuid, role: Role) -> Result<String, ApiError> {
        let now = time::OffsetDateTime::now_utc();
        let exp = now + time::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            user_id,
            role,
            exp: exp.unix_timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            ApiError::internal_server_error(format!("Token generation failed: {}", err))
        })
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::credential_expired(),
                _ => ApiError::credential_invalid(format!("Invalid token: {}", err)),
            })
    }

    /// 从 token 字符串解出身份（WebSocket 握手路径）
    pub fn identity_from_token(&self, token: &str) -> Result<Identity, ApiError> {
        let claims = self.verify_token(token)?;
        Ok(Identity {
            user_id: UserId::from(claims.user_id),
            role: claims.role,
        })
    }

    /// 从 headers 中提取和验证 token（REST 路径）
    pub fn identity_from_headers(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        let auth_header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| ApiError::unauthenticated("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthenticated("Invalid authorization header format"))?;

        self.identity_from_token(token)
    }
}
