use std::sync::Arc;

use application::{AuditEmitter, ChatService, ModerationService, PresenceTracker};
use config::PresenceConfig;
use infrastructure::SessionRegistry;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub moderation_service: Arc<ModerationService>,
    pub presence: Arc<PresenceTracker>,
    pub registry: Arc<SessionRegistry>,
    pub jwt_service: Arc<JwtService>,
    pub audit: AuditEmitter,
    pub presence_config: PresenceConfig,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat_service: Arc<ChatService>,
        moderation_service: Arc<ModerationService>,
        presence: Arc<PresenceTracker>,
        registry: Arc<SessionRegistry>,
        jwt_service: Arc<JwtService>,
        audit: AuditEmitter,
        presence_config: PresenceConfig,
    ) -> Self {
        Self {
            chat_service,
            moderation_service,
            presence,
            registry,
            jwt_service,
            audit,
            presence_config,
        }
    }
}
