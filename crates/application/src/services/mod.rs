pub mod chat_service;
pub mod moderation_service;

pub use chat_service::{ChatService, ChatServiceDependencies, PostMessageRequest};
pub use moderation_service::{ModerationService, ModerationServiceDependencies};
