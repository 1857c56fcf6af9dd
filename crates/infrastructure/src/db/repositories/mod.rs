mod alert_repository_impl;
mod chat_room_repository_impl;
mod message_repository_impl;

pub use alert_repository_impl::PgAlertRepository;
pub use chat_room_repository_impl::PgChatRoomRepository;
pub use message_repository_impl::PgMessageRepository;
