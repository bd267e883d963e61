// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "clock.rs"]
pub mod clock;

#[path = "ids.rs"]
pub mod ids;

#[path = "storage.rs"]
pub mod storage;

#[path = "chat/mod.rs"]
pub mod chat;

#[path = "events/mod.rs"]
pub mod events;

#[path = "presence/presence_service.rs"]
pub mod presence;

#[path = "typing/typing_service.rs"]
pub mod typing;

#[path = "notifications/notification_service.rs"]
pub mod notifications;

#[path = "moderation/mod.rs"]
pub mod moderation;
