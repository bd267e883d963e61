// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "sqlite.rs"]
pub mod sqlite;

#[path = "events/broadcast_bus.rs"]
pub mod events;

#[path = "chat/mod.rs"]
pub mod chat;

#[path = "moderation/mod.rs"]
pub mod moderation;
