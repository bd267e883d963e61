// Implementations of the moderation storage port.

pub mod in_memory;
pub mod sqlite_moderation_store;

pub use in_memory::InMemoryModerationStore;
pub use sqlite_moderation_store::SqliteModerationStore;
