// Implementations of the chat storage port.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::InMemoryMessageStore;
pub use sqlite_store::SqliteMessageStore;
