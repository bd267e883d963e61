// Core chat module - scopes, messages and the router that moves them.

pub mod chat_models;
pub mod chat_store;
pub mod message_router;

pub use chat_models::*;
pub use chat_store::*;
pub use message_router::*;
