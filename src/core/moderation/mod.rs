// Core moderation module - violation audit, auto-ban engine and manual bans.

pub mod content_filter;
pub mod moderation_models;
pub mod moderation_service;
pub mod moderation_store;

pub use content_filter::*;
pub use moderation_models::*;
pub use moderation_service::*;
pub use moderation_store::*;
