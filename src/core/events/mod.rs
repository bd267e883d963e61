// Core events module - the envelope model and the bus port every component rides on.

pub mod envelope;
pub mod event_bus;

pub use envelope::*;
pub use event_bus::*;
