// Session layer - one `Session` per execution context (a tab, a window, a process).
//
// This layer is THIN on purpose: it owns the per-context state and routes envelopes
// and user actions to the core services. No business rules live here.

#[path = "session.rs"]
pub mod session;

#[path = "sinks.rs"]
pub mod sinks;

pub use session::{Session, SessionDeps, SessionSettings};
pub use sinks::TracingSink;
