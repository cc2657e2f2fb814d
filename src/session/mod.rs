//! Observer sessions
//!
//! A session is the lifecycle of one attached observer: register with the hub,
//! replay history, stream live lines, and unregister when anything ends it.

pub mod connection;
pub mod state;

pub use connection::{ObserverSession, SessionLimits};
pub use state::{DetachCause, ObserverPhase, ObserverState};
