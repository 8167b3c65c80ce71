//! Per-learner session registry.

mod store;

pub use store::{SessionHandle, SessionStore};
