//! Client library for the Empathy community forum.
//!
//! The crate talks to the Empathy REST API, keeps an optional real-time
//! channel open for live updates, and owns the local state that sits between
//! the two: session identity, a shared query cache and optimistic
//! interactions that reconcile with the server.

pub mod client;
pub mod common;
pub mod utils;
