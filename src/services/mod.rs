//! Services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own cookie/session logic and upstream plumbing so route
//! handlers can stay focused on protocol translation.

pub mod session;
pub mod upstream;
