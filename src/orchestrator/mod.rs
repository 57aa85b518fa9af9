//! Session orchestration modules.
//!
//! Covers the channel registry, admission control, callback port
//! allocation, the session lifecycle driver, and the heartbeat reaper.

pub mod admission;
pub mod ports;
pub mod reaper;
pub mod registry;
pub mod session_manager;
