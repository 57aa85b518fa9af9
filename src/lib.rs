#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod profile;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
