//! Domain model module declarations.

pub mod command;
pub mod request;
pub mod session;
