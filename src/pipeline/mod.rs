//! Pipeline configuration: template loading, field mapping, and
//! per-session materialization.

pub mod field_map;
pub mod materializer;
pub mod naming;
pub mod template;
