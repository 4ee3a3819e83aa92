//! Data models

pub mod metadata;
pub mod telemetry;

pub use metadata::*;
pub use telemetry::*;
