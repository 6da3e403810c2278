//! Data types for the attribution pipeline.

pub mod config;
pub mod outcome;
pub mod record;
pub mod schema;
pub mod source;
pub mod usage;
