//! Core trait abstractions for the attribution library.
//!
//! These traits define the interfaces that applications implement
//! to provide model invocation, source retrieval and persistence.

pub mod model;
pub mod store;
