//! Source providers and record sinks.
//!
//! Available implementations:
//! - `StaticSourceProvider` - Pre-loaded source documents
//! - `MemorySink` - In-memory outcomes (testing and development)
//! - `JsonlSink` - One JSON outcome per line on disk

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlSink;
pub use memory::{MemorySink, StaticSourceProvider};
