//! Model implementations for the attribution pipeline.
//!
//! This module provides a reference implementation of [`StructuredModel`]
//! and [`ImageTranscriber`] backed by the OpenAI API.
//!
//! [`StructuredModel`]: crate::traits::model::StructuredModel
//! [`ImageTranscriber`]: crate::traits::model::ImageTranscriber

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAIModel;
