//! Markdown rendering: option types, the stage pipeline, and the service that
//! coordinates it with the render cache.
//!
//! Rendering itself is pure. Given the same markdown and options a pipeline
//! produces the same HTML or the same error, which is what makes the
//! content-addressed cache safe.

pub mod pipeline;
mod service;
mod types;

pub use pipeline::{
    BUILTIN_STAGES, Document, HeadingAnchor, Pipeline, PipelineBuilder, PipelineConfig, Stage,
};
pub use service::{Hubdown, HubdownBuilder, render};
pub use types::{CONTENT_KEY, HighlightOptions, RenderError, RenderOptions, RenderResult};
