//! Domain layer: document-level concepts independent of the render pipeline.

pub mod frontmatter;
pub mod slug;
