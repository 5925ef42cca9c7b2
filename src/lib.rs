//! Markdown to HTML rendering with heading anchors, emoji shortcodes,
//! syntax highlighting, and a content-addressed render cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

pub use application::render::{
    Document, HighlightOptions, Hubdown, HubdownBuilder, Pipeline, PipelineBuilder, RenderError,
    RenderOptions, RenderResult, Stage, render,
};
pub use cache::{CacheError, CacheKey, CacheLookup, CacheStore, FileCacheStore, MemoryCacheStore};
pub use domain::frontmatter::{FrontmatterExtractor, YamlFrontmatter};
