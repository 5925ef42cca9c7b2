//! Ordered render stages over a shared document.
//!
//! A [`Pipeline`] owns an immutable list of stages. Each run allocates its own
//! comrak arena, so nothing a stage touches outlives the call that produced it.
//! Stages before `parse-markdown` see the raw source; stages after it work on
//! the tree.

mod anchors;
mod builder;
mod emoji;
mod highlight;
mod html;
mod links;
mod parse;
mod serialize;

use std::{fmt, sync::Arc, time::Instant};

use comrak::{
    Arena,
    nodes::{AstNode, NodeValue},
    options::Options,
    parse_document,
};
use tracing::{debug, warn};

use super::types::RenderError;

pub use builder::{BUILTIN_STAGES, PipelineBuilder, PipelineConfig};

type ParseFn<'a> = dyn Fn(&str, &Options<'static>) -> &'a AstNode<'a> + 'a;
type AllocFn<'a> = dyn Fn(NodeValue) -> &'a AstNode<'a> + 'a;

/// A named unit of the render pipeline.
///
/// Implementations must not keep per-render state in `self`: the same stage
/// instance may serve concurrent renders when its pipeline is reused.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn apply<'a>(&self, document: &mut Document<'_, 'a>) -> Result<(), RenderError>;
}

impl fmt::Debug for dyn Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Stage").field(&self.name()).finish()
    }
}

/// Heading recorded by `heading-slugs`, materialized by `serialize-html`.
#[derive(Clone)]
pub struct HeadingAnchor<'a> {
    pub node: &'a AstNode<'a>,
    pub level: u8,
    pub slug: String,
    pub self_link: bool,
}

/// Working state threaded through every stage of a single render.
pub struct Document<'p, 'a> {
    source: String,
    parser: &'p ParseFn<'a>,
    alloc: &'p AllocFn<'a>,
    root: Option<&'a AstNode<'a>>,
    headings: Vec<HeadingAnchor<'a>>,
    sanitize: bool,
    html: Option<String>,
}

impl<'p, 'a> Document<'p, 'a> {
    fn new(source: String, parser: &'p ParseFn<'a>, alloc: &'p AllocFn<'a>) -> Self {
        Self {
            source,
            parser,
            alloc,
            root: None,
            headings: Vec::new(),
            sanitize: false,
            html: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Mutable access to the markdown source. Returns `None` once the tree exists.
    pub fn source_mut(&mut self) -> Option<&mut String> {
        match self.root {
            Some(_) => None,
            None => Some(&mut self.source),
        }
    }

    /// Parse the source into a tree. Subsequent calls return the same root.
    pub fn parse(&mut self, options: &Options<'static>) -> &'a AstNode<'a> {
        if let Some(root) = self.root {
            return root;
        }
        let root = (self.parser)(&self.source, options);
        self.root = Some(root);
        root
    }

    /// A detached node in this render's arena, ready to be spliced into the tree.
    pub fn alloc(&self, value: NodeValue) -> &'a AstNode<'a> {
        (self.alloc)(value)
    }

    pub fn root(&self) -> Option<&'a AstNode<'a>> {
        self.root
    }

    /// The parsed tree, or a stage error naming `stage` when parsing has not happened.
    pub fn require_root(&self, stage: &str) -> Result<&'a AstNode<'a>, RenderError> {
        self.root
            .ok_or_else(|| RenderError::stage(stage, "document has not been parsed yet"))
    }

    pub fn push_heading(&mut self, node: &'a AstNode<'a>, level: u8, slug: String) {
        self.headings.push(HeadingAnchor {
            node,
            level,
            slug,
            self_link: false,
        });
    }

    pub fn headings(&self) -> &[HeadingAnchor<'a>] {
        &self.headings
    }

    pub fn headings_mut(&mut self) -> &mut [HeadingAnchor<'a>] {
        &mut self.headings
    }

    pub fn set_sanitize(&mut self, sanitize: bool) {
        self.sanitize = sanitize;
    }

    pub fn sanitize(&self) -> bool {
        self.sanitize
    }

    pub fn set_html(&mut self, html: String) {
        self.html = Some(html);
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    fn into_html(self) -> Option<String> {
        self.html
    }
}

/// Immutable, ordered set of stages. Safe to share between concurrent renders.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub(crate) fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run every stage over `markdown` and return the serialized HTML.
    pub fn run(&self, markdown: &str) -> Result<String, RenderError> {
        let started_at = Instant::now();
        let arena = Arena::new();
        let parser = |text: &str, options: &Options<'static>| parse_document(&arena, text, options);
        let alloc = |value: NodeValue| &*arena.alloc(AstNode::from(value));
        let mut document = Document::new(markdown.to_string(), &parser, &alloc);

        for stage in &self.stages {
            if let Err(err) = stage.apply(&mut document) {
                warn!(
                    target = "application::render::pipeline",
                    op = "pipeline::run",
                    result = "error",
                    stage = stage.name(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Render stage failed"
                );
                return Err(err);
            }
        }

        let html = document.into_html().ok_or_else(|| RenderError::Markdown {
            message: "pipeline finished without producing html".to_string(),
        })?;

        debug!(
            target = "application::render::pipeline",
            op = "pipeline::run",
            result = "ok",
            stages = self.stages.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            html_bytes = html.len(),
            "Pipeline rendered document"
        );

        Ok(html)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Depth-first visit of `node` and all of its descendants.
pub(crate) fn walk<'a, F>(node: &'a AstNode<'a>, visit: &mut F) -> Result<(), RenderError>
where
    F: FnMut(&'a AstNode<'a>) -> Result<(), RenderError>,
{
    visit(node)?;
    let mut child = node.first_child();
    while let Some(next) = child {
        walk(next, visit)?;
        child = next.next_sibling();
    }
    Ok(())
}

/// Join runs of adjacent text siblings so patterns split by the parser
/// (`[`, `label`, `]`) can be matched as one string. Backslash escapes are
/// separate `Escaped` nodes and end a run.
pub(crate) fn merge_text_runs<'a>(node: &'a AstNode<'a>) {
    let mut child = node.first_child();
    while let Some(current) = child {
        if is_text(current) {
            while let Some(next) = current.next_sibling() {
                let Some(appended) = text_of(next) else {
                    break;
                };
                if let NodeValue::Text(text) = &mut current.data.borrow_mut().value {
                    let mut merged = text.to_string();
                    merged.push_str(&appended);
                    *text = merged.into();
                }
                next.detach();
            }
        } else {
            merge_text_runs(current);
        }
        child = current.next_sibling();
    }
}

pub(crate) fn is_text(node: &AstNode<'_>) -> bool {
    matches!(node.data.borrow().value, NodeValue::Text(_))
}

pub(crate) fn text_of(node: &AstNode<'_>) -> Option<String> {
    match &node.data.borrow().value {
        NodeValue::Text(text) => Some(text.to_string()),
        _ => None,
    }
}

pub(crate) fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
