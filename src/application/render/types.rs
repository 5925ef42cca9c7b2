use std::{collections::BTreeMap, fmt, sync::Arc};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize, Serializer, ser::SerializeSeq};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::frontmatter::FrontmatterError;

use super::pipeline::Stage;

/// Key under which the rendered HTML is stored in a [`RenderResult`].
pub const CONTENT_KEY: &str = "content";

static DEFAULT_HIGHLIGHT: Lazy<HighlightOptions> = Lazy::new(HighlightOptions::default);

/// Semantic render configuration. Every field participates in the cache key.
///
/// The cache handle is deliberately absent: it belongs to the service, so it can
/// never leak into key derivation.
#[derive(Clone, Default, Serialize)]
pub struct RenderOptions {
    /// Caller stages run before the built-in parse stage, in order.
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_stage_names"
    )]
    pub run_before: Vec<Arc<dyn Stage>>,
    /// Extract a leading YAML block into the result. Unset means `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontmatter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<HighlightOptions>,
    /// Pass raw HTML through untouched. Unset means `true`; `false` sanitizes the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_dangerous_html: Option<bool>,
    /// Extra reference definitions (label → URL) for links the document leaves undefined.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, String>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.run_before.push(stage);
        self
    }

    pub fn with_frontmatter(mut self, enabled: bool) -> Self {
        self.frontmatter = Some(enabled);
        self
    }

    pub fn with_highlight(mut self, highlight: HighlightOptions) -> Self {
        self.highlight = Some(highlight);
        self
    }

    pub fn with_dangerous_html(mut self, allowed: bool) -> Self {
        self.allow_dangerous_html = Some(allowed);
        self
    }

    pub fn with_definition(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.definitions.insert(label.into(), url.into());
        self
    }

    pub fn frontmatter_enabled(&self) -> bool {
        self.frontmatter.unwrap_or(false)
    }

    pub fn dangerous_html_allowed(&self) -> bool {
        self.allow_dangerous_html.unwrap_or(true)
    }

    pub fn highlight_options(&self) -> &HighlightOptions {
        self.highlight.as_ref().unwrap_or(&DEFAULT_HIGHLIGHT)
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<&str> = self.run_before.iter().map(|stage| stage.name()).collect();
        f.debug_struct("RenderOptions")
            .field("run_before", &stages)
            .field("frontmatter", &self.frontmatter)
            .field("highlight", &self.highlight)
            .field("allow_dangerous_html", &self.allow_dangerous_html)
            .field("definitions", &self.definitions)
            .finish()
    }
}

fn serialize_stage_names<S>(stages: &[Arc<dyn Stage>], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(stages.len()))?;
    for stage in stages {
        seq.serialize_element(stage.name())?;
    }
    seq.end()
}

/// Configuration of the `highlight-code` stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightOptions {
    /// Render unknown fence languages unhighlighted instead of failing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_missing: Option<bool>,
    /// Prefix prepended to every highlight span class. Defaults to `hljs-`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Languages tried when guessing the syntax of an unlabeled fence. An empty
    /// list considers every known language; `None` disables detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subset: Option<Vec<String>>,
    /// Languages that are labeled but never highlighted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plain_text: Vec<String>,
    /// Extra names per language, e.g. `rust → [rs, rustlang]`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, Vec<String>>,
    /// Sublime-syntax YAML definitions merged into the base grammar table.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub languages: BTreeMap<String, String>,
}

impl HighlightOptions {
    pub fn ignores_missing(&self) -> bool {
        self.ignore_missing.unwrap_or(false)
    }
}

/// Mapping returned by a render: `content` plus any extracted frontmatter keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderResult(Map<String, Value>);

impl RenderResult {
    /// Merge `metadata` with the rendered HTML. `content` wins on collision.
    pub fn new(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        let mut map = metadata;
        map.insert(CONTENT_KEY.to_string(), Value::String(content.into()));
        Self(map)
    }

    pub fn content(&self) -> &str {
        self.0
            .get(CONTENT_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RenderResult {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Structured errors surfaced by a render. Cache failures never appear here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("markdown processing failed: {message}")]
    Markdown { message: String },
    #[error("unknown language: `{language}` is not registered")]
    UnknownLanguage { language: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("invalid language definition for `{language}`: {message}")]
    InvalidLanguageDefinition { language: String, message: String },
    #[error("malformed frontmatter: {message}")]
    MalformedMetadata { message: String },
    #[error("invalid stage `{name}`: {reason}")]
    InvalidStage { name: String, reason: String },
    #[error("stage `{stage}` failed: {message}")]
    Stage { stage: String, message: String },
}

impl RenderError {
    /// Failure raised from inside a stage, including caller-supplied ones.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl From<FrontmatterError> for RenderError {
    fn from(err: FrontmatterError) -> Self {
        match err {
            FrontmatterError::Malformed { message } => Self::MalformedMetadata { message },
        }
    }
}
