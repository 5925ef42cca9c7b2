use std::{
    collections::BTreeMap,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use lru::LruCache;
use tracing::debug;

use crate::{
    application::render::types::{HighlightOptions, RenderError, RenderOptions},
    cache::lock::mutex_lock,
};

use super::{
    Pipeline, Stage,
    anchors::{self, AutolinkHeadings, HeadingSlugs},
    emoji::{self, EmojiShortcodes},
    highlight::{self, HighlightCode},
    html::{self, HtmlConversion},
    links::{self, InlineLinks},
    parse::{self, ParseMarkdown},
    serialize::{self, SerializeHtml},
};

const SOURCE: &str = "application::render::pipeline::builder";

/// Built-in stage names, in execution order.
pub const BUILTIN_STAGES: [&str; 8] = [
    parse::NAME,
    emoji::NAME,
    links::NAME,
    html::NAME,
    anchors::SLUGS_NAME,
    anchors::AUTOLINK_NAME,
    highlight::NAME,
    serialize::NAME,
];

/// Per-render configuration of the built-in stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineConfig {
    pub highlight: HighlightOptions,
    pub allow_dangerous_html: bool,
    pub definitions: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            highlight: HighlightOptions::default(),
            allow_dangerous_html: true,
            definitions: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_options(options: &RenderOptions) -> Self {
        let mut highlight = options.highlight_options().clone();
        if highlight.ignore_missing == Some(false) {
            highlight.ignore_missing = None;
        }
        Self {
            highlight,
            allow_dangerous_html: options.dangerous_html_allowed(),
            definitions: options.definitions.clone(),
        }
    }

    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Assembles pipelines, reusing immutable instances where configuration allows.
///
/// A render with caller stages or `ignore_missing` always gets a fresh
/// pipeline. Default configuration shares one instance; any other
/// configuration is kept in a bounded LRU.
pub struct PipelineBuilder {
    default: Arc<Pipeline>,
    configured: Mutex<LruCache<PipelineConfig, Arc<Pipeline>>>,
}

impl PipelineBuilder {
    pub fn new(capacity: NonZeroUsize) -> Result<Self, RenderError> {
        let default = Arc::new(assemble(&[], &PipelineConfig::default())?);
        Ok(Self {
            default,
            configured: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// The shared pipeline used when nothing is customised.
    pub fn default_pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.default)
    }

    pub fn build(
        &self,
        pre_stages: &[Arc<dyn Stage>],
        config: &PipelineConfig,
    ) -> Result<Arc<Pipeline>, RenderError> {
        validate_stages(pre_stages)?;

        if !pre_stages.is_empty() || config.highlight.ignores_missing() {
            debug!(
                target = SOURCE,
                op = "pipeline::build",
                result = "fresh",
                pre_stages = pre_stages.len(),
                "Assembling per-call pipeline"
            );
            return assemble(pre_stages, config).map(Arc::new);
        }

        if config.is_default() {
            return Ok(self.default_pipeline());
        }

        if let Some(pipeline) = mutex_lock(&self.configured, SOURCE, "build.get").get(config) {
            return Ok(Arc::clone(pipeline));
        }

        let pipeline = Arc::new(assemble(&[], config)?);
        mutex_lock(&self.configured, SOURCE, "build.put").put(config.clone(), Arc::clone(&pipeline));
        debug!(
            target = SOURCE,
            op = "pipeline::build",
            result = "cached",
            "Assembled pipeline for custom configuration"
        );
        Ok(pipeline)
    }
}

fn validate_stages(stages: &[Arc<dyn Stage>]) -> Result<(), RenderError> {
    for stage in stages {
        let name = stage.name();
        if name.trim().is_empty() {
            return Err(RenderError::InvalidStage {
                name: name.to_string(),
                reason: "stage name must not be empty".to_string(),
            });
        }
        if BUILTIN_STAGES.contains(&name) {
            return Err(RenderError::InvalidStage {
                name: name.to_string(),
                reason: "name is reserved for a built-in stage".to_string(),
            });
        }
    }
    Ok(())
}

fn assemble(
    pre_stages: &[Arc<dyn Stage>],
    config: &PipelineConfig,
) -> Result<Pipeline, RenderError> {
    let options = Arc::new(parse::default_options());

    let mut stages: Vec<Arc<dyn Stage>> = pre_stages.to_vec();
    stages.push(Arc::new(ParseMarkdown::new(Arc::clone(&options))));
    stages.push(Arc::new(EmojiShortcodes));
    stages.push(Arc::new(InlineLinks::new(&config.definitions)));
    stages.push(Arc::new(HtmlConversion::new(config.allow_dangerous_html)));
    stages.push(Arc::new(HeadingSlugs));
    stages.push(Arc::new(AutolinkHeadings));
    stages.push(Arc::new(HighlightCode::new(&config.highlight)?));
    stages.push(Arc::new(SerializeHtml::new(options)));

    Ok(Pipeline::new(stages))
}
