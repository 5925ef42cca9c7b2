use std::{borrow::Cow, fmt, num::NonZeroUsize, sync::Arc, time::Instant};

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use serde_json::Map;
use tracing::{debug, warn};

use crate::{
    cache::{CacheKey, CacheLookup, CacheStore},
    domain::frontmatter::{FrontmatterExtractor, YamlFrontmatter},
};

use super::{
    pipeline::{PipelineBuilder, PipelineConfig},
    types::{RenderError, RenderOptions, RenderResult},
};

const SOURCE: &str = "application::render::service";
const DEFAULT_PIPELINE_CAPACITY: usize = 16;

static DEFAULT_SERVICE: OnceCell<Arc<Hubdown>> = OnceCell::new();

/// Render `markdown` with a process-wide service that has no cache attached.
pub async fn render(markdown: &str, options: &RenderOptions) -> Result<RenderResult, RenderError> {
    let service = DEFAULT_SERVICE.get_or_try_init(|| Hubdown::builder().build().map(Arc::new))?;
    service.render(markdown, options).await
}

/// Entry point that ties key derivation, cache lookup, frontmatter extraction,
/// and pipeline execution together.
pub struct Hubdown {
    pipelines: PipelineBuilder,
    cache: Option<Arc<dyn CacheStore>>,
    frontmatter: Arc<dyn FrontmatterExtractor>,
}

impl Hubdown {
    pub fn builder() -> HubdownBuilder {
        HubdownBuilder::default()
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Render `markdown`, consulting the cache first when one is attached.
    ///
    /// A cache hit is returned verbatim, frontmatter included. Cache failures
    /// are logged and treated as misses; render failures are never cached.
    pub async fn render(
        &self,
        markdown: &str,
        options: &RenderOptions,
    ) -> Result<RenderResult, RenderError> {
        let started_at = Instant::now();
        let key = CacheKey::derive(markdown, options);

        if let Some(cache) = self.cache.as_ref() {
            match cache.get(&key).await {
                CacheLookup::Found(result) => {
                    counter!("hubdown_cache_hit_total").increment(1);
                    debug!(
                        target = SOURCE,
                        op = "hubdown::render",
                        result = "cache_hit",
                        cache_key = %key,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "Render served from cache"
                    );
                    return Ok(result);
                }
                CacheLookup::NotFound => {
                    counter!("hubdown_cache_miss_total").increment(1);
                }
                CacheLookup::Failed(err) => {
                    counter!("hubdown_cache_error_total").increment(1);
                    warn!(
                        target = SOURCE,
                        op = "hubdown::render",
                        result = "cache_read_error",
                        cache_key = %key,
                        error = %err,
                        "Cache lookup failed; rendering fresh"
                    );
                }
            }
        }

        let result = self.render_uncached(markdown, options)?;

        if let Some(cache) = self.cache.as_ref()
            && let Err(err) = cache.put(&key, &result).await
        {
            counter!("hubdown_cache_put_error_total").increment(1);
            warn!(
                target = SOURCE,
                op = "hubdown::render",
                result = "cache_write_error",
                cache_key = %key,
                error = %err,
                "Failed to store rendered document"
            );
        }

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!("hubdown_render_ms").record(elapsed_ms as f64);
        debug!(
            target = SOURCE,
            op = "hubdown::render",
            result = "rendered",
            cache_key = %key,
            elapsed_ms,
            content_bytes = result.content().len(),
            "Rendered markdown"
        );

        Ok(result)
    }

    fn render_uncached(
        &self,
        markdown: &str,
        options: &RenderOptions,
    ) -> Result<RenderResult, RenderError> {
        let (metadata, body) = if options.frontmatter_enabled() {
            let extracted = self.frontmatter.extract(markdown)?;
            (extracted.metadata, Cow::Owned(extracted.body))
        } else {
            (Map::new(), Cow::Borrowed(markdown))
        };

        let pipeline = self
            .pipelines
            .build(&options.run_before, &PipelineConfig::from_options(options))?;
        let content = pipeline.run(&body)?;

        Ok(RenderResult::new(content, metadata))
    }
}

impl fmt::Debug for Hubdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hubdown")
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Configures the collaborators of a [`Hubdown`] service.
pub struct HubdownBuilder {
    cache: Option<Arc<dyn CacheStore>>,
    frontmatter: Arc<dyn FrontmatterExtractor>,
    pipeline_capacity: NonZeroUsize,
}

impl Default for HubdownBuilder {
    fn default() -> Self {
        Self {
            cache: None,
            frontmatter: Arc::new(YamlFrontmatter),
            pipeline_capacity: NonZeroUsize::new(DEFAULT_PIPELINE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl HubdownBuilder {
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn maybe_cache(mut self, cache: Option<Arc<dyn CacheStore>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn frontmatter(mut self, extractor: Arc<dyn FrontmatterExtractor>) -> Self {
        self.frontmatter = extractor;
        self
    }

    /// Number of non-default pipeline configurations kept for reuse.
    pub fn pipeline_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.pipeline_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<Hubdown, RenderError> {
        Ok(Hubdown {
            pipelines: PipelineBuilder::new(self.pipeline_capacity)?,
            cache: self.cache,
            frontmatter: self.frontmatter,
        })
    }
}
