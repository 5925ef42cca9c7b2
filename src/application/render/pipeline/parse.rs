use std::sync::Arc;

use comrak::options::Options;

use crate::application::render::types::RenderError;

use super::{Document, Stage};

pub(crate) const NAME: &str = "parse-markdown";

/// GitHub-flavored comrak options shared by parsing and serialization.
///
/// Frontmatter is handled before the pipeline runs, so comrak's own
/// delimiter support stays off.
pub(crate) fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.front_matter_delimiter = None;

    // Backslash escapes stay as `Escaped` nodes so text rewrites can skip them.
    options.parse.escaped_char_spans = true;

    let render = &mut options.render;
    render.r#unsafe = true;
    render.sourcepos = false;

    options
}

pub(crate) struct ParseMarkdown {
    options: Arc<Options<'static>>,
}

impl ParseMarkdown {
    pub(crate) fn new(options: Arc<Options<'static>>) -> Self {
        Self { options }
    }
}

impl Stage for ParseMarkdown {
    fn name(&self) -> &str {
        NAME
    }

    fn apply<'a>(&self, document: &mut Document<'_, 'a>) -> Result<(), RenderError> {
        document.parse(&self.options);
        Ok(())
    }
}
