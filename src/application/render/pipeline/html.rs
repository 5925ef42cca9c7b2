use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;

use crate::application::render::types::RenderError;

use super::{Document, Stage};

pub(crate) const NAME: &str = "html-document";

/// Chooses how raw HTML embedded in the markdown reaches the output.
///
/// comrak always emits raw blocks, because the highlighter and heading
/// stages inject their markup as raw HTML too. When raw HTML is not allowed,
/// the serializer runs the finished document through [`build_sanitizer`].
pub(crate) struct HtmlConversion {
    allow_raw: bool,
}

impl HtmlConversion {
    pub(crate) fn new(allow_raw: bool) -> Self {
        Self { allow_raw }
    }
}

impl Stage for HtmlConversion {
    fn name(&self) -> &str {
        NAME
    }

    fn apply<'a>(&self, document: &mut Document<'_, 'a>) -> Result<(), RenderError> {
        document.require_root(NAME)?;
        document.set_sanitize(!self.allow_raw);
        Ok(())
    }
}

/// Allowlist that keeps everything the pipeline itself emits: heading ids,
/// self-links, highlight classes, tables, task lists, and footnotes.
pub(crate) fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a",
        "abbr",
        "blockquote",
        "br",
        "code",
        "del",
        "div",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "i",
        "img",
        "input",
        "kbd",
        "li",
        "ol",
        "p",
        "pre",
        "s",
        "section",
        "span",
        "strong",
        "sub",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "ul",
    ]);
    builder.tags(tags);

    let generic: HashSet<&'static str> = HashSet::from([
        "class",
        "id",
        "title",
        "lang",
        "dir",
        "aria-label",
        "data-footnote-ref",
        "data-footnotes",
        "data-footnote-backref",
    ]);
    builder.generic_attributes(generic);

    builder.add_tag_attributes("img", &["alt", "width", "height"]);
    builder.add_tag_attributes("th", &["align"]);
    builder.add_tag_attributes("td", &["align"]);
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);
    builder.add_url_schemes(["http", "https", "mailto", "tel"].iter().copied());
    builder.link_rel(None);

    builder
}
