use std::sync::Arc;

use ammonia::Builder as AmmoniaBuilder;
use comrak::{
    format_html,
    nodes::{AstNode, NodeHtmlBlock, NodeValue},
    options::Options,
};

use crate::application::render::types::RenderError;

use super::{Document, HeadingAnchor, Stage, escape_html, html::build_sanitizer};

pub(crate) const NAME: &str = "serialize-html";

pub(crate) struct SerializeHtml {
    options: Arc<Options<'static>>,
    sanitizer: AmmoniaBuilder<'static>,
}

impl SerializeHtml {
    pub(crate) fn new(options: Arc<Options<'static>>) -> Self {
        Self {
            options,
            sanitizer: build_sanitizer(),
        }
    }

    /// Replace a heading node with raw HTML carrying its id and optional self-link.
    fn materialize_heading(&self, heading: &HeadingAnchor<'_>) -> Result<(), RenderError> {
        let rendered = format_node(heading.node, &self.options)?;
        let open = format!("<h{}>", heading.level);
        let close = format!("</h{}>", heading.level);
        let inner = rendered
            .trim_end()
            .strip_prefix(open.as_str())
            .and_then(|rest| rest.strip_suffix(close.as_str()))
            .ok_or_else(|| RenderError::Markdown {
                message: format!("unexpected heading markup: {rendered}"),
            })?;

        let slug = escape_html(&heading.slug);
        let level = heading.level;
        let literal = if heading.self_link {
            format!("<h{level} id=\"{slug}\"><a href=\"#{slug}\">{inner}</a></h{level}>\n")
        } else {
            format!("<h{level} id=\"{slug}\">{inner}</h{level}>\n")
        };

        let children: Vec<_> = heading.node.children().collect();
        for child in children {
            child.detach();
        }
        heading.node.data.borrow_mut().value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal,
        });
        Ok(())
    }
}

impl Stage for SerializeHtml {
    fn name(&self) -> &str {
        NAME
    }

    fn apply<'a>(&self, document: &mut Document<'_, 'a>) -> Result<(), RenderError> {
        let root = document.require_root(NAME)?;

        for heading in document.headings() {
            self.materialize_heading(heading)?;
        }

        let mut html = format_node(root, &self.options)?;
        if document.sanitize() {
            html = self.sanitizer.clean(&html).to_string();
        }
        // Block separators only go between elements, never after the last one.
        let content_len = html.trim_end_matches('\n').len();
        html.truncate(content_len);
        document.set_html(html);
        Ok(())
    }
}

fn format_node<'a>(node: &'a AstNode<'a>, options: &Options<'static>) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(node, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}
