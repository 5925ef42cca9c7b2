use comrak::nodes::{AstNode, NodeValue};

use crate::{application::render::types::RenderError, domain::slug::AnchorSlugger};

use super::{Document, Stage, walk};

pub(crate) const SLUGS_NAME: &str = "heading-slugs";
pub(crate) const AUTOLINK_NAME: &str = "autolink-headings";

/// Assigns every heading a document-unique slug in order of appearance.
pub(crate) struct HeadingSlugs;

impl Stage for HeadingSlugs {
    fn name(&self) -> &str {
        SLUGS_NAME
    }

    fn apply<'a>(&self, document: &mut Document<'_, 'a>) -> Result<(), RenderError> {
        let root = document.require_root(SLUGS_NAME)?;
        let mut slugger = AnchorSlugger::new();
        let mut found = Vec::new();

        walk(root, &mut |node| {
            if let Some(level) = heading_level(node) {
                let text = collect_heading_text(node);
                found.push((node, level, slugger.anchor_for(&text)));
            }
            Ok(())
        })?;

        for (node, level, slug) in found {
            document.push_heading(node, level, slug);
        }
        Ok(())
    }
}

/// Wraps heading content in a link to the heading's own slug.
pub(crate) struct AutolinkHeadings;

impl Stage for AutolinkHeadings {
    fn name(&self) -> &str {
        AUTOLINK_NAME
    }

    fn apply<'a>(&self, document: &mut Document<'_, 'a>) -> Result<(), RenderError> {
        for heading in document.headings_mut() {
            heading.self_link = true;
        }
        Ok(())
    }
}

fn heading_level(node: &AstNode<'_>) -> Option<u8> {
    match &node.data.borrow().value {
        NodeValue::Heading(heading) => Some(heading.level),
        _ => None,
    }
}

fn collect_heading_text(node: &AstNode<'_>) -> String {
    fn collect(node: &AstNode<'_>, buffer: &mut String) {
        match &node.data.borrow().value {
            NodeValue::Text(text) => buffer.push_str(text),
            NodeValue::Code(code) => buffer.push_str(&code.literal),
            NodeValue::LineBreak | NodeValue::SoftBreak => buffer.push(' '),
            _ => {}
        }
        let mut child = node.first_child();
        while let Some(next) = child {
            collect(next, buffer);
            child = next.next_sibling();
        }
    }

    let mut text = String::new();
    collect(node, &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
