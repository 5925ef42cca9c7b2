use std::collections::{BTreeMap, HashMap};

use comrak::nodes::{AstNode, NodeLink, NodeValue};

use crate::application::render::types::RenderError;

use super::{Document, Stage, merge_text_runs};

pub(crate) const NAME: &str = "inline-links";

/// Resolves reference-style links the parser could not match.
///
/// Definitions inside the document are resolved by comrak while parsing and
/// always win. What reaches this stage is literal bracket text such as
/// `[text][ref]`, `[text][]` or `[ref]`, which is matched against the
/// caller-supplied definitions and replaced by a real link node, so later
/// stages see it exactly like a link the parser produced.
pub(crate) struct InlineLinks {
    definitions: HashMap<String, String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'t> {
    Text(&'t str),
    Link { text: &'t str, url: &'t str },
}

impl InlineLinks {
    pub(crate) fn new(definitions: &BTreeMap<String, String>) -> Self {
        let definitions = definitions
            .iter()
            .map(|(label, url)| (normalize_label(label), url.trim().to_string()))
            .filter(|(label, _)| !label.is_empty())
            .collect();
        Self { definitions }
    }

    fn rewrite<'a>(
        &self,
        document: &Document<'_, 'a>,
        node: &'a AstNode<'a>,
        inside_link: bool,
    ) {
        let inside_link = inside_link
            || matches!(
                node.data.borrow().value,
                NodeValue::Link(_) | NodeValue::Image(_)
            );

        if !inside_link {
            let segments = match &node.data.borrow().value {
                NodeValue::Text(text) => self.split_references(text).map(|segments| {
                    segments
                        .into_iter()
                        .map(|segment| match segment {
                            Segment::Text(text) => (text.to_string(), None),
                            Segment::Link { text, url } => {
                                (text.to_string(), Some(url.to_string()))
                            }
                        })
                        .collect::<Vec<_>>()
                }),
                _ => None,
            };
            if let Some(segments) = segments {
                for (text, url) in segments {
                    let text_node = document.alloc(NodeValue::Text(text.into()));
                    match url {
                        Some(url) => {
                            let link = document.alloc(NodeValue::Link(Box::new(NodeLink {
                                url,
                                title: String::new(),
                            })));
                            link.append(text_node);
                            node.insert_before(link);
                        }
                        None => node.insert_before(text_node),
                    }
                }
                node.detach();
                return;
            }
        }

        let mut child = node.first_child();
        while let Some(next) = child {
            let following = next.next_sibling();
            self.rewrite(document, next, inside_link);
            child = following;
        }
    }

    /// `text` cut into plain runs and resolved links, or `None` when no
    /// reference matched a definition.
    fn split_references<'t>(&'t self, text: &'t str) -> Option<Vec<Segment<'t>>> {
        let mut segments = Vec::new();
        let mut plain_start = 0;
        let mut cursor = 0;

        while let Some(offset) = text[cursor..].find('[') {
            let open = cursor + offset;
            let resolved = parse_reference(&text[open..]).and_then(|reference| {
                self.definitions
                    .get(&normalize_label(reference.label))
                    .map(|url| (reference, url))
            });

            match resolved {
                Some((reference, url)) => {
                    if plain_start < open {
                        segments.push(Segment::Text(&text[plain_start..open]));
                    }
                    segments.push(Segment::Link {
                        text: reference.text,
                        url,
                    });
                    cursor = open + reference.consumed;
                    plain_start = cursor;
                }
                None => cursor = open + 1,
            }
        }

        if segments.is_empty() {
            return None;
        }
        if plain_start < text.len() {
            segments.push(Segment::Text(&text[plain_start..]));
        }
        Some(segments)
    }
}

impl Stage for InlineLinks {
    fn name(&self) -> &str {
        NAME
    }

    fn apply<'a>(&self, document: &mut Document<'_, 'a>) -> Result<(), RenderError> {
        let root = document.require_root(NAME)?;
        if self.definitions.is_empty() {
            return Ok(());
        }
        merge_text_runs(root);
        self.rewrite(document, root, false);
        Ok(())
    }
}

struct Reference<'t> {
    text: &'t str,
    label: &'t str,
    consumed: usize,
}

/// Parse `[text][label]`, `[text][]` or `[label]` at the start of `input`.
fn parse_reference(input: &str) -> Option<Reference<'_>> {
    let close = bracket_end(input)?;
    let text = &input[1..close];
    if text.trim().is_empty() {
        return None;
    }

    let tail = &input[close + 1..];
    if tail.starts_with('(') {
        return None;
    }

    if tail.starts_with('[')
        && let Some(label_close) = bracket_end(tail)
    {
        let label = &tail[1..label_close];
        return Some(Reference {
            text,
            label: if label.trim().is_empty() { text } else { label },
            consumed: close + 1 + label_close + 1,
        });
    }

    Some(Reference {
        text,
        label: text,
        consumed: close + 1,
    })
}

fn bracket_end(input: &str) -> Option<usize> {
    let inner = input.strip_prefix('[')?;
    let end = inner.find([']', '['])?;
    inner[end..].starts_with(']').then_some(end + 1)
}

/// Labels match case-insensitively with internal whitespace collapsed.
fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> InlineLinks {
        let mut definitions = BTreeMap::new();
        definitions.insert("Docs".to_string(), "https://docs.example".to_string());
        definitions.insert("full".to_string(), "http://full.com".to_string());
        InlineLinks::new(&definitions)
    }

    #[test]
    fn resolves_full_collapsed_and_shortcut_references() {
        let stage = stage();

        assert_eq!(
            stage.split_references("see [the guide][docs]"),
            Some(vec![
                Segment::Text("see "),
                Segment::Link {
                    text: "the guide",
                    url: "https://docs.example"
                },
            ])
        );
        assert_eq!(
            stage.split_references("[Docs][] first"),
            Some(vec![
                Segment::Link {
                    text: "Docs",
                    url: "https://docs.example"
                },
                Segment::Text(" first"),
            ])
        );
        assert_eq!(
            stage.split_references("a [full] b"),
            Some(vec![
                Segment::Text("a "),
                Segment::Link {
                    text: "full",
                    url: "http://full.com"
                },
                Segment::Text(" b"),
            ])
        );
    }

    #[test]
    fn unknown_labels_are_left_alone() {
        assert_eq!(stage().split_references("[nothing] here"), None);
    }

    #[test]
    fn unmatched_brackets_stay_in_the_plain_run() {
        assert_eq!(
            stage().split_references("a [x] < b [docs]"),
            Some(vec![
                Segment::Text("a [x] < b "),
                Segment::Link {
                    text: "docs",
                    url: "https://docs.example"
                },
            ])
        );
    }

    #[test]
    fn labels_normalize_case_and_whitespace() {
        assert_eq!(normalize_label("  Full   Reference\tLink "), "full reference link");
    }
}
