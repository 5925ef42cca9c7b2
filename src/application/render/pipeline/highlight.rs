use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use once_cell::sync::Lazy;
use syntect::{
    html::{ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxDefinition, SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

use crate::application::render::types::{HighlightOptions, RenderError};

use super::{Document, Stage, escape_html, walk};

pub(crate) const NAME: &str = "highlight-code";

const DEFAULT_PREFIX: &str = "hljs-";
const BUILTIN_PLAIN_TEXT: [&str; 4] = ["text", "plain", "plaintext", "txt"];

static BASE_SYNTAXES: Lazy<Arc<SyntaxSet>> =
    Lazy::new(|| Arc::new(two_face::syntax::extra_newlines()));

/// Highlights fenced code blocks into `<pre><code class="hljs language-…">`.
pub(crate) struct HighlightCode {
    syntax_set: Arc<SyntaxSet>,
    /// Lowercased fence token → syntax name for caller-defined languages.
    custom: HashMap<String, String>,
    /// Lowercased alias → lowercased target language.
    aliases: HashMap<String, String>,
    plain_text: HashSet<String>,
    subset: Option<HashSet<String>>,
    prefix: String,
    ignore_missing: bool,
}

impl HighlightCode {
    pub(crate) fn new(options: &HighlightOptions) -> Result<Self, RenderError> {
        let (syntax_set, custom) = merge_languages(options)?;

        let aliases = options
            .aliases
            .iter()
            .flat_map(|(language, names)| {
                let target = language.to_ascii_lowercase();
                names
                    .iter()
                    .map(move |name| (name.to_ascii_lowercase(), target.clone()))
            })
            .collect();

        let plain_text = BUILTIN_PLAIN_TEXT
            .iter()
            .map(|name| name.to_string())
            .chain(options.plain_text.iter().map(|name| name.to_ascii_lowercase()))
            .collect();

        let subset = options.subset.as_ref().map(|names| {
            names
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect()
        });

        Ok(Self {
            syntax_set,
            custom,
            aliases,
            plain_text,
            subset,
            prefix: options
                .prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            ignore_missing: options.ignores_missing(),
        })
    }

    fn rewrite_block(&self, node: &AstNode<'_>) -> Result<(), RenderError> {
        let Some((info, literal)) = extract_code_block(node) else {
            return Ok(());
        };

        let html = match info.split_whitespace().next() {
            Some(language) => Some(self.render_labeled(language, &literal)?),
            None => self.render_detected(&literal)?,
        };

        if let Some(html) = html {
            let mut data = node.data.borrow_mut();
            data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
                block_type: 0,
                literal: html,
            });
        }
        Ok(())
    }

    fn render_labeled(&self, language: &str, code: &str) -> Result<String, RenderError> {
        let lowercase = language.to_ascii_lowercase();
        if self.plain_text.contains(&lowercase) {
            return Ok(plain_block(language, code));
        }

        match self.resolve(&lowercase) {
            Some(syntax) => self.highlight(language, syntax, code),
            None if self.ignore_missing => Ok(plain_block(language, code)),
            None => Err(RenderError::UnknownLanguage {
                language: language.to_string(),
            }),
        }
    }

    /// Guess the language of an unlabeled fence when detection is enabled.
    fn render_detected(&self, code: &str) -> Result<Option<String>, RenderError> {
        let Some(subset) = self.subset.as_ref() else {
            return Ok(None);
        };
        let Some(syntax) = self.syntax_set.find_syntax_by_first_line(code) else {
            return Ok(None);
        };

        let name = syntax.name.to_ascii_lowercase();
        let allowed = subset.is_empty()
            || subset.contains(&name)
            || syntax
                .file_extensions
                .iter()
                .any(|ext| subset.contains(&ext.to_ascii_lowercase()));
        if !allowed {
            return Ok(None);
        }

        self.highlight(&name, syntax, code).map(Some)
    }

    fn resolve(&self, lowercase: &str) -> Option<&SyntaxReference> {
        let target = self
            .aliases
            .get(lowercase)
            .map(String::as_str)
            .unwrap_or(lowercase);

        if let Some(name) = self.custom.get(target) {
            return self.syntax_set.find_syntax_by_name(name);
        }
        find_syntax(&self.syntax_set, target)
    }

    fn highlight(
        &self,
        language: &str,
        syntax: &SyntaxReference,
        code: &str,
    ) -> Result<String, RenderError> {
        let mut code_with_newline = code.to_string();
        if !code_with_newline.ends_with('\n') {
            code_with_newline.push('\n');
        }

        let mut generator = ClassedHTMLGenerator::new_with_class_style(
            syntax,
            &self.syntax_set,
            ClassStyle::Spaced,
        );

        for line in LinesWithEndings::from(code_with_newline.as_str()) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|err| RenderError::Highlighting {
                    language: language.to_string(),
                    message: err.to_string(),
                })?;
        }

        let highlighted = prefix_span_classes(&generator.finalize(), &self.prefix);
        Ok(format!(
            "<pre><code class=\"hljs language-{}\">{highlighted}</code></pre>\n",
            escape_html(language)
        ))
    }
}

impl Stage for HighlightCode {
    fn name(&self) -> &str {
        NAME
    }

    fn apply<'a>(&self, document: &mut Document<'_, 'a>) -> Result<(), RenderError> {
        let root = document.require_root(NAME)?;
        walk(root, &mut |node| self.rewrite_block(node))
    }
}

/// Base grammar table plus any caller-supplied definitions.
fn merge_languages(
    options: &HighlightOptions,
) -> Result<(Arc<SyntaxSet>, HashMap<String, String>), RenderError> {
    if options.languages.is_empty() {
        return Ok((Arc::clone(&BASE_SYNTAXES), HashMap::new()));
    }

    let mut builder = SyntaxSet::clone(&BASE_SYNTAXES).into_builder();
    let mut custom = HashMap::new();

    for (language, source) in &options.languages {
        let definition =
            SyntaxDefinition::load_from_str(source, true, Some(language.as_str())).map_err(|err| {
                RenderError::InvalidLanguageDefinition {
                    language: language.clone(),
                    message: err.to_string(),
                }
            })?;
        custom.insert(language.to_ascii_lowercase(), definition.name.clone());
        builder.add(definition);
    }

    Ok((Arc::new(builder.build()), custom))
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    syntax_set
        .find_syntax_by_token(token)
        .or_else(|| syntax_set.find_syntax_by_name(token))
        .or_else(|| syntax_set.find_syntax_by_extension(token))
}

fn extract_code_block(node: &AstNode<'_>) -> Option<(String, String)> {
    match &node.data.borrow().value {
        NodeValue::CodeBlock(block) => Some((block.info.clone(), block.literal.clone())),
        _ => None,
    }
}

fn plain_block(language: &str, code: &str) -> String {
    format!(
        "<pre><code class=\"hljs language-{}\">{}</code></pre>\n",
        escape_html(language),
        escape_html(code)
    )
}

/// Rewrite `<span class="a b">` into `<span class="{prefix}a {prefix}b">`.
/// Code text is escaped by the generator, so only real tags match.
fn prefix_span_classes(html: &str, prefix: &str) -> String {
    const OPEN: &str = "<span class=\"";

    let mut output = String::with_capacity(html.len() + html.len() / 4);
    let mut rest = html;

    while let Some(index) = rest.find(OPEN) {
        let (head, tail) = rest.split_at(index + OPEN.len());
        output.push_str(head);
        let Some(end) = tail.find('"') else {
            rest = tail;
            break;
        };

        for (position, class) in tail[..end].split_whitespace().enumerate() {
            if position > 0 {
                output.push(' ');
            }
            output.push_str(prefix);
            output.push_str(class);
        }
        rest = &tail[end..];
    }

    output.push_str(rest);
    output
}
