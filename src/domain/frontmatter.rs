//! Leading YAML metadata blocks.
//!
//! A block opens with a `---` line at the very start of the document and
//! closes with `---` or `...`. Anything else, including an opening fence
//! that is never closed, is treated as plain body text.

use serde_json::{Map, Value};
use thiserror::Error;

/// Metadata split from the body of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub metadata: Map<String, Value>,
    pub body: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrontmatterError {
    #[error("{message}")]
    Malformed { message: String },
}

impl FrontmatterError {
    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Splits a metadata block from document text.
pub trait FrontmatterExtractor: Send + Sync {
    fn extract(&self, raw: &str) -> Result<Extracted, FrontmatterError>;
}

/// YAML frontmatter in the `---` fenced style.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlFrontmatter;

impl FrontmatterExtractor for YamlFrontmatter {
    fn extract(&self, raw: &str) -> Result<Extracted, FrontmatterError> {
        let Some((yaml, body)) = split_block(raw) else {
            return Ok(Extracted {
                metadata: Map::new(),
                body: raw.to_string(),
            });
        };

        Ok(Extracted {
            metadata: parse_metadata(yaml)?,
            body: body.to_string(),
        })
    }
}

/// `(yaml, body)` when `raw` starts with a closed metadata block.
fn split_block(raw: &str) -> Option<(&str, &str)> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines = text.split_inclusive('\n');

    let opening = lines.next()?;
    if opening.trim_end() != "---" {
        return None;
    }

    let mut offset = opening.len();
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return Some((&text[opening.len()..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }

    None
}

fn parse_metadata(yaml: &str) -> Result<Map<String, Value>, FrontmatterError> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }

    let parsed: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|err| FrontmatterError::malformed(format!("invalid yaml: {err}")))?;

    match serde_json::to_value(parsed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(FrontmatterError::malformed(
            "frontmatter must be a mapping of keys to values",
        )),
        Err(err) => Err(FrontmatterError::malformed(format!(
            "frontmatter cannot be represented as json: {err}"
        ))),
    }
}
