//! Deterministic cache keys for rendered documents.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::application::render::RenderOptions;

const SOURCE: &str = "cache::keys";

/// Hex-encoded SHA-256 over the markdown followed by the canonical options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for rendering `markdown` with `options`.
    ///
    /// Options with nothing set contribute the empty string, so those keys equal
    /// the digest of the markdown alone.
    pub fn derive(markdown: &str, options: &RenderOptions) -> Self {
        let canonical = canonical_options(options);

        let mut hasher = Sha256::new();
        hasher.update(markdown.as_bytes());
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compact JSON with object keys sorted at every depth.
pub(crate) fn canonical_options(options: &RenderOptions) -> String {
    let value = match serde_json::to_value(options) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                target = SOURCE,
                op = "cache_key::canonical",
                result = "serialize_error",
                error = %err,
                "Render options could not be serialized; hashing markdown only"
            );
            return String::new();
        }
    };

    match &value {
        Value::Null => String::new(),
        Value::Object(map) if map.is_empty() => String::new(),
        _ => serde_json::to_string(&sorted(value)).unwrap_or_default(),
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Sorted {
    Object(BTreeMap<String, Sorted>),
    Array(Vec<Sorted>),
    Scalar(Value),
}

fn sorted(value: Value) -> Sorted {
    match value {
        Value::Object(map) => Sorted::Object(
            map.into_iter()
                .map(|(key, value)| (key, sorted(value)))
                .collect(),
        ),
        Value::Array(items) => Sorted::Array(items.into_iter().map(sorted).collect()),
        scalar => Sorted::Scalar(scalar),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::application::render::{Document, HighlightOptions, RenderError, Stage};

    struct Named(&'static str);

    impl Stage for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn apply<'a>(&self, _document: &mut Document<'_, 'a>) -> Result<(), RenderError> {
            Ok(())
        }
    }

    fn sha256_hex(input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }

    #[test]
    fn empty_options_hash_the_markdown_alone() {
        let key = CacheKey::derive("Cache me please", &RenderOptions::new());
        assert_eq!(key.as_str(), sha256_hex("Cache me please"));
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn canonical_form_sorts_nested_keys() {
        let options = RenderOptions::new()
            .with_frontmatter(true)
            .with_highlight(HighlightOptions {
                prefix: Some("tok-".into()),
                ..Default::default()
            });
        assert_eq!(
            canonical_options(&options),
            r#"{"frontmatter":true,"highlight":{"prefix":"tok-"}}"#
        );
    }

    #[test]
    fn map_insertion_order_does_not_change_the_key() {
        let mut first = HighlightOptions::default();
        first.aliases.insert("rust".into(), vec!["rs".into()]);
        first.aliases.insert("python".into(), vec!["py".into()]);

        let mut second = HighlightOptions::default();
        second.aliases.insert("python".into(), vec!["py".into()]);
        second.aliases.insert("rust".into(), vec!["rs".into()]);

        assert_eq!(
            CacheKey::derive("x", &RenderOptions::new().with_highlight(first)),
            CacheKey::derive("x", &RenderOptions::new().with_highlight(second)),
        );
    }

    #[test]
    fn explicit_false_is_distinct_from_unset() {
        let unset = CacheKey::derive("x", &RenderOptions::new());
        let explicit = CacheKey::derive("x", &RenderOptions::new().with_frontmatter(false));
        assert_ne!(unset, explicit);
    }

    #[test]
    fn stage_names_participate_in_the_key() {
        let a = RenderOptions::new().with_stage(Arc::new(Named("a")));
        let b = RenderOptions::new().with_stage(Arc::new(Named("b")));
        assert_ne!(CacheKey::derive("x", &a), CacheKey::derive("x", &b));
        assert_ne!(
            CacheKey::derive("x", &a),
            CacheKey::derive("x", &RenderOptions::new())
        );
    }

    #[test]
    fn markdown_changes_the_key() {
        let options = RenderOptions::new();
        assert_ne!(
            CacheKey::derive("one", &options),
            CacheKey::derive("two", &options)
        );
    }
}
