use comrak::nodes::NodeValue;

use crate::application::render::types::RenderError;

use super::{Document, Stage, merge_text_runs, walk};

pub(crate) const NAME: &str = "emoji-shortcodes";

/// Replaces `:shortcode:` in text with the emoji glyph. Code spans and
/// blocks are never touched, and glyphs already in the text pass through.
pub(crate) struct EmojiShortcodes;

impl Stage for EmojiShortcodes {
    fn name(&self) -> &str {
        NAME
    }

    fn apply<'a>(&self, document: &mut Document<'_, 'a>) -> Result<(), RenderError> {
        let root = document.require_root(NAME)?;
        merge_text_runs(root);

        walk(root, &mut |node| {
            let mut data = node.data.borrow_mut();
            if let NodeValue::Text(text) = &mut data.value
                && let Some(replaced) = replace_shortcodes(text)
            {
                *text = replaced.into();
            }
            Ok(())
        })
    }
}

fn replace_shortcodes(text: &str) -> Option<String> {
    if !text.contains(':') {
        return None;
    }

    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    let mut changed = false;

    while let Some(start) = rest.find(':') {
        let after = &rest[start + 1..];
        let Some(end) = after.find(':') else {
            break;
        };

        let candidate = &after[..end];
        if let Some(emoji) = lookup(candidate) {
            output.push_str(&rest[..start]);
            output.push_str(emoji);
            rest = &after[end + 1..];
            changed = true;
        } else {
            // The closing colon may open the next shortcode.
            output.push_str(&rest[..=start]);
            rest = after;
        }
    }

    output.push_str(rest);
    changed.then_some(output)
}

fn lookup(candidate: &str) -> Option<&'static str> {
    let valid = !candidate.is_empty()
        && candidate
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '+' | '-'));
    if !valid {
        return None;
    }
    emojis::get_by_shortcode(candidate).map(|emoji| emoji.as_str())
}
