//! Custom action delimiters.
//!
//! Tera's delimiters are fixed. Templates written with other delimiters are
//! rewritten into tera syntax before compilation:
//!
//! ```text
//! L expr R     ->  {{ expr }}
//! L% stmt %R   ->  {% stmt %}
//! L# note #R   ->  {# note #}
//! ```
//!
//! Text between actions is emitted verbatim; when it contains something tera
//! would read as a tag it is wrapped in a raw block.

use std::borrow::Cow;

use kubeplate_core::types::{DEFAULT_LEFT_DELIMITER, DEFAULT_RIGHT_DELIMITER};

/// Byte offset of an action opener with no matching closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unterminated(pub usize);

pub fn is_default(left: &str, right: &str) -> bool {
    left == DEFAULT_LEFT_DELIMITER && right == DEFAULT_RIGHT_DELIMITER
}

/// Rewrite `source` from `left`/`right` delimiters into tera syntax.
pub fn translate<'a>(source: &'a str, left: &str, right: &str) -> Result<Cow<'a, str>, Unterminated> {
    if is_default(left, right) {
        return Ok(Cow::Borrowed(source));
    }

    let mut out = String::with_capacity(source.len() + 16);
    let mut rest = source;
    let mut offset = 0;
    while let Some(start) = rest.find(left) {
        push_text(&mut out, &rest[..start]);
        let after_open = &rest[start + left.len()..];
        let Some(end) = after_open.find(right) else {
            return Err(Unterminated(offset + start));
        };
        push_action(&mut out, &after_open[..end]);
        let consumed = start + left.len() + end + right.len();
        rest = &rest[consumed..];
        offset += consumed;
    }
    push_text(&mut out, rest);
    Ok(Cow::Owned(out))
}

fn push_action(out: &mut String, inner: &str) {
    let is_tag = |marker: char| inner.len() >= 2 && inner.starts_with(marker) && inner.ends_with(marker);
    if is_tag('%') || is_tag('#') {
        out.push('{');
        out.push_str(inner);
        out.push('}');
    } else {
        out.push_str("{{");
        out.push_str(inner);
        out.push_str("}}");
    }
}

fn push_text(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    // a trailing '{' would fuse with the next action's opener
    let needs_raw = ["{{", "{%", "{#"].iter().any(|tag| text.contains(tag)) || text.ends_with('{');
    if needs_raw {
        out.push_str("{% raw %}");
        out.push_str(text);
        out.push_str("{% endraw %}");
    } else {
        out.push_str(text);
    }
}
