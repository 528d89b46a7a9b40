//! String-tree rewriting over `serde_json::Value`.
//!
//! Slot substitution and unused-slot cleanup both need to touch every string
//! in a document, wherever it sits.  They share one walker, [`rewrite_strings`],
//! which knows nothing about the document schema: objects and arrays are
//! descended into, strings are handed to the callback, everything else is left
//! alone.  Object keys are never rewritten.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde_json::Value;

/// Call `f` on every string value reachable from `value`.
pub fn rewrite_strings<F>(value: &mut Value, f: &mut F)
where
    F: FnMut(&mut String),
{
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => {
            for item in items {
                rewrite_strings(item, f);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                rewrite_strings(item, f);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Replace every literal occurrence of `token` with `replacement`.
///
/// The token is matched as plain text; characters such as `[`, `|` or `$`
/// carry no special meaning on either side.
pub fn replace_token(value: &mut Value, token: &str, replacement: &str) {
    if token.is_empty() {
        return;
    }
    rewrite_strings(value, &mut |s: &mut String| {
        if s.contains(token) {
            *s = s.replace(token, replacement);
        }
    });
}

fn unused_slot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // `<<name>>` on one line.  `[[name]]` is Lua long-string syntax and is kept.
    PATTERN.get_or_init(|| Regex::new(r"<<[^<>\n]+>>").expect("static pattern"))
}

/// Strip slot tokens from a single string.
pub fn strip_slots_in(s: &str) -> String {
    unused_slot_pattern().replace_all(s, "").into_owned()
}

/// Remove every `<<...>>` token left anywhere in `value`.
pub fn strip_unused_slots(value: &mut Value) {
    let pattern = unused_slot_pattern();
    rewrite_strings(value, &mut |s: &mut String| {
        if pattern.is_match(s) {
            *s = pattern.replace_all(s, "").into_owned();
        }
    });
}
