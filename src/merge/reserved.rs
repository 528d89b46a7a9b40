//! Reserved slots: Lua trigger code, the toggle menu and the style embedding.

use serde_json::Value;

use crate::model::{Fragment, ReservedSlot, TriggerSpec};

const TRIGGER_LUA: &str = "triggerlua";
const STYLE_CLOSE: &str = "</style>";

/// Concatenated content of every fragment routed to `slot`, each item
/// prefixed with its own fragment's separator.
pub fn collect(fragments: &[&Fragment], slot: ReservedSlot) -> String {
    let mut out = String::new();
    for data in fragments.iter().filter_map(|f| f.as_slot()) {
        if data.reserved() != Some(slot) {
            continue;
        }
        out.push_str(&data.joined());
    }
    out
}

/// Insert `content` into the first `</style>` block of `html`, or append a
/// new style block when there is none.  The tag match ignores case.
pub fn insert_embedding(html: &str, content: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    match html.to_ascii_lowercase().find(STYLE_CLOSE) {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + content.len() + 10);
            out.push_str(&html[..at]);
            out.push('\n');
            out.push_str(content);
            out.push('\n');
            out.push_str(STYLE_CLOSE);
            out.push_str(&html[at + STYLE_CLOSE.len()..]);
            out
        }
        None => format!("{html}\n<style>\n{content}\n</style>"),
    }
}

/// Append `lua` to the first `triggerlua` effect, or add a start trigger
/// running it when no such effect exists.
pub fn append_lua(triggers: &mut Vec<Value>, lua: &str) -> Result<(), serde_json::Error> {
    let effect = triggers
        .iter_mut()
        .filter_map(|t| t.get_mut("effect").and_then(Value::as_array_mut))
        .flatten()
        .find(|e| e.get("type").and_then(Value::as_str) == Some(TRIGGER_LUA));

    match effect.and_then(Value::as_object_mut) {
        Some(effect) => {
            let existing = effect.get("code").and_then(Value::as_str).unwrap_or_default();
            let code = join_lua(existing, lua);
            effect.insert("code".to_owned(), Value::String(code));
        }
        None => triggers.push(serde_json::to_value(TriggerSpec::lua(lua.to_owned()))?),
    }
    Ok(())
}

fn join_lua(existing: &str, lua: &str) -> String {
    if existing.is_empty() {
        lua.to_owned()
    } else {
        format!("{existing}\n{lua}")
    }
}

/// Toggle-menu descriptor listing one toggle per source.
pub fn toggle_menu(character: &str, group_title: &str, sources: &[&str], extra: &str) -> String {
    let mut menu = format!("={character}=divider\n={group_title}=group\n");
    for source in sources {
        menu.push_str(&format!("{source}={source}\n"));
    }
    menu.push_str("==groupEnd\n");
    if !extra.is_empty() {
        menu.push_str(extra);
        menu.push('\n');
    }
    menu.push_str(&format!("={character}=divider\n"));
    menu
}

/// Distinct sources of `fragments` that show a toggle, in order.
pub fn toggle_sources<'a>(fragments: &[&'a Fragment]) -> Vec<&'a str> {
    let mut sources: Vec<&str> = Vec::new();
    for fragment in fragments.iter().filter(|f| !f.toggle_disabled()) {
        let source = fragment.source();
        if !source.is_empty() && !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}
