//! Slot grouping, separator checks and replacement text.

use std::fmt;

use serde_json::{Map, Value};

use crate::model::{Fragment, SlotData};
use crate::tree;

/// Wrap `content` so it only renders while the source's toggle is on.
pub fn toggle_wrap(source: &str, content: &str) -> String {
    let mut out = String::with_capacity(content.len() + source.len() + 48);
    out.push_str("{{#if {{? {{getglobalvar::toggle_");
    out.push_str(source);
    out.push_str("}}=1}}}}");
    out.push_str(content);
    out.push_str("{{/if}}");
    out
}

/// One slot whose fragments disagree on the separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotConflict {
    pub slotname:   String,
    pub separators: Vec<String>,
    pub sources:    Vec<String>,
}

impl fmt::Display for SlotConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seps: Vec<String> = self.separators.iter().map(|s| format!("{s:?}")).collect();
        write!(
            f,
            "slot '{}': separators {} (sources: {})",
            self.slotname,
            seps.join(", "),
            self.sources.join(", ")
        )
    }
}

/// Final replacement text for one slot name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub slotname:    String,
    pub replacement: String,
}

struct SlotGroup<'a> {
    slotname:   &'a str,
    separators: Vec<&'a str>,
    members:    Vec<(&'a Fragment, &'a SlotData)>,
}

impl SlotGroup<'_> {
    fn separator(&self) -> &str {
        self.separators.first().copied().unwrap_or_default()
    }
}

/// Resolve ordinary (non-reserved) slots in application order.
///
/// Empty separators never conflict; the first non-empty one wins for the
/// group.  Groups and per-source sub-groups keep first-appearance order.
pub fn resolve(slots: &[(&Fragment, &SlotData)]) -> Result<Vec<ResolvedSlot>, Vec<SlotConflict>> {
    let mut groups: Vec<SlotGroup<'_>> = Vec::new();
    for &(fragment, data) in slots {
        let idx = match groups.iter().position(|g| g.slotname == data.slotname) {
            Some(idx) => idx,
            None => {
                groups.push(SlotGroup { slotname: &data.slotname, separators: Vec::new(), members: Vec::new() });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        let sep = data.separator();
        if !sep.is_empty() && !group.separators.contains(&sep) {
            group.separators.push(sep);
        }
        group.members.push((fragment, data));
    }

    let conflicts: Vec<SlotConflict> = groups
        .iter()
        .filter(|g| g.separators.len() > 1)
        .map(|g| SlotConflict {
            slotname:   g.slotname.to_owned(),
            separators: g.separators.iter().map(|s| s.to_string()).collect(),
            sources:    distinct_sources(&g.members),
        })
        .collect();
    if !conflicts.is_empty() {
        return Err(conflicts);
    }

    Ok(groups.iter().map(resolve_group).collect())
}

fn distinct_sources(members: &[(&Fragment, &SlotData)]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for (fragment, _) in members {
        if !sources.iter().any(|s| s == fragment.source()) {
            sources.push(fragment.source().to_owned());
        }
    }
    sources
}

fn resolve_group(group: &SlotGroup<'_>) -> ResolvedSlot {
    let separator = group.separator();
    let suppress_toggle = group.slotname.to_lowercase().contains("lua");

    let mut by_source: Vec<(&str, Vec<(&Fragment, &SlotData)>)> = Vec::new();
    for &(fragment, data) in &group.members {
        match by_source.iter_mut().find(|(src, _)| *src == fragment.source()) {
            Some((_, members)) => members.push((fragment, data)),
            None => by_source.push((fragment.source(), vec![(fragment, data)])),
        }
    }

    let mut replacement = String::new();
    for (source, members) in &by_source {
        let mut joined = String::new();
        for (_, data) in members {
            for item in &data.content {
                joined.push_str(separator);
                joined.push_str(item);
            }
        }
        if joined.is_empty() {
            continue;
        }
        let (lead, lead_data) = members[0];
        let toggleable = lead_data.toggleable != Some(false) && !lead.toggle_disabled();
        if toggleable && !suppress_toggle && !source.is_empty() {
            replacement.push_str(&toggle_wrap(source, &joined));
        } else {
            replacement.push_str(&joined);
        }
    }

    ResolvedSlot { slotname: group.slotname.to_owned(), replacement }
}

/// Substitute every resolved slot into every string under `map`.
pub fn substitute(map: &mut Map<String, Value>, resolved: &[ResolvedSlot]) {
    for slot in resolved {
        for value in map.values_mut() {
            tree::replace_token(value, &slot.slotname, &slot.replacement);
        }
    }
}

/// Substitute every resolved slot into a single string.
pub fn substitute_str(text: &str, resolved: &[ResolvedSlot]) -> String {
    resolved.iter().fold(text.to_owned(), |acc, slot| {
        if slot.slotname.is_empty() {
            acc
        } else {
            acc.replace(&slot.slotname, &slot.replacement)
        }
    })
}
