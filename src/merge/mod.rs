//! The merge engine: `(base, fragments) -> merged document`.
//!
//! A merge never touches its inputs.  The base is cloned up front and every
//! step mutates the copy, so a failed merge leaves nothing half applied.
//!
//! Step order:
//!
//! 1. vetoes (`remove_object`) drop fragments by name
//! 2. stable sort: originals first, then by `order` descending
//! 3. deselected or vetoed originals are removed from the base lists
//! 4. card shapes get a default `character_book` and `assets`
//! 5. lorebook, asset and regex fragments are applied in sorted order
//! 6. the `<<embedding>>` slot is written into the style block
//! 7. ordinary slots are resolved and substituted
//! 8. leftover `<<...>>` tokens are stripped
//! 9. `<<lua>>` and `<<toggle>>` are routed to the trigger and toggle menu

pub mod lorebook;
pub mod reserved;
pub mod slots;

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{
    default_character_book, AssetRef, Document, Fragment, FragmentData, LorebookData, ModuleBody,
    RegexRule, ReservedSlot, Section, SlotData, TriggerSpec,
};
use crate::tree;

pub use slots::{toggle_wrap, ResolvedSlot, SlotConflict};

pub const DEFAULT_TOGGLE_GROUP_TITLE: &str = "📖Mod toggles";
pub const DEFAULT_CHARACTER_NAME:     &str = "Character";

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Slot separator conflict:\n{}", join_conflicts(.0))]
    SeparatorConflict(Vec<SlotConflict>),
    #[error("Original fragment `{name}` has no base index")]
    MissingOriginalIndex { name: String },
    #[error("Original {section} index {index} is past the end of the base list ({len} items)")]
    OriginalIndexOutOfRange { section: Section, index: usize, len: usize },
    #[error("`{0}` is not a list")]
    NotAList(&'static str),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_conflicts(conflicts: &[SlotConflict]) -> String {
    conflicts.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

// ── Options / outcome ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Title of the group that lists one toggle per mod source.
    pub toggle_group_title: String,
    /// Name shown in the toggle menu dividers.  Defaults to the document name.
    pub character_name:     Option<String>,
    /// Used when neither `character_name` nor the document supplies one.
    pub fallback_name:      String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            toggle_group_title: DEFAULT_TOGGLE_GROUP_TITLE.to_owned(),
            character_name:     None,
            fallback_name:      DEFAULT_CHARACTER_NAME.to_owned(),
        }
    }
}

/// Reserved-slot products.  On card shapes these have no home in the
/// document and ship in an accessory module instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accessory {
    pub lua:         String,
    pub toggle_menu: String,
    pub embedding:   String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeCounts {
    pub lorebook:          usize,
    pub asset:             usize,
    pub regex:             usize,
    pub slot:              usize,
    pub removed_originals: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub document:  Document,
    /// Regex rules from fragments that a card-shaped base cannot hold.
    pub regex:     Vec<Value>,
    pub accessory: Accessory,
    /// Ids of fragments dropped by a veto.
    pub vetoed:    Vec<String>,
    pub counts:    MergeCounts,
}

impl MergeOutcome {
    /// Module body carrying the accessory products and side-channel regex.
    pub fn accessory_module(&self) -> Result<ModuleBody, serde_json::Error> {
        Ok(ModuleBody {
            trigger:              vec![serde_json::to_value(TriggerSpec::lua(self.accessory.lua.clone()))?],
            regex:                self.regex.clone(),
            background_embedding: self.accessory.embedding.clone(),
            custom_module_toggle: self.accessory.toggle_menu.clone(),
            ..ModuleBody::default()
        })
    }
}

// ── Planning (veto + order) ──────────────────────────────────────────────────

/// Fragments that take part in a merge: every original, plus the selected
/// non-original ones.
fn participates(fragment: &Fragment) -> bool {
    fragment.is_original || fragment.selected
}

/// Indices of fragments vetoed by another participating fragment.
pub fn vetoed_indices(fragments: &[Fragment]) -> Vec<usize> {
    let vetoers: Vec<(usize, &Fragment)> =
        fragments.iter().enumerate().filter(|(_, f)| participates(f) && !f.vetoes().is_empty()).collect();

    fragments
        .iter()
        .enumerate()
        .filter(|(i, f)| {
            participates(f)
                && vetoers.iter().any(|(j, other)| j != i && other.vetoes().iter().any(|n| *n == f.name))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Mark vetoed fragments with `is_removed` for display.
pub fn annotate_vetoes(fragments: &mut [Fragment]) {
    let vetoed = vetoed_indices(fragments);
    for (i, fragment) in fragments.iter_mut().enumerate() {
        fragment.is_removed = vetoed.contains(&i);
    }
}

fn apply_order(a: &Fragment, b: &Fragment) -> Ordering {
    match (a.is_original, b.is_original) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => b.order().total_cmp(&a.order()),
    }
}

struct Plan<'a> {
    applied:  Vec<&'a Fragment>,
    removals: Vec<&'a Fragment>,
    vetoed:   Vec<&'a Fragment>,
}

fn plan(fragments: &[Fragment]) -> Plan<'_> {
    let vetoed_idx = vetoed_indices(fragments);

    let mut kept = Vec::new();
    let mut vetoed = Vec::new();
    for (i, fragment) in fragments.iter().enumerate().filter(|(_, f)| participates(f)) {
        if vetoed_idx.contains(&i) {
            vetoed.push(fragment);
        } else {
            kept.push(fragment);
        }
    }
    kept.sort_by(|a, b| apply_order(a, b));

    let removals = kept
        .iter()
        .filter(|f| f.is_original && !f.selected)
        .chain(vetoed.iter().filter(|f| f.is_original))
        .copied()
        .collect();
    let applied = kept.into_iter().filter(|f| !f.is_original).collect();

    Plan { applied, removals, vetoed }
}

/// Non-original fragments a merge of `fragments` applies, in application
/// order.
pub fn applied_fragments(fragments: &[Fragment]) -> Vec<&Fragment> {
    plan(fragments).applied
}

// ── Original removal ─────────────────────────────────────────────────────────

fn list_mut<'m>(map: &'m mut Map<String, Value>, path: &[&str]) -> Option<&'m mut Vec<Value>> {
    let (last, parents) = path.split_last()?;
    let mut cur = map;
    for key in parents {
        cur = cur.get_mut(*key)?.as_object_mut()?;
    }
    cur.get_mut(*last)?.as_array_mut()
}

fn removal_path(doc: &Document, section: Section) -> Option<&'static [&'static str]> {
    match (doc.is_module(), section) {
        (true, Section::Lorebook)  => Some(&["lorebook"][..]),
        (true, Section::Regex)     => Some(&["regex"][..]),
        (false, Section::Lorebook) => Some(&["character_book", "entries"][..]),
        _ => None,
    }
}

fn remove_originals(doc: &mut Document, removals: &[&Fragment]) -> Result<usize, MergeError> {
    let mut removed = 0;
    for section in [Section::Lorebook, Section::Regex] {
        let mut indices = BTreeSet::new();
        for fragment in removals.iter().filter(|f| f.section() == section) {
            let index = fragment
                .original_index
                .ok_or_else(|| MergeError::MissingOriginalIndex { name: fragment.name.clone() })?;
            indices.insert(index);
        }
        if indices.is_empty() {
            continue;
        }
        let Some(path) = removal_path(doc, section) else {
            debug!(%section, "no base list for original removals; skipped");
            continue;
        };

        let mut empty = Vec::new();
        let list = list_mut(doc.target_mut(), path).unwrap_or(&mut empty);
        let len = list.len();
        if let Some(&index) = indices.iter().next_back().filter(|&&i| i >= len) {
            return Err(MergeError::OriginalIndexOutOfRange { section, index, len });
        }
        // Descending, so earlier indices stay valid.
        for &index in indices.iter().rev() {
            list.remove(index);
            removed += 1;
        }
        debug!(%section, count = indices.len(), "removed original items");
    }
    Ok(removed)
}

// ── Target helpers ───────────────────────────────────────────────────────────

fn ensure_list<'m>(map: &'m mut Map<String, Value>, key: &'static str) -> Result<&'m mut Vec<Value>, MergeError> {
    let slot = map.entry(key).or_insert(Value::Null);
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    map.get_mut(key).and_then(Value::as_array_mut).ok_or(MergeError::NotAList(key))
}

fn ensure_card_defaults(target: &mut Map<String, Value>) {
    if !target.get("character_book").is_some_and(Value::is_object) {
        target.insert("character_book".to_owned(), default_character_book());
    }
    if let Some(book) = target.get_mut("character_book").and_then(Value::as_object_mut) {
        ensure_array(book, "entries");
    }
    ensure_array(target, "assets");
}

/// Missing, `null` and non-list values all become an empty list.
fn ensure_array(map: &mut Map<String, Value>, key: &str) {
    if !map.get(key).is_some_and(Value::is_array) {
        map.insert(key.to_owned(), Value::Array(Vec::new()));
    }
}

fn card_entries(target: &mut Map<String, Value>) -> Result<&mut Vec<Value>, MergeError> {
    list_mut(target, &["character_book", "entries"]).ok_or(MergeError::NotAList("character_book.entries"))
}

fn card_embedding(target: &mut Map<String, Value>, content: &str) -> String {
    let current = target
        .get("extensions")
        .and_then(|e| e.get("risuai"))
        .and_then(|r| r.get("backgroundHTML"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    if content.is_empty() {
        return current;
    }
    let updated = reserved::insert_embedding(&current, content);

    let extensions = object_entry(target, "extensions");
    let risuai = object_entry(extensions, "risuai");
    risuai.insert("backgroundHTML".to_owned(), Value::String(updated.clone()));
    updated
}

fn object_entry<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Map<String, Value> {
    let slot = map.entry(key).or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("replaced with an object above"),
    }
}

fn strip_target(target: &mut Map<String, Value>) {
    for value in target.values_mut() {
        tree::strip_unused_slots(value);
    }
}

fn ordinary_slots<'a>(applied: &[&'a Fragment]) -> Vec<(&'a Fragment, &'a SlotData)> {
    applied
        .iter()
        .filter_map(|f| f.as_slot().map(|s| (*f, s)))
        .filter(|(_, s)| s.reserved().is_none())
        .collect()
}

fn resolve_slots(applied: &[&Fragment]) -> Result<(Vec<ResolvedSlot>, usize), MergeError> {
    let ordinary = ordinary_slots(applied);
    let resolved = slots::resolve(&ordinary).map_err(MergeError::SeparatorConflict)?;
    Ok((resolved, ordinary.len()))
}

fn rule_value(rule: &RegexRule) -> Result<Value, MergeError> {
    Ok(serde_json::to_value(rule)?)
}

// ── merge ────────────────────────────────────────────────────────────────────

/// Merge `fragments` into a copy of `base`.
pub fn merge(base: &Document, fragments: &[Fragment], options: &MergeOptions) -> Result<MergeOutcome, MergeError> {
    let plan = plan(fragments);
    let mut doc = base.clone();
    let module = doc.is_module();
    let mut counts = MergeCounts::default();
    let mut side_regex = Vec::new();

    debug!(
        shape = ?doc.shape(),
        applied = plan.applied.len(),
        removals = plan.removals.len(),
        vetoed = plan.vetoed.len(),
        "merge plan"
    );

    counts.removed_originals = remove_originals(&mut doc, &plan.removals)?;

    let target = doc.target_mut();
    if !module {
        ensure_card_defaults(target);
    }

    let mut module_lore: Vec<(&Fragment, &LorebookData)> = Vec::new();
    for &fragment in &plan.applied {
        match &fragment.data {
            FragmentData::Lorebook(data) if module => module_lore.push((fragment, data)),
            FragmentData::Lorebook(data) => {
                let entry = serde_json::to_value(lorebook::card_entry(fragment, data))?;
                card_entries(target)?.push(entry);
                counts.lorebook += 1;
            }
            FragmentData::Asset(data) => {
                // Module bases keep asset refs in the companion card.
                if !module {
                    let assets = ensure_list(target, "assets")?;
                    for item in &data.content {
                        assets.push(serde_json::to_value(AssetRef::mod_asset(&item.filename, &item.assetname))?);
                    }
                }
                counts.asset += data.content.len();
            }
            FragmentData::Regex(data) => {
                let rules = data.rules.iter().map(rule_value).collect::<Result<Vec<_>, _>>()?;
                counts.regex += rules.len();
                if module {
                    ensure_list(target, "regex")?.extend(rules);
                } else {
                    side_regex.extend(rules);
                }
            }
            FragmentData::Slot(_) => {}
        }
    }

    if !module_lore.is_empty() {
        let entries = lorebook::module_entries(&module_lore);
        let list = ensure_list(target, "lorebook")?;
        for entry in entries {
            list.push(serde_json::to_value(entry)?);
        }
        counts.lorebook += module_lore.len();
    }

    let (resolved, slot_count) = resolve_slots(&plan.applied)?;
    counts.slot = slot_count;

    let embedding_content = reserved::collect(&plan.applied, ReservedSlot::Embedding);
    let embedding = if module {
        let current = target.get("backgroundEmbedding").and_then(Value::as_str).unwrap_or_default().to_owned();
        if embedding_content.is_empty() {
            current
        } else {
            let updated = reserved::insert_embedding(&current, &embedding_content);
            target.insert("backgroundEmbedding".to_owned(), Value::String(updated.clone()));
            updated
        }
    } else {
        card_embedding(target, &embedding_content)
    };

    slots::substitute(target, &resolved);
    strip_target(target);
    let embedding = tree::strip_slots_in(&slots::substitute_str(&embedding, &resolved));

    let lua = slots::substitute_str(&reserved::collect(&plan.applied, ReservedSlot::Lua), &resolved);
    if module && !lua.is_empty() {
        reserved::append_lua(ensure_list(target, "trigger")?, &lua)?;
    }

    let character = options
        .character_name
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| doc_name(target, module))
        .unwrap_or_else(|| options.fallback_name.clone());
    let toggle_menu = reserved::toggle_menu(
        &character,
        &options.toggle_group_title,
        &reserved::toggle_sources(&plan.applied),
        &reserved::collect(&plan.applied, ReservedSlot::Toggle),
    );
    if module && !plan.applied.is_empty() {
        target.insert("customModuleToggle".to_owned(), Value::String(toggle_menu.clone()));
    }

    info!(
        lorebook = counts.lorebook,
        asset = counts.asset,
        regex = counts.regex,
        slot = counts.slot,
        removed = counts.removed_originals,
        vetoed = plan.vetoed.len(),
        "merge complete"
    );

    Ok(MergeOutcome {
        document: doc,
        regex: side_regex,
        accessory: Accessory { lua, toggle_menu, embedding },
        vetoed: plan.vetoed.iter().map(|f| f.id.clone()).collect(),
        counts,
    })
}

fn doc_name(target: &Map<String, Value>, module: bool) -> Option<String> {
    // A module's own `name` is the module title, not the character.
    if module {
        return None;
    }
    target.get("name").and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned)
}

/// Apply asset fragments, ordinary slots and the `<<embedding>>` slot to the
/// card that rides alongside a module-shaped base, then strip unused slots.
pub fn merge_companion(card: &Document, fragments: &[Fragment]) -> Result<Document, MergeError> {
    let plan = plan(fragments);
    let mut doc = card.clone();
    let target = doc.target_mut();

    let mut added = 0;
    for fragment in &plan.applied {
        if let FragmentData::Asset(data) = &fragment.data {
            let assets = ensure_list(target, "assets")?;
            for item in &data.content {
                assets.push(serde_json::to_value(AssetRef::mod_asset(&item.filename, &item.assetname))?);
                added += 1;
            }
        }
    }

    let (resolved, _) = resolve_slots(&plan.applied)?;
    card_embedding(target, &reserved::collect(&plan.applied, ReservedSlot::Embedding));
    slots::substitute(target, &resolved);
    strip_target(target);

    debug!(assets = added, slots = resolved.len(), "companion card merged");
    Ok(doc)
}

/// Post-merge sanity checks.  Returns one message per problem.
pub fn validate_result(doc: &Document) -> Vec<String> {
    let mut errors = Vec::new();
    if let Err(e) = serde_json::to_string(&doc.to_value()) {
        errors.push(format!("JSON serialization failed: {e}"));
    }
    if !doc.is_module() && doc.name().is_none() {
        errors.push("Character name is missing".to_owned());
    }
    errors
}

#[cfg(test)]
mod tests;
