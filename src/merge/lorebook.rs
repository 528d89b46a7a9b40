//! Lorebook entries built from fragments, in card and module form.

use crate::model::{default_lore_extensions, CardLoreEntry, Fragment, LorebookData, ModuleLoreEntry};
use crate::model::entries::FOLDER_KEY_PREFIX;

use super::slots::toggle_wrap;

const DEFAULT_INSERTION_ORDER: i64 = 10;
const DEFAULT_BOOK_VERSION:    i64 = 2;
const DEFAULT_MODE:            &str = "normal";

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

/// Entry for `character_book.entries`.
pub fn card_entry(fragment: &Fragment, data: &LorebookData) -> CardLoreEntry {
    CardLoreEntry {
        keys:            data.keys.clone(),
        content:         data.content.clone(),
        extensions:      data
            .extensions
            .clone()
            .filter(|v| !v.is_null())
            .unwrap_or_else(default_lore_extensions),
        enabled:         data.enabled.unwrap_or(true),
        insertion_order: data.insertion_order.unwrap_or(DEFAULT_INSERTION_ORDER),
        constant:        data.constant.unwrap_or(true),
        selective:       data.selective.unwrap_or(false),
        name:            non_empty(&data.name).unwrap_or(fragment.name.as_str()).to_owned(),
        comment:         data.comment.clone().unwrap_or_default(),
        case_sensitive:  data.case_sensitive.unwrap_or(false),
        use_regex:       data.use_regex.unwrap_or(false),
    }
}

/// Folder key for a source.  Derived from the source name so repeated merges
/// produce identical output.
pub fn folder_key(source: &str) -> String {
    let digest = blake3::hash(source.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    let id = uuid::Builder::from_random_bytes(bytes).into_uuid();
    format!("{FOLDER_KEY_PREFIX}{id}")
}

/// Member entry of a module lorebook folder.
pub fn module_entry(data: &LorebookData, source: &str, folder: &str, toggle: bool) -> ModuleLoreEntry {
    let content = if toggle && !source.is_empty() && !data.content.is_empty() {
        toggle_wrap(source, &data.content)
    } else {
        data.content.clone()
    };

    ModuleLoreEntry {
        key:           non_empty(&data.key).map(str::to_owned).unwrap_or_else(|| data.keys.join(", ")),
        comment:       non_empty(&data.comment).or(non_empty(&data.name)).unwrap_or_default().to_owned(),
        content,
        mode:          non_empty(&data.mode).unwrap_or(DEFAULT_MODE).to_owned(),
        insertorder:   data.insertorder.or(data.insertion_order).unwrap_or(DEFAULT_INSERTION_ORDER),
        always_active: data.always_active.unwrap_or(data.enabled != Some(false)),
        secondkey:     data.secondkey.clone().unwrap_or_default(),
        selective:     data.selective == Some(true),
        use_regex:     Some(data.use_regex == Some(true)),
        book_version:  data.book_version.filter(|v| *v != 0).unwrap_or(DEFAULT_BOOK_VERSION),
        folder:        Some(folder.to_owned()),
    }
}

/// Module lorebook entries for `fragments`: one folder per source, in order
/// of first appearance, each followed by its members.
pub fn module_entries(fragments: &[(&Fragment, &LorebookData)]) -> Vec<ModuleLoreEntry> {
    let mut groups: Vec<(&str, Vec<(&Fragment, &LorebookData)>)> = Vec::new();
    for &(fragment, data) in fragments {
        match groups.iter_mut().find(|(src, _)| *src == fragment.source()) {
            Some((_, members)) => members.push((fragment, data)),
            None => groups.push((fragment.source(), vec![(fragment, data)])),
        }
    }

    let mut entries = Vec::with_capacity(fragments.len() + groups.len());
    for (source, members) in groups {
        let key = folder_key(source);
        entries.push(ModuleLoreEntry::folder(key.clone(), source));
        for (fragment, data) in members {
            entries.push(module_entry(data, source, &key, !fragment.toggle_disabled()));
        }
    }
    entries
}
