//! The lorebook export format: `{"type": "risu", "data": [entry, ...]}`
//! with module-style entries.  Each `normal` or `folder` entry becomes a
//! card-style lorebook payload; comma-delimited `key`/`secondkey` strings
//! are split into `keys`.

use serde_json::{json, Value};
use thiserror::Error;

use crate::model::LorebookData;

const EXPORT_TYPE: &str = "risu";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExportError {
    #[error("Not a lorebook export (expected `type: \"risu\"` with a `data` array)")]
    NotAnExport,
}

fn split_keys(raw: Option<&str>) -> impl Iterator<Item = String> + '_ {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
}

fn str_field<'v>(entry: &'v Value, key: &str) -> Option<&'v str> {
    entry.get(key).and_then(Value::as_str)
}

pub fn parse_lorebook_export(value: &Value) -> Result<Vec<LorebookData>, ExportError> {
    if value.get("type").and_then(Value::as_str) != Some(EXPORT_TYPE) {
        return Err(ExportError::NotAnExport);
    }
    let entries = value.get("data").and_then(Value::as_array).ok_or(ExportError::NotAnExport)?;

    let usable = entries
        .iter()
        .filter(|e| matches!(str_field(e, "mode"), Some("normal" | "folder")));

    let mut out = Vec::new();
    for (i, entry) in usable.enumerate() {
        let keys: Vec<String> = split_keys(str_field(entry, "key"))
            .chain(split_keys(str_field(entry, "secondkey")))
            .collect();
        let comment = str_field(entry, "comment").unwrap_or_default().to_owned();
        let name = if !comment.is_empty() {
            comment.clone()
        } else if let Some(first) = keys.first() {
            first.clone()
        } else {
            format!("Entry {}", i + 1)
        };

        let use_regex = entry.get("useRegex").and_then(Value::as_bool) == Some(true);
        let always_active = entry.get("alwaysActive").and_then(Value::as_bool);
        let active = always_active != Some(false);
        let insertorder = entry.get("insertorder").and_then(Value::as_i64);

        out.push(LorebookData {
            keys,
            content:         str_field(entry, "content").unwrap_or_default().to_owned(),
            enabled:         Some(active),
            insertion_order: Some(insertorder.filter(|o| *o != 0).unwrap_or(10)),
            constant:        Some(active),
            selective:       Some(entry.get("selective").and_then(Value::as_bool) == Some(true)),
            comment:         Some(comment),
            case_sensitive:  Some(use_regex),
            use_regex:       Some(use_regex),
            extensions:      Some(json!({ "risu_case_sensitive": use_regex, "risu_loreCache": null })),
            name:            Some(name),
            key:             Some(str_field(entry, "key").unwrap_or_default().to_owned()),
            secondkey:       Some(str_field(entry, "secondkey").unwrap_or_default().to_owned()),
            mode:            str_field(entry, "mode").map(str::to_owned),
            insertorder,
            always_active,
            book_version:    Some(entry.get("bookVersion").and_then(Value::as_i64).filter(|v| *v != 0).unwrap_or(2)),
            folder:          str_field(entry, "folder").filter(|f| !f.is_empty()).map(str::to_owned),
        });
    }
    Ok(out)
}
