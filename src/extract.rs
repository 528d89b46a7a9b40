//! Turn pieces of a base archive back into a mod pack.
//!
//! Selected lorebook entries land in `lorebook.json`, selected
//! `x-risu-asset` references in `asset.json` with their files copied to
//! `assets/extracted_asset_<n>.<ext>`.  `asset.json` is always written so the
//! pack has the usual layout even without assets.

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::archive::{ArchiveBuilder, ArchiveError, ArchiveSink};
use crate::model::{default_lore_extensions, Document, ASSET_TYPE};
use crate::package::BaseArchive;

const EMBED_SCHEME: &str = "embeded://";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Base has no card document to extract from")]
    NoCard,
    #[error("Lorebook index {index} out of range ({len} entries)")]
    LorebookIndex { index: usize, len: usize },
    #[error("Asset index {index} out of range ({len} assets)")]
    AssetIndex { index: usize, len: usize },
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Indices into the card's `character_book.entries` and into its
/// `x-risu-asset` assets (counted among those assets only).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub lorebook: Vec<usize>,
    pub asset:    Vec<usize>,
}

fn card_of(base: &BaseArchive) -> Option<&Document> {
    if base.document.is_module() {
        base.companion.as_ref()
    } else {
        Some(&base.document)
    }
}

fn lore_item(entry: &Value, index: usize) -> Value {
    let str_or = |key: &str, fallback: String| {
        entry.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned).unwrap_or(fallback)
    };
    let bool_or = |key: &str, fallback: bool| entry.get(key).and_then(Value::as_bool).unwrap_or(fallback);

    json!({
        "name":            str_or("name", format!("Lorebook entry {}", index + 1)),
        "section":         "lorebook",
        "keys":            entry.get("keys").filter(|k| k.is_array()).cloned().unwrap_or_else(|| json!([])),
        "content":         str_or("content", String::new()),
        "extensions":      entry.get("extensions").filter(|e| e.is_object()).cloned().unwrap_or_else(default_lore_extensions),
        "enabled":         bool_or("enabled", true),
        "insertion_order": entry.get("insertion_order").and_then(Value::as_i64).filter(|o| *o != 0).unwrap_or(10),
        "constant":        bool_or("constant", true),
        "selective":       bool_or("selective", false),
        "comment":         str_or("comment", "Extracted from the original".to_owned()),
        "case_sensitive":  bool_or("case_sensitive", false),
        "use_regex":       bool_or("use_regex", false),
    })
}

/// Build a mod pack ZIP from `selection`.
pub fn extract(base: &BaseArchive, selection: &Selection) -> Result<Vec<u8>, ExtractError> {
    let card = card_of(base).ok_or(ExtractError::NoCard)?;
    let target = card.target();
    let mut out = ArchiveBuilder::new();

    let entries = target
        .get("character_book")
        .and_then(|b| b.get("entries"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut lore = Vec::with_capacity(selection.lorebook.len());
    for &index in &selection.lorebook {
        let entry = entries.get(index).ok_or(ExtractError::LorebookIndex { index, len: entries.len() })?;
        lore.push(lore_item(entry, index));
    }
    if !lore.is_empty() {
        out.write_entry("lorebook.json", serde_json::to_vec_pretty(&lore)?)?;
    }

    let assets: Vec<&Value> = target
        .get("assets")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter(|a| a.get("type").and_then(Value::as_str) == Some(ASSET_TYPE)).collect())
        .unwrap_or_default();
    let mut asset_items = Vec::with_capacity(selection.asset.len());
    for &index in &selection.asset {
        let asset = assets.get(index).ok_or(ExtractError::AssetIndex { index, len: assets.len() })?;
        let ext = asset.get("ext").and_then(Value::as_str).filter(|e| !e.is_empty()).unwrap_or("png");
        let filename = format!("extracted_asset_{}.{ext}", index + 1);
        let name = asset
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Extracted asset {}", index + 1));

        let uri = asset.get("uri").and_then(Value::as_str).unwrap_or_default();
        let bytes = uri
            .strip_prefix(EMBED_SCHEME)
            .and_then(|path| base.entries.iter().find(|(p, _)| p == path))
            .map(|(_, b)| b.clone());
        match bytes {
            Some(bytes) => out.write_entry(&format!("assets/{filename}"), bytes)?,
            None => warn!(uri, "asset file not found in base archive; reference kept without file"),
        }

        asset_items.push(json!({
            "name":    name,
            "section": "asset",
            "content": [{ "filename": filename, "assetname": name }],
        }));
    }
    out.write_entry("asset.json", serde_json::to_vec_pretty(&asset_items)?)?;

    info!(lorebook = lore.len(), asset = asset_items.len(), "mod pack extracted");
    Ok(out.finish()?)
}
