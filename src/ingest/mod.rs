//! Turning mod sources into fragments.
//!
//! Accepted sources:
//!
//! * a `.json` file holding one mod item or an array of them
//! * a `.json` file in the lorebook export format (`{"type": "risu", ...}`)
//! * a `.zip` mod package: top-level `*.json` items, an optional
//!   `metadata.json`, and images under `assets/`
//!
//! Problems with individual items are collected in [`IngestReport::errors`]
//! and never abort the rest of the batch.

mod export;
mod validate;

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveSource, ZipSource};
use crate::model::{
    AssetData, AssetFile, AssetItem, Document, Fragment, FragmentData, FragmentMetadata, LorebookData,
    RegexData, Section, SlotData,
};

pub use export::{parse_lorebook_export, ExportError};
pub use validate::validate_item;

const METADATA_ENTRY:     &str = "metadata.json";
const LOREBOOK_EXPORT:    &str = "lorebook_export.json";
const ASSET_DIR:          &str = "assets/";
const IMAGE_EXTENSIONS:   [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];
const AUTO_ASSET_NAME:    &str = "Asset pack";
const ORIGINAL_SOURCE:    &str = "original";

/// Fragments read from a batch of sources plus per-item problems.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub fragments: Vec<Fragment>,
    pub errors:    Vec<String>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: IngestReport) {
        self.fragments.extend(other.fragments);
        self.errors.extend(other.errors);
    }
}

/// `metadata.json` of a mod package.
#[derive(Debug, Clone, Default, Deserialize)]
struct PackMetadata {
    #[serde(default)]
    mod_name: Option<String>,
    #[serde(flatten)]
    fragment: FragmentMetadata,
}

/// File name without a trailing `.zip` / `.json` (case-insensitive).
pub fn source_name(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    for ext in [".zip", ".json"] {
        if lower.ends_with(ext) {
            return &file_name[..file_name.len() - ext.len()];
        }
    }
    file_name
}

/// `[[name]]` is accepted as an alias for `<<name>>`.
pub fn normalize_slotname(slotname: &str) -> String {
    match slotname.strip_prefix("[[").and_then(|s| s.strip_suffix("]]")) {
        Some(inner) if !inner.is_empty() => format!("<<{inner}>>"),
        _ => slotname.to_owned(),
    }
}

fn is_image(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn file_stem(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}

// ── JSON sources ─────────────────────────────────────────────────────────────

/// Everything one JSON document contributes, named under `source`.
struct JsonSource<'a> {
    source:   &'a str,
    /// Label used in ids and error messages (`pack.zip/lore.json`).
    label:    &'a str,
    /// File name inside the source, used when an item has no name.
    file:     &'a str,
    metadata: Option<&'a FragmentMetadata>,
    files:    &'a [AssetFile],
}

impl JsonSource<'_> {
    fn fragment(&self, id: String, name: String, data: FragmentData) -> Fragment {
        let mut fragment = Fragment::new(id, name, data);
        fragment.metadata = self.metadata.cloned();
        fragment
    }

    fn ingest(&self, value: Value, report: &mut IngestReport) {
        if is_export(self.file, &value) {
            self.ingest_export(&value, report);
            return;
        }

        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let many = items.len() > 1;
        for (i, item) in items.into_iter().enumerate() {
            let problems = validate_item(&item);
            if !problems.is_empty() {
                report.errors.push(format!("{}[{i}]: {}", self.label, problems.join(", ")));
                continue;
            }
            if let Err(e) = self.ingest_item(i, many, item, report) {
                report.errors.push(format!("{}[{i}]: {e}", self.label));
            }
        }
    }

    fn ingest_item(&self, i: usize, many: bool, item: Value, report: &mut IngestReport) -> Result<(), serde_json::Error> {
        let suffix = if many { format!("[{i}]") } else { String::new() };
        let id = format!("{}#{i}", self.label);

        if item.get("type").and_then(Value::as_str) == Some("regex") {
            let data: RegexData = serde_json::from_value(item)?;
            let name = format!("{}/{}{suffix}", self.source, self.file);
            report.fragments.push(self.fragment(id, name, FragmentData::Regex(data)));
            return Ok(());
        }

        let section = item.get("section").and_then(Value::as_str).and_then(Section::from_name);
        let item_name = item.get("name").and_then(Value::as_str).unwrap_or(self.file).to_owned();

        match section {
            Some(Section::Slot) => {
                let mut data: SlotData = serde_json::from_value(item)?;
                data.slotname = normalize_slotname(&data.slotname);
                if data.content.is_empty() {
                    let name = format!("{}/{item_name}{suffix}", self.source);
                    report.fragments.push(self.fragment(id, name, FragmentData::Slot(data)));
                    return Ok(());
                }
                // One fragment per content item, so each can be picked alone.
                for (ci, content) in data.content.iter().enumerate() {
                    let piece = SlotData { content: vec![content.clone()], ..data.clone() };
                    let name = format!("{}/{item_name}/{ci}", self.source);
                    report.fragments.push(self.fragment(format!("{id}.{ci}"), name, FragmentData::Slot(piece)));
                }
            }
            Some(Section::Asset) => {
                let data: AssetData = serde_json::from_value(item)?;
                let name = format!("{}/{item_name}{suffix}", self.source);
                let fragment = self.fragment(id, name, FragmentData::Asset(data)).with_files(self.files.to_vec());
                report.fragments.push(fragment);
            }
            Some(Section::Lorebook) => {
                let mut data: LorebookData = serde_json::from_value(item)?;
                let name = format!("{}/{item_name}{suffix}", self.source);
                data.name = Some(name.clone());
                report.fragments.push(self.fragment(id, name, FragmentData::Lorebook(data)));
            }
            Some(Section::Regex) | None => {
                report.errors.push(format!("{}[{i}]: unsupported section", self.label));
            }
        }
        Ok(())
    }

    fn ingest_export(&self, value: &Value, report: &mut IngestReport) {
        match parse_lorebook_export(value) {
            Ok(entries) => {
                for (i, mut data) in entries.into_iter().enumerate() {
                    let item = data.name.clone().unwrap_or_default();
                    let name = format!("{}/{item}", self.source);
                    data.name = Some(name.clone());
                    let id = format!("{}#export.{i}", self.label);
                    report.fragments.push(self.fragment(id, name, FragmentData::Lorebook(data)));
                }
            }
            Err(e) => report.errors.push(format!("{}: {e}", self.label)),
        }
    }
}

fn is_export(file: &str, value: &Value) -> bool {
    file.eq_ignore_ascii_case(LOREBOOK_EXPORT) || value.get("type").and_then(Value::as_str) == Some("risu")
}

/// Ingest one JSON source held in memory.
pub fn ingest_json(file_name: &str, bytes: &[u8]) -> IngestReport {
    let mut report = IngestReport::default();
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => {
            let src = JsonSource {
                source:   source_name(file_name),
                label:    file_name,
                file:     file_name,
                metadata: None,
                files:    &[],
            };
            src.ingest(value, &mut report);
        }
        Err(e) => report.errors.push(format!("{file_name}: JSON parse error: {e}")),
    }
    debug!(file = file_name, fragments = report.fragments.len(), errors = report.errors.len(), "ingested json");
    report
}

// ── Mod packages ─────────────────────────────────────────────────────────────

/// Ingest a ZIP mod package held in memory.
pub fn ingest_package(file_name: &str, bytes: Vec<u8>) -> IngestReport {
    let mut report = IngestReport::default();
    let mut zip = match ZipSource::from_bytes(bytes) {
        Ok(zip) => zip,
        Err(e) => {
            report.errors.push(format!("{file_name}: cannot read ZIP: {e}"));
            return report;
        }
    };

    let mut json_paths = Vec::new();
    let mut image_paths = Vec::new();
    for entry in zip.list_entries().iter().filter(|e| !e.is_dir) {
        let path = entry.path.as_str();
        if !path.contains('/') && path.to_ascii_lowercase().ends_with(".json") {
            if !path.eq_ignore_ascii_case(METADATA_ENTRY) {
                json_paths.push(path.to_owned());
            }
        } else if path.starts_with(ASSET_DIR) && is_image(path) {
            image_paths.push(path.to_owned());
        }
    }

    let mut metadata = None;
    match zip.read_optional(METADATA_ENTRY) {
        Ok(Some(raw)) => match serde_json::from_slice::<PackMetadata>(&raw) {
            Ok(meta) => metadata = Some(meta),
            Err(e) => report.errors.push(format!("{file_name}/{METADATA_ENTRY}: parse error: {e}")),
        },
        Ok(None) => {}
        Err(e) => report.errors.push(format!("{file_name}/{METADATA_ENTRY}: {e}")),
    }

    let source = metadata
        .as_ref()
        .and_then(|m| m.mod_name.as_deref())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| source_name(file_name))
        .to_owned();
    let fragment_meta = metadata.map(|m| m.fragment);

    let mut files = Vec::with_capacity(image_paths.len());
    for path in &image_paths {
        match zip.read_entry(path) {
            Ok(bytes) => files.push(AssetFile { path: path.clone(), bytes }),
            Err(e) => warn!(package = file_name, path = %path, error = %e, "asset image unreadable; skipped"),
        }
    }

    for path in &json_paths {
        let label = format!("{file_name}/{path}");
        let value = zip
            .read_entry(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_slice::<Value>(&raw).map_err(|e| format!("JSON parse error: {e}")));
        match value {
            Ok(value) => {
                let src = JsonSource {
                    source:   &source,
                    label:    &label,
                    file:     path,
                    metadata: fragment_meta.as_ref(),
                    files:    &files,
                };
                src.ingest(value, &mut report);
            }
            Err(e) => report.errors.push(format!("{label}: {e}")),
        }
    }

    let has_asset_json = json_paths.iter().any(|p| p.to_ascii_lowercase().contains("asset"));
    if !has_asset_json && !files.is_empty() {
        let content = files
            .iter()
            .map(|f| {
                let filename = f.path.rsplit('/').next().unwrap_or(&f.path).to_owned();
                AssetItem { assetname: file_stem(&filename).to_owned(), filename }
            })
            .collect();
        let mut fragment = Fragment::new(
            format!("{file_name}#auto-asset"),
            format!("{source}/{AUTO_ASSET_NAME}"),
            FragmentData::Asset(AssetData { content }),
        )
        .with_files(files.clone());
        fragment.metadata = fragment_meta.clone();
        report.fragments.push(fragment);
    }

    if json_paths.is_empty() && image_paths.is_empty() {
        report.errors.push(format!("{file_name}: no mod items or asset images found"));
    }

    debug!(
        package = file_name,
        source = %source,
        fragments = report.fragments.len(),
        errors = report.errors.len(),
        "ingested mod package"
    );
    report
}

/// Ingest a file from disk, dispatching on its extension.
pub fn ingest_path(path: &Path) -> IngestReport {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_owned();
    let lower = file_name.to_ascii_lowercase();

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return IngestReport { errors: vec![format!("{}: {e}", path.display())], ..Default::default() };
        }
    };

    if lower.ends_with(".zip") {
        ingest_package(&file_name, bytes)
    } else if lower.ends_with(".json") {
        ingest_json(&file_name, &bytes)
    } else {
        IngestReport { errors: vec![format!("{file_name}: unsupported file type")], ..Default::default() }
    }
}

/// Ingest several files into one report.
pub fn ingest_paths<P: AsRef<Path>>(paths: &[P]) -> IngestReport {
    let mut report = IngestReport::default();
    for path in paths {
        report.merge(ingest_path(path.as_ref()));
    }
    info!(fragments = report.fragments.len(), errors = report.errors.len(), "ingest complete");
    report
}

// ── Original items ───────────────────────────────────────────────────────────

/// Fragments standing for the lorebook (and, on modules, regex) items the
/// base document already has.  They start selected; deselecting one removes
/// the item during the merge.
pub fn original_fragments(doc: &Document) -> Vec<Fragment> {
    let target = doc.target();
    let mut out = Vec::new();

    let lorebook = if doc.is_module() {
        target.get("lorebook")
    } else {
        target.get("character_book").and_then(|b| b.get("entries"))
    };
    for (i, entry) in lorebook.and_then(Value::as_array).into_iter().flatten().enumerate() {
        let label = item_label(entry, "Lorebook", i);
        let name = format!("{ORIGINAL_SOURCE}/{label}");
        let mut data: LorebookData = serde_json::from_value(entry.clone()).unwrap_or_default();
        data.name = Some(name.clone());
        out.push(Fragment::original(format!("original-lorebook-{i}"), name, FragmentData::Lorebook(data), i));
    }

    if doc.is_module() {
        for (i, entry) in target.get("regex").and_then(Value::as_array).into_iter().flatten().enumerate() {
            let name = format!("{ORIGINAL_SOURCE}/{}", item_label(entry, "Regex", i));
            let rules = serde_json::from_value(entry.clone()).map(|r| vec![r]).unwrap_or_default();
            out.push(Fragment::original(
                format!("original-regex-{i}"),
                name,
                FragmentData::Regex(RegexData { rules }),
                i,
            ));
        }
    }
    out
}

fn item_label(entry: &Value, kind: &str, index: usize) -> String {
    entry
        .get("comment")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{kind} {index}"))
}
