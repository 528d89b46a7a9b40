//! Mod fragments: the units a merge applies to a base document.

use serde::Deserialize;
use serde_json::Value;

use super::entries::{RegexRule, MOD_ASSET_DIR};

/// Slot names routed to dedicated targets instead of text substitution.
/// Matched exactly and case-sensitively.
pub const LUA_SLOT:       &str = "<<lua>>";
pub const TOGGLE_SLOT:    &str = "<<toggle>>";
pub const EMBEDDING_SLOT: &str = "<<embedding>>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Lorebook,
    Asset,
    Slot,
    Regex,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Lorebook => "lorebook",
            Section::Asset    => "asset",
            Section::Slot     => "slot",
            Section::Regex    => "regex",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "lorebook" => Some(Section::Lorebook),
            "asset"    => Some(Section::Asset),
            "slot"     => Some(Section::Slot),
            "regex"    => Some(Section::Regex),
            _          => None,
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedSlot {
    Lua,
    Toggle,
    Embedding,
}

impl ReservedSlot {
    pub fn from_slotname(name: &str) -> Option<Self> {
        match name {
            LUA_SLOT       => Some(ReservedSlot::Lua),
            TOGGLE_SLOT    => Some(ReservedSlot::Toggle),
            EMBEDDING_SLOT => Some(ReservedSlot::Embedding),
            _              => None,
        }
    }
}

// ── Section payloads ─────────────────────────────────────────────────────────

/// Lorebook payload.  Accepts both the card field names and the module
/// field names (`key`, `insertorder`, `alwaysActive`, …).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LorebookData {
    #[serde(default)]
    pub keys:            Vec<String>,
    #[serde(default)]
    pub content:         String,
    pub enabled:         Option<bool>,
    pub insertion_order: Option<i64>,
    pub constant:        Option<bool>,
    pub selective:       Option<bool>,
    pub comment:         Option<String>,
    pub case_sensitive:  Option<bool>,
    pub use_regex:       Option<bool>,
    pub extensions:      Option<Value>,
    pub name:            Option<String>,
    pub key:             Option<String>,
    pub secondkey:       Option<String>,
    pub mode:            Option<String>,
    pub insertorder:     Option<i64>,
    #[serde(rename = "alwaysActive")]
    pub always_active:   Option<bool>,
    #[serde(rename = "bookVersion")]
    pub book_version:    Option<i64>,
    pub folder:          Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetItem {
    pub filename:  String,
    pub assetname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssetData {
    #[serde(default)]
    pub content: Vec<AssetItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlotData {
    pub slotname:   String,
    #[serde(default)]
    pub separator:  Option<String>,
    #[serde(default)]
    pub content:    Vec<String>,
    #[serde(default)]
    pub toggleable: Option<bool>,
}

impl SlotData {
    /// Separator with the default (empty) applied.
    pub fn separator(&self) -> &str {
        self.separator.as_deref().unwrap_or_default()
    }

    pub fn reserved(&self) -> Option<ReservedSlot> {
        ReservedSlot::from_slotname(&self.slotname)
    }

    /// Content items each prefixed with the separator.
    pub fn joined(&self) -> String {
        let sep = self.separator();
        self.content.iter().fold(String::new(), |mut acc, item| {
            acc.push_str(sep);
            acc.push_str(item);
            acc
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegexData {
    #[serde(rename = "data", default)]
    pub rules: Vec<RegexRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FragmentData {
    Lorebook(LorebookData),
    Asset(AssetData),
    Slot(SlotData),
    Regex(RegexData),
}

impl FragmentData {
    pub fn section(&self) -> Section {
        match self {
            FragmentData::Lorebook(_) => Section::Lorebook,
            FragmentData::Asset(_)    => Section::Asset,
            FragmentData::Slot(_)     => Section::Slot,
            FragmentData::Regex(_)    => Section::Regex,
        }
    }
}

// ── Metadata ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FragmentMetadata {
    /// Higher applies first.  Absent means 0.
    #[serde(default)]
    pub order:          Option<f64>,
    /// Names of fragments this one excludes from the merge.
    #[serde(default)]
    pub remove_object:  Vec<String>,
    #[serde(default)]
    pub disable_toggle: bool,
}

/// Raw bytes of a file shipped with an asset fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    /// Path inside the mod package, e.g. `assets/portrait.png`.
    pub path:  String,
    pub bytes: Vec<u8>,
}

impl AssetFile {
    /// Destination path inside the output archive.
    pub fn output_path(&self) -> String {
        let name = self.path.strip_prefix("assets/").unwrap_or(&self.path);
        format!("{MOD_ASSET_DIR}{name}")
    }
}

// ── Fragment ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub id:             String,
    /// `<source>/<item>`; the part before the first `/` names the source.
    pub name:           String,
    pub data:           FragmentData,
    pub metadata:       Option<FragmentMetadata>,
    pub selected:       bool,
    pub is_original:    bool,
    /// Set by [`crate::merge::annotate_vetoes`] for display purposes.
    pub is_removed:     bool,
    /// Index of the base item an original fragment stands for.
    pub original_index: Option<usize>,
    pub files:          Vec<AssetFile>,
}

impl Fragment {
    pub fn new(id: impl Into<String>, name: impl Into<String>, data: FragmentData) -> Self {
        Self {
            id:             id.into(),
            name:           name.into(),
            data,
            metadata:       None,
            selected:       true,
            is_original:    false,
            is_removed:     false,
            original_index: None,
            files:          Vec::new(),
        }
    }

    /// Fragment standing for item `index` of the base document.
    pub fn original(id: impl Into<String>, name: impl Into<String>, data: FragmentData, index: usize) -> Self {
        Self {
            is_original:    true,
            original_index: Some(index),
            ..Self::new(id, name, data)
        }
    }

    pub fn with_metadata(mut self, metadata: FragmentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_files(mut self, files: Vec<AssetFile>) -> Self {
        self.files = files;
        self
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn section(&self) -> Section {
        self.data.section()
    }

    /// Name of the mod source this fragment came from.
    pub fn source(&self) -> &str {
        self.name.split('/').next().unwrap_or_default()
    }

    pub fn order(&self) -> f64 {
        self.metadata.as_ref().and_then(|m| m.order).unwrap_or(0.0)
    }

    pub fn vetoes(&self) -> &[String] {
        self.metadata.as_ref().map(|m| m.remove_object.as_slice()).unwrap_or_default()
    }

    pub fn toggle_disabled(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.disable_toggle)
    }

    pub fn as_slot(&self) -> Option<&SlotData> {
        match &self.data {
            FragmentData::Slot(slot) => Some(slot),
            _ => None,
        }
    }
}
