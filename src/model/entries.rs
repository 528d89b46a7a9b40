//! Typed records the merge engine writes into documents.
//!
//! Base documents are kept as open JSON so that fields this crate does not
//! know about survive a merge untouched.  Everything the engine *creates* goes
//! through one of these structs, so new entries always have the same shape.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

pub const ASSET_TYPE: &str = "x-risu-asset";
pub const MOD_ASSET_DIR: &str = "assets/mod/";
pub const DEFAULT_ASSET_EXT: &str = "png";

/// Prefix of the key of a module lorebook folder entry.
pub const FOLDER_KEY_PREFIX: &str = "\u{f000}folder:";

/// Lorebook entry in the card (`character_book.entries`) schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardLoreEntry {
    pub keys:            Vec<String>,
    pub content:         String,
    pub extensions:      Value,
    pub enabled:         bool,
    pub insertion_order: i64,
    pub constant:        bool,
    pub selective:       bool,
    pub name:            String,
    pub comment:         String,
    pub case_sensitive:  bool,
    pub use_regex:       bool,
}

/// Default `extensions` object of a card lorebook entry.
pub fn default_lore_extensions() -> Value {
    json!({ "risu_case_sensitive": false, "risu_loreCache": null })
}

/// Default `character_book` for cards that have none.
pub fn default_character_book() -> Value {
    json!({
        "scan_depth": 7,
        "token_budget": 99999,
        "recursive_scanning": false,
        "extensions": { "risu_fullWordMatching": false },
        "entries": []
    })
}

/// Lorebook entry in the module (`module.lorebook`) schema.  Folder entries
/// and regular entries share it; `folder` is only set on members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleLoreEntry {
    pub key:           String,
    pub comment:       String,
    pub content:       String,
    pub mode:          String,
    pub insertorder:   i64,
    pub always_active: bool,
    pub secondkey:     String,
    pub selective:     bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_regex:     Option<bool>,
    pub book_version:  i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder:        Option<String>,
}

impl ModuleLoreEntry {
    pub fn folder(key: String, source: &str) -> Self {
        Self {
            key,
            comment:       source.to_owned(),
            content:       String::new(),
            mode:          "folder".to_owned(),
            insertorder:   100,
            always_active: false,
            secondkey:     String::new(),
            selective:     false,
            use_regex:     None,
            book_version:  2,
            folder:        None,
        }
    }
}

/// Asset reference in a card's `assets` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub uri:  String,
    pub name: String,
    pub ext:  String,
}

impl AssetRef {
    /// Reference to a file a mod placed under `assets/mod/`.
    pub fn mod_asset(filename: &str, assetname: &str) -> Self {
        Self {
            kind: ASSET_TYPE.to_owned(),
            uri:  format!("embeded://{MOD_ASSET_DIR}{filename}"),
            name: assetname.to_owned(),
            ext:  extension_of(filename).to_owned(),
        }
    }
}

/// Suffix after the last `.`, or `png` when there is none.
pub fn extension_of(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => DEFAULT_ASSET_EXT,
    }
}

/// One regex replacement rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexRule {
    pub comment: String,
    #[serde(rename = "in")]
    pub pattern: String,
    pub out:     String,
    #[serde(rename = "type")]
    pub kind:    String,
    #[serde(rename = "ableFlag")]
    pub able_flag: bool,
    #[serde(flatten)]
    pub extra:   Map<String, Value>,
}

/// A trigger that runs Lua code when a chat starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    pub comment:          String,
    #[serde(rename = "type")]
    pub kind:             String,
    pub conditions:       Vec<Value>,
    pub effect:           Vec<TriggerEffect>,
    pub low_level_access: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEffect {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
}

impl TriggerSpec {
    pub fn lua(code: String) -> Self {
        Self {
            comment:          String::new(),
            kind:             "start".to_owned(),
            conditions:       Vec::new(),
            effect:           vec![TriggerEffect { kind: "triggerlua".to_owned(), code }],
            low_level_access: false,
        }
    }
}

/// `null` reads as the field's default, the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Module body.  Known lists are typed loosely so that foreign entries pass
/// through; unknown top-level fields are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleBody {
    #[serde(default, deserialize_with = "null_as_default")]
    pub lorebook:             Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub regex:                Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trigger:              Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub background_embedding: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_module_toggle: String,
    #[serde(flatten)]
    pub extra:                Map<String, Value>,
}

impl ModuleBody {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Copy with every lorebook `content` blanked.  Distributed next to the
    /// full module so the entry list is visible without the text.
    pub fn without_lore_content(&self) -> Self {
        let mut stripped = self.clone();
        for entry in &mut stripped.lorebook {
            if let Some(content) = entry.get_mut("content") {
                if content.is_string() {
                    *content = Value::String(String::new());
                }
            }
        }
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_ref_for_mod_file() {
        let asset = AssetRef::mod_asset("a.png", "Portrait");
        assert_eq!(
            serde_json::to_value(&asset).unwrap(),
            json!({"type": "x-risu-asset", "uri": "embeded://assets/mod/a.png", "name": "Portrait", "ext": "png"})
        );
    }

    #[test]
    fn extension_defaults_to_png() {
        assert_eq!(extension_of("sprite"), "png");
        assert_eq!(extension_of("pack.tar.webp"), "webp");
    }

    #[test]
    fn module_body_keeps_unknown_fields() {
        let value = json!({
            "name": "m",
            "id": "abc",
            "lorebook": [{"content": "secret", "key": "k"}],
            "backgroundEmbedding": "<style></style>"
        });
        let body = ModuleBody::from_value(value).unwrap();
        assert_eq!(body.extra["id"], "abc");
        assert_eq!(body.background_embedding, "<style></style>");

        let stripped = body.without_lore_content().to_value().unwrap();
        assert_eq!(stripped["lorebook"][0], json!({"content": "", "key": "k"}));
        assert_eq!(stripped["name"], "m");
    }

    #[test]
    fn module_body_reads_null_fields_as_empty() {
        let value = json!({
            "name": "m",
            "lorebook": [{"content": "secret", "key": "k"}],
            "regex": null,
            "backgroundEmbedding": null,
            "customModuleToggle": null
        });
        let body = ModuleBody::from_value(value).unwrap();
        assert!(body.regex.is_empty());
        assert_eq!(body.background_embedding, "");
        assert_eq!(body.custom_module_toggle, "");
        assert!(!body.extra.contains_key("backgroundEmbedding"));

        let stripped = body.without_lore_content().to_value().unwrap();
        assert_eq!(stripped["customModuleToggle"], "");
        assert_eq!(stripped["lorebook"][0]["content"], "");
    }

    #[test]
    fn lua_trigger_shape() {
        let value = serde_json::to_value(TriggerSpec::lua("print(1)".into())).unwrap();
        assert_eq!(value, json!({
            "comment": "",
            "type": "start",
            "conditions": [],
            "effect": [{"type": "triggerlua", "code": "print(1)"}],
            "lowLevelAccess": false
        }));
    }
}
