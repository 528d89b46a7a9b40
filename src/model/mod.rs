//! Documents, fragments and the entry records a merge produces.

pub mod document;
pub mod entries;
pub mod fragment;

pub use document::{Document, DocumentError, Shape, MODULE_SPEC};
pub use entries::{
    default_character_book, default_lore_extensions, extension_of, AssetRef, CardLoreEntry,
    ModuleBody, ModuleLoreEntry, RegexRule, TriggerEffect, TriggerSpec, ASSET_TYPE, MOD_ASSET_DIR,
};
pub use fragment::{
    AssetData, AssetFile, AssetItem, Fragment, FragmentData, FragmentMetadata, LorebookData,
    RegexData, ReservedSlot, Section, SlotData, EMBEDDING_SLOT, LUA_SLOT, TOGGLE_SLOT,
};
