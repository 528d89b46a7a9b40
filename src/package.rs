//! Packaging: merged document + fragments -> a fresh `.charx` archive.
//!
//! The source archive is only ever read.  Output is assembled in an
//! [`ArchiveBuilder`] and turned into ZIP bytes in one step at the end.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveBuilder, ArchiveError, ArchiveSink, ArchiveSource, ZipSource, CARD_ENTRY, MODULE_ENTRY};
use crate::codec::{get_codec, Codec, CodecId};
use crate::container::{self, ContainerError};
use crate::merge::{self, MergeError, MergeOptions, MergeOutcome};
use crate::model::{Document, DocumentError, Fragment, FragmentData, ModuleBody, MOD_ASSET_DIR};

/// Extensions of original images carried over into card-shaped output.
const CARRIED_IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "svg"];
const ASSET_DIR: &str = "assets/";

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── PackageOptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PackageOptions {
    pub codec:            CodecId,
    /// Entry holding the card JSON.
    pub companion_entry:  String,
    /// Entry holding the RISUM module container.
    pub container_entry:  String,
    /// Card-shaped bases: also write a module with trigger, regex, toggle
    /// menu and embedding.
    pub accessory_module: bool,
    pub merge:            MergeOptions,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            codec:            CodecId::default(),
            companion_entry:  CARD_ENTRY.to_owned(),
            container_entry:  MODULE_ENTRY.to_owned(),
            accessory_module: true,
            merge:            MergeOptions::default(),
        }
    }
}

// ── Base loading ──────────────────────────────────────────────────────────────

/// A base archive opened for merging.
#[derive(Debug, Clone)]
pub struct BaseArchive {
    /// Module document when the archive holds a container, else the card.
    pub document:  Document,
    /// The card riding alongside a module container, if any.
    pub companion: Option<Document>,
    /// Assets decoded from the container, in order.
    pub assets:    Vec<Vec<u8>>,
    /// Every file entry of the source archive.
    pub entries:   Vec<(String, Vec<u8>)>,
}

/// Open a base archive.  A container entry wins over the card entry.
pub fn load_base(bytes: Vec<u8>, options: &PackageOptions) -> Result<BaseArchive, PackageError> {
    let mut zip = ZipSource::from_bytes(bytes)?;
    let paths: Vec<String> = zip.list_entries().iter().filter(|e| !e.is_dir).map(|e| e.path.clone()).collect();

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let data = zip.read_entry(&path)?;
        entries.push((path, data));
    }
    let entry = |name: &str| entries.iter().find(|(p, _)| p == name).map(|(_, b)| b.as_slice());

    if let Some(raw) = entry(&options.container_entry) {
        let codec = get_codec(options.codec);
        let decoded = container::decode(raw, codec.as_ref())?;
        let companion = entry(&options.companion_entry).map(Document::from_slice).transpose()?;
        let document = Document::from_module(decoded.module)?;
        info!(assets = decoded.assets.len(), companion = companion.is_some(), "loaded module base");
        return Ok(BaseArchive { document, companion, assets: decoded.assets, entries });
    }

    let raw = entry(&options.companion_entry)
        .ok_or_else(|| ArchiveError::MissingEntry(options.companion_entry.clone()))?;
    let document = Document::from_slice(raw)?;
    info!(shape = ?document.shape(), "loaded card base");
    Ok(BaseArchive { document, companion: None, assets: Vec::new(), entries })
}

/// [`load_base`] on a file.
pub fn load_base_file<P: AsRef<Path>>(path: P, options: &PackageOptions) -> Result<BaseArchive, PackageError> {
    load_base(fs::read(path)?, options)
}

// ── Assembly ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PackageOutput {
    /// The final `.charx` bytes.
    pub archive:      Vec<u8>,
    /// Module-shaped bases: a container with lorebook text blanked and no
    /// assets, distributed next to the archive.
    pub toggle_module: Option<Vec<u8>>,
    pub outcome:      MergeOutcome,
}

/// Merge `fragments` into `base` and build the output archive.
pub fn assemble(base: &BaseArchive, fragments: &[Fragment], options: &PackageOptions) -> Result<PackageOutput, PackageError> {
    let codec = get_codec(options.codec);
    let mut merge_options = options.merge.clone();
    if merge_options.character_name.is_none() {
        merge_options.character_name = base.companion.as_ref().and_then(|c| c.name()).map(str::to_owned);
    }

    let outcome = merge::merge(&base.document, fragments, &merge_options)?;
    let mut out = ArchiveBuilder::new();

    let toggle_module = if base.document.is_module() {
        Some(assemble_module(base, fragments, &outcome, codec.as_ref(), options, &mut out)?)
    } else {
        assemble_card(base, &outcome, codec.as_ref(), options, &mut out)?;
        None
    };
    write_asset_files(fragments, &mut out)?;

    let entries = out.len();
    let archive = out.finish()?;
    info!(entries, bytes = archive.len(), "package assembled");
    Ok(PackageOutput { archive, toggle_module, outcome })
}

fn assemble_module(
    base: &BaseArchive,
    fragments: &[Fragment],
    outcome: &MergeOutcome,
    codec: &dyn Codec,
    options: &PackageOptions,
    out: &mut ArchiveBuilder,
) -> Result<Vec<u8>, PackageError> {
    for (path, data) in &base.entries {
        if *path != options.container_entry && *path != options.companion_entry {
            out.write_entry(path, data.clone())?;
        }
    }

    let companion = match &base.companion {
        Some(card) => Some(merge::merge_companion(card, fragments)?),
        None if applies_assets(fragments) => {
            debug!("no companion card in base; writing one for asset references");
            Some(merge::merge_companion(&Document::blank_card(), fragments)?)
        }
        None => None,
    };
    if let Some(card) = companion {
        out.write_entry(&options.companion_entry, card.to_pretty_json()?.into_bytes())?;
    }

    let module = outcome.document.module_value().ok_or(DocumentError::MissingModule)?;
    let risum = container::encode(&module, &base.assets, codec)?;
    debug!(bytes = risum.len(), assets = base.assets.len(), "module container re-encoded");
    out.write_entry(&options.container_entry, risum)?;

    let stripped = ModuleBody::from_value(module)?.without_lore_content().to_value()?;
    Ok(container::encode(&stripped, &[], codec)?)
}

fn applies_assets(fragments: &[Fragment]) -> bool {
    merge::applied_fragments(fragments).iter().any(|f| matches!(f.data, FragmentData::Asset(_)))
}

fn assemble_card(
    base: &BaseArchive,
    outcome: &MergeOutcome,
    codec: &dyn Codec,
    options: &PackageOptions,
    out: &mut ArchiveBuilder,
) -> Result<(), PackageError> {
    out.write_entry(&options.companion_entry, outcome.document.to_pretty_json()?.into_bytes())?;

    if options.accessory_module {
        let module = outcome.accessory_module()?.to_value()?;
        out.write_entry(&options.container_entry, container::encode(&module, &[], codec)?)?;
    }

    for (path, data) in &base.entries {
        if carried_image(path) {
            out.write_entry(path, data.clone())?;
        }
    }
    Ok(())
}

fn carried_image(path: &str) -> bool {
    path.starts_with(ASSET_DIR)
        && !path.starts_with(MOD_ASSET_DIR)
        && path.rsplit_once('.').is_some_and(|(_, ext)| {
            CARRIED_IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e))
        })
}

/// Copy the files shipped with applied asset fragments under `assets/mod/`.
fn write_asset_files(fragments: &[Fragment], out: &mut ArchiveBuilder) -> Result<(), PackageError> {
    for fragment in merge::applied_fragments(fragments) {
        let FragmentData::Asset(data) = &fragment.data else { continue };
        for file in &fragment.files {
            out.write_entry(&file.output_path(), file.bytes.clone())?;
        }
        for item in &data.content {
            let path = format!("{MOD_ASSET_DIR}{}", item.filename);
            if out.get(&path).is_none() {
                warn!(fragment = %fragment.name, path = %path, "asset file missing from mod package; skipped");
            }
        }
    }
    Ok(())
}
