//! RISUM container framing.
//!
//! # Layout
//! ```text
//! magic (u8 = 0x6F) | version (u8 = 0x00)
//! main_len (u32 LE) | main block  = codec.encode(JSON {"module": …, "type": "risuModule"})
//! ( 0x01 | asset_len (u32 LE) | asset block = codec.encode(asset bytes) )*
//! 0x00
//! ```
//! Assets are positional: a module refers to them by index, so the order in
//! which they are written is the order in which [`decode`] returns them.
//!
//! # Endianness
//! Length fields are strictly little-endian.  There is exactly one version.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::codec::{Codec, CodecError};

pub const MAGIC:        u8 = 0x6F;
pub const VERSION:      u8 = 0x00;
pub const ASSET_MARKER: u8 = 0x01;
pub const END_MARKER:   u8 = 0x00;

/// Value of the `type` field in every main block.
pub const MODULE_TYPE: &str = "risuModule";

/// Size of the magic + version header.
pub const HEADER_SIZE: usize = 2;

// ── Errors ───────────────────────────────────────────────────────────────────

/// Structural problems with the container bytes.  Any of these means the
/// container is unreadable.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid magic number 0x{0:02x}")]
    BadMagic(u8),
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),
    #[error("Invalid asset marker 0x{marker:02x} at position {position}")]
    InvalidAssetMarker { marker: u8, position: usize },
    #[error("Truncated container: {what} needs {needed} bytes at position {position}, {available} available")]
    Truncated { what: &'static str, position: usize, needed: usize, available: usize },
    #[error("Main block has no `module` object")]
    MissingModule,
    #[error("Block of {0} bytes does not fit the 32-bit length field")]
    BlockTooLarge(usize),
}

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Main block JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Container ────────────────────────────────────────────────────────────────

/// A decoded container: the module document plus its positional assets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RisumContainer {
    pub module: Value,
    pub assets: Vec<Vec<u8>>,
}

#[derive(Serialize)]
struct MainBlock<'a> {
    module: &'a Value,
    #[serde(rename = "type")]
    kind:   &'static str,
}

impl RisumContainer {
    pub fn new(module: Value, assets: Vec<Vec<u8>>) -> Self {
        Self { module, assets }
    }

    pub fn encode(&self, codec: &dyn Codec) -> Result<Vec<u8>, ContainerError> {
        encode(&self.module, &self.assets, codec)
    }

    pub fn decode(bytes: &[u8], codec: &dyn Codec) -> Result<Self, ContainerError> {
        decode(bytes, codec)
    }
}

/// Serialize `module` and `assets` into RISUM bytes.
pub fn encode(module: &Value, assets: &[Vec<u8>], codec: &dyn Codec) -> Result<Vec<u8>, ContainerError> {
    let main_json = serde_json::to_vec(&MainBlock { module, kind: MODULE_TYPE })?;
    let main = codec.encode(&main_json)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + 4 + main.len() + 1);
    out.write_u8(MAGIC)?;
    out.write_u8(VERSION)?;
    write_block(&mut out, &main)?;

    for asset in assets {
        let encoded = codec.encode(asset)?;
        out.write_u8(ASSET_MARKER)?;
        write_block(&mut out, &encoded)?;
    }

    out.write_u8(END_MARKER)?;
    tracing::debug!(
        codec = %codec.codec_id(),
        assets = assets.len(),
        bytes = out.len(),
        "encoded risum container"
    );
    Ok(out)
}

/// Parse RISUM bytes back into the module document and its assets.
pub fn decode(bytes: &[u8], codec: &dyn Codec) -> Result<RisumContainer, ContainerError> {
    let framing = split_frames(bytes)?;

    let main_json = codec.decode(framing.main.payload)?;
    let module = match serde_json::from_slice::<Value>(&main_json)? {
        Value::Object(mut map) => map.remove("module").ok_or(FormatError::MissingModule)?,
        _ => return Err(FormatError::MissingModule.into()),
    };

    let assets = framing
        .assets
        .iter()
        .map(|frame| codec.decode(frame.payload))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(codec = %codec.codec_id(), assets = assets.len(), "decoded risum container");
    Ok(RisumContainer { module, assets })
}

fn write_block<W: Write>(mut writer: W, payload: &[u8]) -> Result<(), ContainerError> {
    let len = u32::try_from(payload.len()).map_err(|_| FormatError::BlockTooLarge(payload.len()))?;
    writer.write_u32::<LittleEndian>(len)?;
    writer.write_all(payload)?;
    Ok(())
}

// ── Framing walk ─────────────────────────────────────────────────────────────

/// One length-prefixed block, still in encoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Absolute offset of the first payload byte.
    pub offset:  usize,
    pub payload: &'a [u8],
}

/// The block structure of a container, without running the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framing<'a> {
    pub main:       Frame<'a>,
    pub assets:     Vec<Frame<'a>>,
    /// `false` when the input ended without the trailing `0x00`.
    pub terminated: bool,
}

/// Validate the header and split `bytes` into frames.
///
/// Input that ends where a marker is expected is accepted as if terminated;
/// a length that runs past the end of input is [`FormatError::Truncated`].
pub fn split_frames(bytes: &[u8]) -> Result<Framing<'_>, FormatError> {
    let mut cursor = Cursor::new(bytes);

    let magic = read_u8(&mut cursor, "magic")?;
    if magic != MAGIC {
        return Err(FormatError::BadMagic(magic));
    }
    let version = read_u8(&mut cursor, "version")?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }

    let main = read_frame(&mut cursor, "main block")?;

    let mut assets = Vec::new();
    let mut terminated = false;
    while (cursor.position() as usize) < bytes.len() {
        let position = cursor.position() as usize;
        match read_u8(&mut cursor, "asset marker")? {
            END_MARKER => {
                terminated = true;
                break;
            }
            ASSET_MARKER => assets.push(read_frame(&mut cursor, "asset block")?),
            marker => return Err(FormatError::InvalidAssetMarker { marker, position }),
        }
    }

    Ok(Framing { main, assets, terminated })
}

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len().saturating_sub(cursor.position() as usize)
}

fn truncated(cursor: &Cursor<&[u8]>, what: &'static str, needed: usize) -> FormatError {
    FormatError::Truncated {
        what,
        position:  cursor.position() as usize,
        needed,
        available: remaining(cursor),
    }
}

fn ensure(cursor: &Cursor<&[u8]>, what: &'static str, needed: usize) -> Result<(), FormatError> {
    if remaining(cursor) < needed {
        return Err(truncated(cursor, what, needed));
    }
    Ok(())
}

fn read_u8(cursor: &mut Cursor<&[u8]>, what: &'static str) -> Result<u8, FormatError> {
    ensure(cursor, what, 1)?;
    cursor.read_u8().map_err(|_| truncated(cursor, what, 1))
}

fn read_frame<'a>(cursor: &mut Cursor<&'a [u8]>, what: &'static str) -> Result<Frame<'a>, FormatError> {
    ensure(cursor, "length field", 4)?;
    let len = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| truncated(cursor, "length field", 4))? as usize;
    ensure(cursor, what, len)?;
    let offset = cursor.position() as usize;
    let bytes: &'a [u8] = *cursor.get_ref();
    let payload = &bytes[offset..offset + len];
    cursor.set_position((offset + len) as u64);
    Ok(Frame { offset, payload })
}

/// Read a container from any reader.  Convenience for file-backed callers.
pub fn read_from<R: Read>(mut reader: R, codec: &dyn Codec) -> Result<RisumContainer, ContainerError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode(&bytes, codec)
}
