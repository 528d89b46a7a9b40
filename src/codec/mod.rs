//! Codec registry: the reversible byte transforms a RISUM container can be
//! framed with.
//!
//! # Contract
//! A codec is a pure, deterministic, lossless function pair:
//! `decode(encode(x)) == x` for every byte string `x`.  The container layer
//! never inspects encoded bytes; it only frames them.
//!
//! # Handles
//! There is no process-wide codec.  Callers resolve a [`CodecId`] to a boxed
//! handle once with [`get_codec`] and pass `&dyn Codec` into the container and
//! packaging layers.

use thiserror::Error;

mod rpack;

pub use rpack::RPackCodec;

// ── CodecId enum ─────────────────────────────────────────────────────────────

/// Runtime codec discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecId {
    /// Identity transform.  Useful for debugging container contents.
    None,
    /// RisuAI byte-substitution table.  Required for files RisuAI will load.
    #[default]
    RPack,
    /// Zstandard frames.  Smaller output; only readable by this crate.
    Zstd,
}

impl CodecId {
    /// Human-readable name (for diagnostics and CLI parsing).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None  => "none",
            CodecId::RPack => "rpack",
            CodecId::Zstd  => "zstd",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none"  => Some(CodecId::None),
            "rpack" => Some(CodecId::RPack),
            "zstd"  => Some(CodecId::Zstd),
            _       => None,
        }
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn codec_id(&self) -> CodecId { CodecId::None }
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

/// Zstd at a fixed level so that encoding stays deterministic.
pub struct ZstdCodec {
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self { Self { level: 3 } }
}

impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, self.level).map_err(|e| CodecError::Encode(e.to_string()))
    }
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a CodecId to a built-in codec.
pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::None  => Box::new(NoneCodec),
        CodecId::RPack => Box::new(RPackCodec),
        CodecId::Zstd  => Box::new(ZstdCodec::default()),
    }
}
