//! Archive I/O: ordered collections of named byte blobs.
//!
//! `.charx` character archives and mod packages are both ZIP files.  Reading
//! goes through [`ArchiveSource`], writing through [`ArchiveSink`]; the ZIP
//! bytes of a written archive only exist once [`ArchiveSink::finish`] runs.
//!
//! ```no_run
//! use risum_mod::archive::{ArchiveBuilder, ArchiveSink, ArchiveSource, ZipSource};
//!
//! let mut out = ArchiveBuilder::new();
//! out.write_entry("card.json", b"{}".to_vec())?;
//! let bytes = out.finish()?;
//!
//! let mut ar = ZipSource::from_bytes(bytes)?;
//! assert_eq!(ar.read_entry("card.json")?, b"{}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Companion card document inside a `.charx`.
pub const CARD_ENTRY:   &str = "card.json";
/// Encoded module container inside a `.charx`.
pub const MODULE_ENTRY: &str = "module.risum";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive entry not found: {0}")]
    MissingEntry(String),
    #[error("Failed to read archive entry `{path}`: {source}")]
    Read {
        path:   String,
        #[source]
        source: std::io::Error,
    },
    #[error("ZIP error: {0}")]
    Zip(#[from] ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Entry listing ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub path:   String,
    pub is_dir: bool,
    pub size:   u64,
}

// ── Capabilities ──────────────────────────────────────────────────────────────

pub trait ArchiveSource {
    /// Every entry, in archive order.
    fn list_entries(&self) -> &[EntryInfo];

    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError>;

    fn contains(&self, path: &str) -> bool {
        self.list_entries().iter().any(|e| !e.is_dir && e.path == path)
    }

    /// Like [`read_entry`](Self::read_entry), but a missing entry is `None`.
    fn read_optional(&mut self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        if self.contains(path) {
            self.read_entry(path).map(Some)
        } else {
            Ok(None)
        }
    }
}

pub trait ArchiveSink {
    /// Add or replace an entry.  A repeated path keeps its first position.
    fn write_entry(&mut self, path: &str, bytes: Vec<u8>) -> Result<(), ArchiveError>;

    /// Produce the final archive bytes.
    fn finish(self) -> Result<Vec<u8>, ArchiveError>
    where
        Self: Sized;
}

// ── ZIP reader ────────────────────────────────────────────────────────────────

pub struct ZipSource<R> {
    inner:   ZipArchive<R>,
    entries: Vec<EntryInfo>,
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(reader: R) -> Result<Self, ArchiveError> {
        let mut inner = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(inner.len());
        for i in 0..inner.len() {
            let file = inner.by_index(i)?;
            entries.push(EntryInfo {
                path:   file.name().to_owned(),
                is_dir: file.is_dir(),
                size:   file.size(),
            });
        }
        debug!(entries = entries.len(), "opened zip archive");
        Ok(Self { inner, entries })
    }
}

impl ZipSource<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        Self::new(Cursor::new(bytes))
    }
}

impl ZipSource<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> ArchiveSource for ZipSource<R> {
    fn list_entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut file = self.inner.by_name(path).map_err(|e| match e {
            ZipError::FileNotFound => ArchiveError::MissingEntry(path.to_owned()),
            other => ArchiveError::Zip(other),
        })?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|source| ArchiveError::Read { path: path.to_owned(), source })?;
        Ok(data)
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// In-memory archive under construction.  Entries are held until
/// [`finish`](ArchiveSink::finish) writes them as one ZIP.
#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder {
    entries:  Vec<(String, Vec<u8>)>,
    /// Path -> position in `entries`.
    position: HashMap<String, usize>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.position.get(path).map(|&i| self.entries[i].1.as_slice())
    }
}

impl ArchiveSink for ArchiveBuilder {
    fn write_entry(&mut self, path: &str, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        match self.position.get(path) {
            Some(&i) => self.entries[i].1 = bytes,
            None => {
                self.position.insert(path.to_owned(), self.entries.len());
                self.entries.push((path.to_owned(), bytes));
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        // Fixed timestamp so identical inputs give identical archives.
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, data) in &self.entries {
            zip.start_file(path.as_str(), options)?;
            zip.write_all(data)?;
        }
        let bytes = zip.finish()?.into_inner();
        debug!(entries = self.entries.len(), bytes = bytes.len(), "archive written");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut builder = ArchiveBuilder::new();
        builder.write_entry("card.json", b"{}".to_vec()).unwrap();
        builder.write_entry("assets/a.png", vec![1, 2, 3]).unwrap();
        let bytes = builder.finish().unwrap();

        let mut source = ZipSource::from_bytes(bytes).unwrap();
        let paths: Vec<&str> = source.list_entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["card.json", "assets/a.png"]);
        assert_eq!(source.read_entry("assets/a.png").unwrap(), vec![1, 2, 3]);
        assert!(source.contains("card.json"));
    }

    #[test]
    fn rewrite_keeps_position() {
        let mut builder = ArchiveBuilder::new();
        builder.write_entry("a", vec![1]).unwrap();
        builder.write_entry("b", vec![2]).unwrap();
        builder.write_entry("a", vec![3]).unwrap();
        assert_eq!(builder.paths().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(builder.get("a"), Some(&[3u8][..]));
    }

    #[test]
    fn many_rewrites_keep_insertion_order() {
        let mut builder = ArchiveBuilder::new();
        for i in 0..5000 {
            builder.write_entry(&format!("assets/{i}.png"), vec![0]).unwrap();
        }
        for i in (0..5000).rev() {
            builder.write_entry(&format!("assets/{i}.png"), vec![1]).unwrap();
        }
        assert_eq!(builder.len(), 5000);
        assert_eq!(builder.paths().next(), Some("assets/0.png"));
        assert_eq!(builder.paths().last(), Some("assets/4999.png"));
        assert_eq!(builder.get("assets/2500.png"), Some(&[1u8][..]));
        assert_eq!(builder.get("assets/5000.png"), None);
    }

    #[test]
    fn missing_entry_names_path() {
        let bytes = ArchiveBuilder::new().finish().unwrap();
        let mut source = ZipSource::from_bytes(bytes).unwrap();
        match source.read_entry("module.risum") {
            Err(ArchiveError::MissingEntry(path)) => assert_eq!(path, "module.risum"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(source.read_optional("module.risum").unwrap(), None);
    }

    #[test]
    fn output_is_deterministic() {
        let build = || {
            let mut b = ArchiveBuilder::new();
            b.write_entry("x", b"same".to_vec()).unwrap();
            b.finish().unwrap()
        };
        assert_eq!(build(), build());
    }
}
