//! Packages exported material channels into a single zip archive.
//!
//! The renderer decides *which* channels are exported and under which
//! canonical names; this crate only owns the archive format. Entries are
//! stored under a single `pbr_material/` folder in the order they were added.
//!
//! Types:
//!
//! - `PackError` classifies empty exports, zip failures, and I/O failures.
//! - `ArchiveEntry` pairs a file name with the raw bytes to store.
//!
//! Functions:
//!
//! - `write_archive` streams entries into any `Write + Seek` sink.
//! - `write_archive_file` writes the archive to disk, refusing to create a
//!   file when there is nothing to store.
use std::fs::{self, File};
use std::io::{Seek, Write};
use std::path::Path;

use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Folder every entry is stored under.
pub const ARCHIVE_FOLDER: &str = "pbr_material";

#[derive(Debug, Error)]
pub enum PackError {
    #[error("no material channels to export")]
    Empty,

    #[error("duplicate archive entry '{0}'")]
    DuplicateEntry(String),

    #[error("failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

pub fn write_archive<W>(sink: W, entries: &[ArchiveEntry]) -> Result<W, PackError>
where
    W: Write + Seek,
{
    if entries.is_empty() {
        return Err(PackError::Empty);
    }
    for (index, entry) in entries.iter().enumerate() {
        if entries[..index].iter().any(|prior| prior.name == entry.name) {
            return Err(PackError::DuplicateEntry(entry.name.clone()));
        }
    }

    let mut writer = ZipWriter::new(sink);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.add_directory(ARCHIVE_FOLDER, options)?;
    for entry in entries {
        writer.start_file(format!("{ARCHIVE_FOLDER}/{}", entry.name), options)?;
        writer.write_all(&entry.bytes)?;
        tracing::debug!(name = %entry.name, bytes = entry.bytes.len(), "added archive entry");
    }
    Ok(writer.finish()?)
}

/// Writes `entries` to `path`. No file is created when `entries` is empty.
pub fn write_archive_file(path: &Path, entries: &[ArchiveEntry]) -> Result<(), PackError> {
    if entries.is_empty() {
        return Err(PackError::Empty);
    }
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    if let Err(err) = write_archive(file, entries) {
        let _ = fs::remove_file(path);
        return Err(err);
    }
    tracing::info!(path = %path.display(), entries = entries.len(), "material archive written");
    Ok(())
}
