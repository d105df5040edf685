//! Extraction manifests: what a walk produced, and checks against an expected set.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufReader, BufWriter, Write};

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// One archive entry as it was materialized (or listed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
    pub kind: ManifestKind,
    pub target: Option<String>,
    pub mtime: Option<u64>,
}

impl ManifestEntry {
    /// Entry for a regular file whose payload hashed to `sha256`.
    #[must_use]
    pub fn for_file(path: &str, size: u64, sha256: String, mtime: Option<u64>) -> Self {
        Self {
            path: path.to_owned(),
            size,
            sha256,
            kind: ManifestKind::File,
            target: None,
            mtime,
        }
    }

    #[must_use]
    pub fn for_directory(path: &str, mtime: Option<u64>) -> Self {
        Self {
            path: path.to_owned(),
            size: 0,
            sha256: digest_bytes(&[]),
            kind: ManifestKind::Directory,
            target: None,
            mtime,
        }
    }

    /// Entry for a symlink or hard link; the digest covers the target text.
    #[must_use]
    pub fn for_link(path: &str, kind: ManifestKind, target: &str, mtime: Option<u64>) -> Self {
        Self {
            path: path.to_owned(),
            size: 0,
            sha256: digest_bytes(target.as_bytes()),
            kind,
            target: Some(target.to_owned()),
            mtime,
        }
    }
}

/// Types of entries captured in the manifest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ManifestKind {
    File,
    Directory,
    Symlink,
    HardLink,
}

impl ManifestKind {
    /// Short label used in verbose progress output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "dir",
            Self::Symlink => "symlink",
            Self::HardLink => "link",
        }
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Writer adapter that hashes everything passing through it.
pub struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Flush the inner writer and return the hex digest of the bytes seen.
    pub fn finish(mut self) -> io::Result<String> {
        self.inner.flush()?;
        Ok(hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Write manifest entries to JSON.
pub fn write_manifest_json(entries: &[ManifestEntry], path: &Utf8Path) -> Result<()> {
    let file = fs_err::File::create(path).context("failed to create manifest")?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, entries)
        .with_context(|| format!("failed to encode manifest {path}"))?;
    writer.flush().context("failed to flush manifest writer")
}

/// Read manifest entries from JSON.
pub fn read_manifest_json(path: &Utf8Path) -> Result<Vec<ManifestEntry>> {
    let file = fs_err::File::open(path).context("failed to open manifest")?;
    let reader = BufReader::new(file);
    let entries: Vec<ManifestEntry> = serde_json::from_reader(reader)
        .with_context(|| format!("failed to decode manifest {path}"))?;
    Ok(entries)
}

/// Verify manifest contents against expectation.
///
/// With `relaxed`, entries the archive produced beyond the expected set are allowed.
pub fn verify_manifest(
    expected: &[ManifestEntry],
    actual: &[ManifestEntry],
    relaxed: bool,
) -> Result<(), ManifestError> {
    let expected_map = as_map(expected);
    let actual_map = as_map(actual);

    for (path, entry) in &expected_map {
        let Some(actual_entry) = actual_map.get(path) else {
            return Err(ManifestError::MissingEntry((*path).to_owned()));
        };
        if entry.kind != actual_entry.kind {
            return Err(ManifestError::KindMismatch {
                path: (*path).to_owned(),
                expected: entry.kind,
                actual: actual_entry.kind,
            });
        }
        if entry.sha256 != actual_entry.sha256 {
            return Err(ManifestError::Mismatch {
                path: (*path).to_owned(),
                expected: entry.sha256.clone(),
                actual: actual_entry.sha256.clone(),
            });
        }
    }

    if !relaxed {
        if let Some(path) = actual_map.keys().find(|path| !expected_map.contains_key(*path)) {
            return Err(ManifestError::UnexpectedEntry((*path).to_owned()));
        }
    }

    Ok(())
}

fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// Later entries win, as they do on disk when an archive repeats a path.
fn as_map(entries: &[ManifestEntry]) -> BTreeMap<&str, &ManifestEntry> {
    entries
        .iter()
        .map(|entry| (entry.path.as_str(), entry))
        .collect()
}

/// Manifest verification errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest missing entry: {0}")]
    MissingEntry(String),
    #[error("manifest entry mismatch for {path}: expected {expected}, actual {actual}")]
    Mismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("manifest kind mismatch for {path}: expected {expected}, actual {actual}")]
    KindMismatch {
        path: String,
        expected: ManifestKind,
        actual: ManifestKind,
    },
    #[error("manifest contains unexpected entry: {0}")]
    UnexpectedEntry(String),
}
