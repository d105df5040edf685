//! Archive walking and entry materialization.
//!
//! The walker consumes the stream strictly front to back: one header block,
//! then that entry's payload and padding, then the next header. Extended (PAX)
//! headers are folded into the entry that follows them, so callers only ever
//! see real entries.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};

use anyhow::{anyhow, Context, Result};
use bstr::{BString, ByteSlice};
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::error::UserInputError;
use crate::manifest::{self, DigestWriter, ManifestEntry, ManifestKind};
use crate::policy::{LinkType, PolicyError, SecurityPolicy, UsageTracker, ValidatedPath};

pub mod header;
pub mod pax;
pub mod progress;

pub use header::{decode_octal, is_zero_block, Block, EntryType, HeaderRecord, BLOCK_SIZE};
pub use progress::{Reporter, Verbosity};

use header::{padding_for, UstarHeader};

/// Extended header payloads beyond this size are rejected.
const MAX_EXTENDED_HEADER: u64 = 1 << 20;

/// Fatal archive-level failures. Any of these aborts the whole walk.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unsupported ustar format (magic {magic:?}, version {version:?})")]
    UnsupportedFormat { magic: BString, version: BString },
    #[error("header error: a lone zero block is followed by another header")]
    MalformedTerminator,
    #[error("unsupported file type '{}'", .0.escape_ascii())]
    UnsupportedEntry(u8),
    #[error("extended header error: {0}")]
    ExtendedHeader(&'static str),
    #[error("invalid octal field {0:?}")]
    InvalidOctal(BString),
    #[error("header checksum mismatch (stored {expected}, computed {actual})")]
    ChecksumMismatch { expected: u64, actual: u64 },
    #[error("name is not valid UTF-8: {0:?}")]
    NonUtf8Path(BString),
    #[error("archive truncated while reading {0}")]
    Truncated(&'static str),
    #[error("archive ended without the two zero-block terminator")]
    MissingTerminator,
}

/// Knobs for a single walk over an archive stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Reject streams that end before the two zero-block terminator.
    pub strict: bool,
    /// Check each header's checksum field.
    pub verify_checksums: bool,
}

/// Options that steer archive extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub archive_path: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub verbosity: Verbosity,
    pub progress: bool,
    pub walk: WalkOptions,
    pub manifest: Option<Utf8PathBuf>,
    pub manifest_relaxed: bool,
    pub manifest_out: Option<Utf8PathBuf>,
}

/// Options for listing archives.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub archive_path: Utf8PathBuf,
    pub verbosity: Verbosity,
    pub json: bool,
    pub walk: WalkOptions,
}

/// What a walk does with each entry.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Materialize entries under `root`, which must be canonical.
    Directory {
        root: &'a Utf8Path,
        policy: &'a SecurityPolicy,
    },
    /// Only describe entries; payloads are hashed and skipped.
    Listing,
}

/// Extract an archive file into `options.destination`.
pub fn extract_archive(
    options: &ExtractOptions,
    policy: &SecurityPolicy,
) -> Result<Vec<ManifestEntry>> {
    let reader = open_archive(&options.archive_path)?;
    let root = prepare_destination(&options.destination)?;

    let mut reporter = Reporter::new(io::stdout().lock(), options.verbosity);
    if options.progress {
        reporter = reporter.with_spinner("extracting");
    }
    let outcome = unpack_reader(
        reader,
        Target::Directory {
            root: &root,
            policy,
        },
        options.walk,
        &mut reporter,
    );
    let _stdout = reporter
        .finish(if outcome.is_ok() {
            "extract complete"
        } else {
            "extract aborted"
        })
        .context("failed to flush progress output")?;
    let entries = outcome.with_context(|| format!("failed to extract {}", options.archive_path))?;

    if let Some(path) = &options.manifest_out {
        manifest::write_manifest_json(&entries, path)?;
    }
    if let Some(path) = &options.manifest {
        let expected = manifest::read_manifest_json(path)?;
        manifest::verify_manifest(&expected, &entries, options.manifest_relaxed)?;
    }
    Ok(entries)
}

/// List archive contents without touching the filesystem.
pub fn list_archive(options: &ListOptions) -> Result<Vec<ManifestEntry>> {
    let reader = open_archive(&options.archive_path)?;
    let verbosity = if options.json {
        Verbosity::Quiet
    } else {
        options.verbosity
    };
    let mut reporter = Reporter::new(io::stdout().lock(), verbosity);
    let outcome = unpack_reader(reader, Target::Listing, options.walk, &mut reporter);
    let mut out = reporter
        .finish("list complete")
        .context("failed to flush progress output")?;
    let entries = outcome.with_context(|| format!("failed to list {}", options.archive_path))?;

    if options.json {
        serde_json::to_writer_pretty(&mut out, &entries).context("failed to render manifest")?;
        writeln!(out)?;
    }
    Ok(entries)
}

/// Walk an archive stream to its end, applying `target` to every entry.
///
/// One progress record per entry goes to `reporter`, in archive order and only
/// after the entry was handled. The first error aborts the walk.
pub fn unpack_reader<R, W>(
    reader: R,
    target: Target<'_>,
    walk: WalkOptions,
    reporter: &mut Reporter<W>,
) -> Result<Vec<ManifestEntry>>
where
    R: Read,
    W: Write,
{
    let mut walker = Walker::new(reader, walk.verify_checksums);
    let mut extractor = match target {
        Target::Directory { root, policy } => Some(Extractor {
            root,
            policy,
            usage: policy.usage(),
        }),
        Target::Listing => None,
    };

    let mut entries = Vec::new();
    while let Some(record) = walker.next_entry()? {
        let entry = match extractor.as_mut() {
            Some(extractor) => extractor.materialize(&mut walker, &record)?,
            None => describe(&mut walker, &record)?,
        };
        reporter
            .entry(&entry)
            .context("failed to write progress output")?;
        entries.push(entry);
    }

    if walk.strict && !walker.terminated {
        return Err(ArchiveError::MissingTerminator.into());
    }
    Ok(entries)
}

/// Sequential cursor over the archive stream.
struct Walker<R> {
    reader: R,
    verify_checksums: bool,
    zero_blocks: u8,
    terminated: bool,
    /// Long name from the last extended header, consumed by the next entry.
    pending_path: Option<BString>,
}

impl<R: Read> Walker<R> {
    fn new(reader: R, verify_checksums: bool) -> Self {
        Self {
            reader,
            verify_checksums,
            zero_blocks: 0,
            terminated: false,
            pending_path: None,
        }
    }

    /// Advance to the next real entry; `None` once the archive has ended.
    fn next_entry(&mut self) -> Result<Option<HeaderRecord>> {
        if self.terminated {
            return Ok(None);
        }
        let mut block: Block = [0; BLOCK_SIZE];
        loop {
            if !self.read_block(&mut block)? {
                self.reject_pending()?;
                return Ok(None);
            }

            if is_zero_block(&block) {
                self.reject_pending()?;
                self.zero_blocks += 1;
                if self.zero_blocks == 2 {
                    self.terminated = true;
                    return Ok(None);
                }
                continue;
            }
            if self.zero_blocks == 1 {
                return Err(ArchiveError::MalformedTerminator.into());
            }

            let record = UstarHeader::from_block(&block).decode(self.verify_checksums)?;
            if record.entry_type == EntryType::Extended {
                let blob = self.read_extended_blob(record.size)?;
                self.pending_path = Some(pax::long_path(&blob)?);
                continue;
            }

            return Ok(Some(match self.pending_path.take() {
                Some(path) => record.with_path(path),
                None => record,
            }));
        }
    }

    fn reject_pending(&self) -> Result<(), ArchiveError> {
        match self.pending_path {
            Some(_) => Err(ArchiveError::ExtendedHeader(
                "extended header is not followed by an entry",
            )),
            None => Ok(()),
        }
    }

    /// Fill `block`; `false` on a clean end of stream before any byte.
    fn read_block(&mut self, block: &mut Block) -> Result<bool> {
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.reader.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(anyhow!(err).context("failed to read archive")),
            }
        }
        match filled {
            0 => Ok(false),
            BLOCK_SIZE => Ok(true),
            _ => Err(ArchiveError::Truncated("header block").into()),
        }
    }

    /// Read the key/value payload of an extended header.
    ///
    /// A zero size field still consumes one block, holding NUL-terminated text.
    fn read_extended_blob(&mut self, size: u64) -> Result<Vec<u8>> {
        if size == 0 {
            let mut block: Block = [0; BLOCK_SIZE];
            if !self.read_block(&mut block)? {
                return Err(ArchiveError::Truncated("extended header").into());
            }
            let end = block.find_byte(0).unwrap_or(BLOCK_SIZE);
            return Ok(block[..end].to_vec());
        }
        if size > MAX_EXTENDED_HEADER {
            return Err(ArchiveError::ExtendedHeader("extended header too large").into());
        }
        let mut blob = Vec::new();
        self.copy_payload(size, &mut blob)?;
        Ok(blob)
    }

    /// Copy exactly `size` payload bytes to `out`, then skip to the next block.
    fn copy_payload<W: Write + ?Sized>(&mut self, size: u64, out: &mut W) -> Result<()> {
        let copied = io::copy(&mut self.reader.by_ref().take(size), out)
            .context("failed to copy entry payload")?;
        if copied != size {
            return Err(ArchiveError::Truncated("entry payload").into());
        }
        self.skip(padding_for(size))
    }

    fn skip(&mut self, len: u64) -> Result<()> {
        let skipped = io::copy(&mut self.reader.by_ref().take(len), &mut io::sink())
            .context("failed to skip block padding")?;
        if skipped != len {
            return Err(ArchiveError::Truncated("block padding").into());
        }
        Ok(())
    }
}

/// Filesystem side of an extraction walk.
struct Extractor<'a> {
    root: &'a Utf8Path,
    policy: &'a SecurityPolicy,
    usage: UsageTracker,
}

impl Extractor<'_> {
    fn materialize<R: Read>(
        &mut self,
        walker: &mut Walker<R>,
        record: &HeaderRecord,
    ) -> Result<ManifestEntry> {
        let name = record.path_str()?;
        let validated = self.policy.resolve(Utf8Path::new(name), self.root)?;
        let payload = match record.entry_type {
            EntryType::Regular => record.size,
            _ => 0,
        };
        self.usage.observe(&validated, payload)?;

        match record.entry_type {
            EntryType::Regular => {
                confine_to_root(self.root, &validated.abs, false)?;
                refuse_symlink_leaf(&validated)?;
                ensure_parent_exists(&validated.abs)?;
                let file = fs_err::File::create(validated.abs.as_std_path())?;
                let mut writer = DigestWriter::new(BufWriter::new(file));
                walker
                    .copy_payload(record.size, &mut writer)
                    .with_context(|| format!("failed to extract {name}"))?;
                let sha256 = writer
                    .finish()
                    .with_context(|| format!("failed to flush {}", validated.abs))?;
                Ok(ManifestEntry::for_file(name, record.size, sha256, record.mtime))
            }
            EntryType::HardLink => {
                let target = record.link_target_str()?;
                let source = self
                    .policy
                    .resolve_link_target(Utf8Path::new(target), self.root)?;
                confine_to_root(self.root, &source.abs, false)?;
                confine_to_root(self.root, &validated.abs, false)?;
                ensure_parent_exists(&validated.abs)?;
                fs_err::hard_link(source.abs.as_std_path(), validated.abs.as_std_path())?;
                Ok(ManifestEntry::for_link(
                    name,
                    ManifestKind::HardLink,
                    target,
                    record.mtime,
                ))
            }
            EntryType::Symlink => {
                let target = record.link_target_str()?;
                self.enforce_link(&validated, Utf8Path::new(target))?;
                confine_to_root(self.root, &validated.abs, false)?;
                ensure_parent_exists(&validated.abs)?;
                make_symlink(target, &validated.abs)?;
                Ok(ManifestEntry::for_link(
                    name,
                    ManifestKind::Symlink,
                    target,
                    record.mtime,
                ))
            }
            EntryType::Directory => {
                confine_to_root(self.root, &validated.abs, true)?;
                fs_err::create_dir_all(validated.abs.as_std_path())?;
                Ok(ManifestEntry::for_directory(name, record.mtime))
            }
            EntryType::Extended => {
                Err(ArchiveError::ExtendedHeader("extended header used as an entry").into())
            }
        }
    }

    /// A relative symlink target is taken from the directory holding the link.
    fn enforce_link(
        &self,
        validated: &ValidatedPath,
        target: &Utf8Path,
    ) -> Result<(), PolicyError> {
        let base = validated.abs.parent().unwrap_or(self.root);
        self.policy
            .enforce_link_policy(target, base, self.root, LinkType::Symlink)
    }
}

fn describe<R: Read>(walker: &mut Walker<R>, record: &HeaderRecord) -> Result<ManifestEntry> {
    let name = record.path_str()?;
    match record.entry_type {
        EntryType::Regular => {
            let mut sink = DigestWriter::new(io::sink());
            walker.copy_payload(record.size, &mut sink)?;
            Ok(ManifestEntry::for_file(
                name,
                record.size,
                sink.finish()?,
                record.mtime,
            ))
        }
        EntryType::HardLink => Ok(ManifestEntry::for_link(
            name,
            ManifestKind::HardLink,
            record.link_target_str()?,
            record.mtime,
        )),
        EntryType::Symlink => Ok(ManifestEntry::for_link(
            name,
            ManifestKind::Symlink,
            record.link_target_str()?,
            record.mtime,
        )),
        EntryType::Directory => Ok(ManifestEntry::for_directory(name, record.mtime)),
        EntryType::Extended => {
            Err(ArchiveError::ExtendedHeader("extended header used as an entry").into())
        }
    }
}

fn open_archive(path: &Utf8Path) -> Result<BufReader<File>> {
    let metadata = fs_err::metadata(path.as_std_path())
        .map_err(|err| UserInputError::new(format!("cannot access archive: {err}")))?;
    if !metadata.is_file() {
        return Err(UserInputError::new(format!("{path} is not a regular file")).into());
    }
    let file = File::open(path.as_std_path())
        .map_err(|err| UserInputError::new(format!("failed to open archive {path}: {err}")))?;
    Ok(BufReader::new(file))
}

fn prepare_destination(dir: &Utf8Path) -> Result<Utf8PathBuf> {
    fs_err::create_dir_all(dir.as_std_path()).context("failed to prepare destination")?;
    let canonical = fs_err::canonicalize(dir.as_std_path())?;
    Utf8PathBuf::from_path_buf(canonical)
        .map_err(|path| anyhow!("destination not valid UTF-8: {}", path.display()))
}

/// Refuse a path whose existing components leave `root` through a symlink.
///
/// Components are checked from `root` down and the first missing one ends the
/// walk. The last component is only checked with `include_leaf`. Paths outside
/// `root` (allowed absolute names) are not checked.
fn confine_to_root(root: &Utf8Path, path: &Utf8Path, include_leaf: bool) -> Result<()> {
    let Ok(rel) = path.strip_prefix(root) else {
        return Ok(());
    };
    let components: Vec<&str> = rel.components().map(|c| c.as_str()).collect();
    let checked = if include_leaf {
        components.len()
    } else {
        components.len().saturating_sub(1)
    };

    let mut current = root.to_owned();
    for component in &components[..checked] {
        current.push(component);
        let metadata = match fs_err::symlink_metadata(current.as_std_path()) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if !metadata.file_type().is_symlink() {
            continue;
        }
        // Dangling links count as escapes.
        let inside = fs_err::canonicalize(current.as_std_path())
            .map(|resolved| resolved.starts_with(root))
            .unwrap_or(false);
        if !inside {
            return Err(PolicyError::SymlinkEscape(current).into());
        }
    }
    Ok(())
}

fn refuse_symlink_leaf(validated: &ValidatedPath) -> Result<()> {
    match fs_err::symlink_metadata(validated.abs.as_std_path()) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            Err(PolicyError::ExistingSymlink(validated.rel.clone()).into())
        }
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn ensure_parent_exists(path: &Utf8Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent.as_std_path())?;
    }
    Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Utf8Path) -> io::Result<()> {
    fs_err::os::unix::fs::symlink(target, link.as_std_path())
}

#[cfg(windows)]
fn make_symlink(target: &str, link: &Utf8Path) -> io::Result<()> {
    fs_err::os::windows::fs::symlink_file(target, link.as_std_path())
}
