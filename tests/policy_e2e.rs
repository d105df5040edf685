//! End-to-end policy assertions on real extractions.

mod common;

use std::fs;

use anyhow::Result;
use tempfile::tempdir;
use ustar_unpack::archive::{extract_archive, ExtractOptions, Verbosity, WalkOptions};
use ustar_unpack::policy::{PolicyError, SecurityPolicy};

use common::{utf8_dir, ArchiveBuilder};

fn extract_options(base: &camino::Utf8Path) -> ExtractOptions {
    ExtractOptions {
        archive_path: base.join("in.tar"),
        destination: base.join("out"),
        verbosity: Verbosity::Quiet,
        progress: false,
        walk: WalkOptions::default(),
        manifest: None,
        manifest_relaxed: false,
        manifest_out: None,
    }
}

#[test]
fn rejects_absolute_entry_by_default() -> Result<()> {
    let temp = tempdir()?;
    let base = utf8_dir(&temp)?;
    fs::write(
        base.join("in.tar"),
        ArchiveBuilder::new().file("/tmp/escape.txt", b"x").finish(),
    )?;

    let err = extract_archive(&extract_options(&base), &SecurityPolicy::new())
        .expect_err("absolute names are rejected");
    assert!(matches!(
        err.downcast_ref::<PolicyError>(),
        Some(PolicyError::AbsolutePath(_))
    ));
    Ok(())
}

#[test]
fn absolute_entry_allowed_when_requested() -> Result<()> {
    let temp = tempdir()?;
    let base = utf8_dir(&temp)?;
    let target = base.join("abs/landed.txt");
    fs::write(
        base.join("in.tar"),
        ArchiveBuilder::new().file(target.as_str(), b"abs").finish(),
    )?;

    let policy = SecurityPolicy::new().with_absolute_names(true);
    extract_archive(&extract_options(&base), &policy)?;

    assert_eq!(fs::read_to_string(&target)?, "abs");
    Ok(())
}

#[test]
fn enforces_file_count_limit() -> Result<()> {
    let temp = tempdir()?;
    let base = utf8_dir(&temp)?;
    fs::write(
        base.join("in.tar"),
        ArchiveBuilder::new()
            .file("one.txt", b"1")
            .file("two.txt", b"2")
            .finish(),
    )?;

    let policy = SecurityPolicy::new().with_max_files(Some(1));
    let err = extract_archive(&extract_options(&base), &policy).expect_err("too many files");
    assert!(matches!(
        err.downcast_ref::<PolicyError>(),
        Some(PolicyError::FileCountExceeded { .. })
    ));
    assert!(base.join("out/one.txt").exists());
    assert!(!base.join("out/two.txt").exists());
    Ok(())
}

#[test]
fn enforces_single_file_limit_before_writing() -> Result<()> {
    let temp = tempdir()?;
    let base = utf8_dir(&temp)?;
    fs::write(
        base.join("in.tar"),
        ArchiveBuilder::new().file("big.bin", &[0u8; 2048]).finish(),
    )?;

    let policy = SecurityPolicy::new().with_max_single_file(Some(1024));
    let err = extract_archive(&extract_options(&base), &policy).expect_err("file too large");
    assert!(matches!(
        err.downcast_ref::<PolicyError>(),
        Some(PolicyError::SingleFileTooLarge { .. })
    ));
    assert!(!base.join("out/big.bin").exists());
    Ok(())
}
