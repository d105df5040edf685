//! CLI smoke tests covering argument handling, exit codes, and progress output.

mod common;

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

use common::ArchiveBuilder;

#[test]
fn extracts_and_prints_paths() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let archive_path = temp.path().join("bundle.tar");
    fs::write(
        &archive_path,
        ArchiveBuilder::new()
            .dir("docs/")
            .file("docs/readme.txt", b"read me")
            .symlink("docs/latest", "readme.txt")
            .finish(),
    )?;
    let extract_dir = temp.path().join("out");

    cargo_bin_cmd!("ustar-unpack")
        .arg("-C")
        .arg(&extract_dir)
        .arg(&archive_path)
        .assert()
        .success()
        .stdout("docs/\ndocs/readme.txt\ndocs/latest\n");

    assert_eq!(
        fs::read_to_string(extract_dir.join("docs/readme.txt"))?,
        "read me"
    );
    Ok(())
}

#[test]
fn extracts_into_working_directory_by_default() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let archive_path = temp.path().join("here.tar");
    fs::write(
        &archive_path,
        ArchiveBuilder::new().file("here.txt", b"cwd").finish(),
    )?;

    cargo_bin_cmd!("ustar-unpack")
        .current_dir(temp.path())
        .arg("here.tar")
        .assert()
        .success()
        .stdout("here.txt\n");

    assert_eq!(fs::read_to_string(temp.path().join("here.txt"))?, "cwd");
    Ok(())
}

#[test]
fn wrong_argument_count_fails() {
    cargo_bin_cmd!("ustar-unpack").assert().failure();

    cargo_bin_cmd!("ustar-unpack")
        .args(["one.tar", "two.tar"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn missing_archive_is_user_error() -> anyhow::Result<()> {
    let temp = tempdir()?;

    cargo_bin_cmd!("ustar-unpack")
        .arg(temp.path().join("nope.tar"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot access archive"));
    Ok(())
}

#[test]
fn directory_is_not_an_archive() -> anyhow::Result<()> {
    let temp = tempdir()?;

    cargo_bin_cmd!("ustar-unpack")
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is not a regular file"));
    Ok(())
}

#[test]
fn malformed_terminator_exits_nonzero() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let archive_path = temp.path().join("broken.tar");
    fs::write(
        &archive_path,
        ArchiveBuilder::new()
            .file("kept.txt", b"k")
            .zero_block()
            .file("lost.txt", b"l")
            .finish(),
    )?;
    let extract_dir = temp.path().join("out");

    cargo_bin_cmd!("ustar-unpack")
        .arg("--directory")
        .arg(&extract_dir)
        .arg(&archive_path)
        .assert()
        .code(4)
        .stdout("kept.txt\n")
        .stderr(predicate::str::contains("header error"));

    assert!(!extract_dir.join("lost.txt").exists());
    Ok(())
}

#[test]
fn unsupported_type_names_the_flag() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let archive_path = temp.path().join("fifo.tar");
    fs::write(
        &archive_path,
        ArchiveBuilder::new()
            .header(&common::RawHeader::new("pipe", b'6'))
            .finish(),
    )?;

    cargo_bin_cmd!("ustar-unpack")
        .arg("-C")
        .arg(temp.path().join("out"))
        .arg(&archive_path)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("unsupported file type '6'"));
    Ok(())
}

#[test]
fn quiet_suppresses_progress() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let archive_path = temp.path().join("quiet.tar");
    fs::write(
        &archive_path,
        ArchiveBuilder::new().file("q.txt", b"q").finish(),
    )?;

    cargo_bin_cmd!("ustar-unpack")
        .arg("--quiet")
        .arg("-C")
        .arg(temp.path().join("out"))
        .arg(&archive_path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    Ok(())
}

#[test]
fn list_json_reports_entries() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let archive_path = temp.path().join("listed.tar");
    fs::write(
        &archive_path,
        ArchiveBuilder::new()
            .pax("path=a/really/long/listed/name.bin\n")
            .file("name.bin", b"abc123")
            .finish(),
    )?;

    cargo_bin_cmd!("ustar-unpack")
        .current_dir(temp.path())
        .args(["--list", "--json", "listed.tar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"path\": \"a/really/long/listed/name.bin\""))
        .stdout(predicate::str::contains("\"kind\": \"File\""));

    assert!(!temp.path().join("a").exists());
    Ok(())
}
