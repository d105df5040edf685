//! ustar-unpack library entry points.

pub mod archive;
pub mod cli;
pub mod error;
pub mod manifest;
pub mod policy;

use anyhow::Result;
use camino::Utf8PathBuf;

use crate::archive::{
    extract_archive, list_archive, ExtractOptions, ListOptions, Verbosity, WalkOptions,
};
use crate::cli::{Cli, LimitArgs};
use crate::policy::SecurityPolicy;

/// Execute the command represented by the parsed CLI input.
pub fn run(cli: Cli) -> Result<()> {
    let walk = WalkOptions {
        strict: cli.strict,
        verify_checksums: cli.verify_checksums,
    };
    let verbosity = verbosity(cli.quiet, cli.verbose);

    if cli.list {
        let options = ListOptions {
            archive_path: cli.archive,
            verbosity,
            json: cli.json,
            walk,
        };
        list_archive(&options)?;
        return Ok(());
    }

    let policy = base_policy(&cli.limits).with_absolute_names(cli.absolute_names);
    let options = ExtractOptions {
        archive_path: cli.archive,
        destination: cli.directory.unwrap_or_else(|| Utf8PathBuf::from(".")),
        verbosity,
        progress: cli.progress,
        walk,
        manifest: cli.manifest,
        manifest_relaxed: cli.manifest_relaxed,
        manifest_out: cli.manifest_out,
    };
    extract_archive(&options, &policy)?;
    Ok(())
}

fn verbosity(quiet: bool, verbose: bool) -> Verbosity {
    match (quiet, verbose) {
        (true, _) => Verbosity::Quiet,
        (false, true) => Verbosity::Verbose,
        (false, false) => Verbosity::Normal,
    }
}

fn base_policy(limits: &LimitArgs) -> SecurityPolicy {
    SecurityPolicy::new()
        .with_max_files(limits.max_files)
        .with_max_total_bytes(limits.max_total_bytes)
        .with_max_single_file(limits.max_single_file)
        .with_max_depth(limits.max_depth)
}
