//! Command-line interface definitions for ustar-unpack.

use camino::Utf8PathBuf;
use clap::{Args, Parser, ValueHint};

const CLI_EXAMPLES: &str = "Examples:\n  ustar-unpack backup.tar\n  ustar-unpack -C ./restore --strict backup.tar\n  ustar-unpack --list --json backup.tar\n";

/// Top-level CLI parser.
#[derive(Debug, Parser)]
#[command(
    name = "ustar-unpack",
    version,
    about = "Extract USTAR archives (with PAX long names)",
    long_about = "Extracts regular files, directories, hard links, and symbolic links from a \
                  USTAR archive, printing each extracted path on stdout.",
    after_help = CLI_EXAMPLES,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Archive to extract.
    #[arg(value_name = "ARCHIVE", value_hint = ValueHint::FilePath)]
    pub archive: Utf8PathBuf,
    /// Destination directory (default: current directory).
    #[arg(short = 'C', long = "directory", value_hint = ValueHint::DirPath)]
    pub directory: Option<Utf8PathBuf>,
    /// List entries instead of extracting them.
    #[arg(short = 't', long = "list")]
    pub list: bool,
    /// With --list, print the entries as JSON.
    #[arg(long = "json", requires = "list")]
    pub json: bool,
    /// Print kind and size next to each path.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
    /// Do not print extracted paths.
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
    /// Show a spinner on stderr instead of printing paths.
    #[arg(long = "progress")]
    pub progress: bool,
    /// Fail when the archive lacks its two-block terminator.
    #[arg(long = "strict")]
    pub strict: bool,
    /// Verify every header checksum.
    #[arg(long = "verify-checksums")]
    pub verify_checksums: bool,
    /// Allow absolute entry names instead of rejecting them.
    #[arg(short = 'P', long = "absolute-names")]
    pub absolute_names: bool,
    /// Write a JSON manifest of the extracted entries.
    #[arg(long = "manifest-out", value_hint = ValueHint::FilePath)]
    pub manifest_out: Option<Utf8PathBuf>,
    /// Verify the extracted entries against this manifest.
    #[arg(long = "manifest", value_hint = ValueHint::FilePath)]
    pub manifest: Option<Utf8PathBuf>,
    /// Allow entries missing from the manifest when verifying.
    #[arg(long = "manifest-relaxed", requires = "manifest")]
    pub manifest_relaxed: bool,
    /// Override resource limits.
    #[command(flatten)]
    pub limits: LimitArgs,
}

/// Resource limit overrides.
#[derive(Debug, Args, Clone, Default)]
pub struct LimitArgs {
    /// Maximum number of entries extracted.
    #[arg(long = "max-files")]
    pub max_files: Option<u64>,
    /// Maximum total payload bytes extracted.
    #[arg(long = "max-total-bytes")]
    pub max_total_bytes: Option<u64>,
    /// Maximum single file size allowed.
    #[arg(long = "max-single-file")]
    pub max_single_file: Option<u64>,
    /// Maximum directory depth below the destination.
    #[arg(long = "max-depth")]
    pub max_depth: Option<u32>,
}
