//! Per-entry progress output.

use std::io::{self, Write};
use std::time::Duration;

use indicatif::ProgressBar;

use crate::manifest::{ManifestEntry, ManifestKind};

/// How much to print for each processed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    /// One resolved path per line.
    #[default]
    Normal,
    /// Kind, size, and path (plus link target) per line.
    Verbose,
}

/// Emits one progress record per processed entry, in archive order.
pub struct Reporter<W: Write> {
    out: W,
    verbosity: Verbosity,
    spinner: Option<ProgressBar>,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, verbosity: Verbosity) -> Self {
        Self {
            out,
            verbosity,
            spinner: None,
        }
    }

    /// Replace per-line output with a spinner drawn on stderr.
    #[must_use]
    pub fn with_spinner(mut self, message: &'static str) -> Self {
        if self.verbosity != Verbosity::Quiet {
            let pb = ProgressBar::new_spinner();
            pb.enable_steady_tick(Duration::from_millis(120));
            pb.set_message(message);
            self.spinner = Some(pb);
        }
        self
    }

    /// Record one processed entry.
    pub fn entry(&mut self, entry: &ManifestEntry) -> io::Result<()> {
        if let Some(pb) = &self.spinner {
            pb.set_message(entry.path.clone());
            pb.inc(1);
            return Ok(());
        }
        match self.verbosity {
            Verbosity::Quiet => Ok(()),
            Verbosity::Normal => writeln!(self.out, "{}", entry.path),
            Verbosity::Verbose => match (&entry.target, entry.kind) {
                (Some(target), ManifestKind::Symlink) => writeln!(
                    self.out,
                    "{}\t{}\t{} -> {target}",
                    entry.kind, entry.size, entry.path
                ),
                (Some(target), ManifestKind::HardLink) => writeln!(
                    self.out,
                    "{}\t{}\t{} link to {target}",
                    entry.kind, entry.size, entry.path
                ),
                _ => writeln!(self.out, "{}\t{}\t{}", entry.kind, entry.size, entry.path),
            },
        }
    }

    /// Stop the spinner (if any), flush, and hand back the output stream.
    pub fn finish(mut self, message: &'static str) -> io::Result<W> {
        if let Some(pb) = self.spinner.take() {
            pb.finish_with_message(message);
        }
        self.out.flush()?;
        Ok(self.out)
    }
}
