//! Mapping archive names onto the destination directory, plus resource limits.
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use path_clean::PathClean;
use thiserror::Error;

/// Resource limits enforced by [`SecurityPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyLimits {
    pub max_files: u64,
    pub max_total_bytes: u64,
    pub max_single_file: u64,
    pub max_depth: u32,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            max_files: 200_000,
            max_total_bytes: 8u64 << 30,
            max_single_file: 2u64 << 30,
            max_depth: 64,
        }
    }
}

/// Extraction policy configuration.
#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
    limits: PolicyLimits,
    allow_absolute: bool,
}

impl SecurityPolicy {
    /// Create a new policy using default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace built-in limits with the supplied values.
    #[must_use]
    pub fn with_limits(mut self, limits: PolicyLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Adjust maximum files.
    #[must_use]
    pub fn with_max_files(mut self, value: Option<u64>) -> Self {
        if let Some(value) = value {
            self.limits.max_files = value;
        }
        self
    }

    /// Adjust maximum total bytes.
    #[must_use]
    pub fn with_max_total_bytes(mut self, value: Option<u64>) -> Self {
        if let Some(value) = value {
            self.limits.max_total_bytes = value;
        }
        self
    }

    /// Adjust maximum single file size.
    #[must_use]
    pub fn with_max_single_file(mut self, value: Option<u64>) -> Self {
        if let Some(value) = value {
            self.limits.max_single_file = value;
        }
        self
    }

    /// Adjust maximum depth.
    #[must_use]
    pub fn with_max_depth(mut self, value: Option<u32>) -> Self {
        if let Some(value) = value {
            self.limits.max_depth = value;
        }
        self
    }

    /// Keep absolute entry names as-is instead of rejecting them.
    #[must_use]
    pub fn with_absolute_names(mut self, allow: bool) -> Self {
        self.allow_absolute = allow;
        self
    }

    /// Resolve an archive entry name to a location under `root`.
    ///
    /// Relative names are joined onto `root` and lexically cleaned; the result
    /// must stay inside `root`. Absolute names are rejected unless allowed, in
    /// which case they are used verbatim (after cleaning).
    pub fn resolve(&self, path: &Utf8Path, root: &Utf8Path) -> Result<ValidatedPath, PolicyError> {
        if path.as_str().is_empty() {
            return Err(PolicyError::EmptyPath);
        }

        if path.is_absolute() {
            if !self.allow_absolute {
                return Err(PolicyError::AbsolutePath(path.to_owned()));
            }
            let abs = clean(path)?;
            return Ok(ValidatedPath {
                rel: abs.clone(),
                abs,
            });
        }

        let cleaned = clean(&root.join(path))?;
        if !cleaned.starts_with(root) {
            return Err(PolicyError::RootEscape(cleaned));
        }

        let rel = cleaned
            .strip_prefix(root)
            .map(Utf8Path::to_owned)
            .unwrap_or_else(|_| Utf8PathBuf::new());

        Ok(ValidatedPath { rel, abs: cleaned })
    }

    /// Resolve the existing file a hard link entry points at.
    ///
    /// Link targets name other archive members, so they resolve against
    /// `root` exactly like entry names do.
    pub fn resolve_link_target(
        &self,
        target: &Utf8Path,
        root: &Utf8Path,
    ) -> Result<ValidatedPath, PolicyError> {
        self.enforce_link_policy(target, root, root, LinkType::Hardlink)?;
        self.resolve(target, root).map_err(|err| match err {
            PolicyError::AbsolutePath(_) | PolicyError::RootEscape(_) => {
                PolicyError::LinkOutsideRoot(target.to_owned())
            }
            other => other,
        })
    }

    /// Enforce that a link target stays within `root`.
    ///
    /// Relative targets are resolved against `base`, the directory the link
    /// lives in. Symlinks may point anywhere once absolute names are allowed;
    /// hard links never leave `root`.
    pub fn enforce_link_policy(
        &self,
        target: &Utf8Path,
        base: &Utf8Path,
        root: &Utf8Path,
        kind: LinkType,
    ) -> Result<(), PolicyError> {
        let allow_outside = match kind {
            LinkType::Symlink => self.allow_absolute,
            LinkType::Hardlink => false,
        };
        if allow_outside {
            return Ok(());
        }

        let resolved = if target.is_absolute() {
            target.to_owned()
        } else {
            base.join(target)
        };
        let cleaned =
            clean(&resolved).map_err(|_| PolicyError::LinkOutsideRoot(target.to_owned()))?;
        if cleaned.starts_with(root) {
            Ok(())
        } else {
            Err(PolicyError::LinkOutsideRoot(target.to_owned()))
        }
    }

    /// Create a usage tracker that enforces quota counters.
    #[must_use]
    pub fn usage(&self) -> UsageTracker {
        UsageTracker {
            limits: self.limits,
            files_seen: 0,
            total_bytes: 0,
        }
    }
}

/// Kind of link an entry asks to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Symlink,
    Hardlink,
}

/// An entry location under the extraction root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath {
    pub rel: Utf8PathBuf,
    pub abs: Utf8PathBuf,
}

/// Tracks resource usage against enforced limits.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    limits: PolicyLimits,
    files_seen: u64,
    total_bytes: u64,
}

impl UsageTracker {
    /// Account for one entry of `size` payload bytes.
    pub fn observe(&mut self, validated: &ValidatedPath, size: u64) -> Result<(), PolicyError> {
        let limits = self.limits;

        if size > limits.max_single_file {
            return Err(PolicyError::SingleFileTooLarge {
                path: validated.rel.clone(),
                actual: size,
                limit: limits.max_single_file,
            });
        }

        let depth = depth_of(&validated.rel);
        if depth > limits.max_depth {
            return Err(PolicyError::DepthExceeded {
                path: validated.rel.clone(),
                actual: depth,
                limit: limits.max_depth,
            });
        }

        self.files_seen = self.files_seen.saturating_add(1);
        if self.files_seen > limits.max_files {
            return Err(PolicyError::FileCountExceeded {
                limit: limits.max_files,
                actual: self.files_seen,
            });
        }

        self.total_bytes = self.total_bytes.saturating_add(size);
        if self.total_bytes > limits.max_total_bytes {
            return Err(PolicyError::TotalBytesExceeded {
                limit: limits.max_total_bytes,
                actual: self.total_bytes,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("path is empty")]
    EmptyPath,
    #[error("absolute path rejected: {0}")]
    AbsolutePath(Utf8PathBuf),
    #[error("path escapes extraction root: {0}")]
    RootEscape(Utf8PathBuf),
    #[error("path contains invalid UTF-8: {0}")]
    InvalidUtf8(Utf8PathBuf),
    #[error("link target escapes root: {0}")]
    LinkOutsideRoot(Utf8PathBuf),
    #[error("path leads through a symlink outside the extraction root: {0}")]
    SymlinkEscape(Utf8PathBuf),
    #[error("refusing to write through existing symlink: {0}")]
    ExistingSymlink(Utf8PathBuf),
    #[error("file count exceeded (limit {limit}, actual {actual})")]
    FileCountExceeded { limit: u64, actual: u64 },
    #[error("total bytes exceeded (limit {limit}, actual {actual})")]
    TotalBytesExceeded { limit: u64, actual: u64 },
    #[error("single file too large for {path} (limit {limit}, actual {actual})")]
    SingleFileTooLarge {
        path: Utf8PathBuf,
        actual: u64,
        limit: u64,
    },
    #[error("directory depth exceeded for {path} (limit {limit}, actual {actual})")]
    DepthExceeded {
        path: Utf8PathBuf,
        actual: u32,
        limit: u32,
    },
}

fn clean(path: &Utf8Path) -> Result<Utf8PathBuf, PolicyError> {
    Utf8PathBuf::from_path_buf(path.as_std_path().clean())
        .map_err(|_| PolicyError::InvalidUtf8(path.to_owned()))
}

fn depth_of(path: &Utf8Path) -> u32 {
    let normal = path
        .components()
        .filter(|component| matches!(component, Utf8Component::Normal(_)))
        .count();
    u32::try_from(normal).unwrap_or(u32::MAX)
}
