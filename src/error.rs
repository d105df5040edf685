//! Shared error helpers and the exit-code contract of the binary.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::manifest::ManifestError;
use crate::policy::PolicyError;

/// Represents a user input error (unreadable archive, not a regular file, etc.).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UserInputError(pub String);

impl UserInputError {
    /// Convenience constructor.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Process exit status for a failed run.
///
/// `2` bad input, `3` policy or manifest violation, `4` malformed archive,
/// `1` anything else (I/O and filesystem failures).
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.is::<PolicyError>() || cause.is::<ManifestError>() {
            return 3;
        }
        if cause.is::<ArchiveError>() {
            return 4;
        }
        if cause.is::<UserInputError>() {
            return 2;
        }
    }
    1
}
