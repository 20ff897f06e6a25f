//! Error taxonomy for repository operations.
//!
//! Every error here is repository-local: the orchestrator catches them at the
//! worker boundary and folds them into that repository's outcome, so no single
//! repository can abort the others mid-flight.

use thiserror::Error;

/// Errors produced while operating on a single repository.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A requested branch or ref does not exist in the repository.
    #[error("ref not found: {reference}")]
    RefNotFound { reference: String },

    /// Attempt to delete or modify the currently checked-out branch.
    #[error("branch '{branch}' is currently checked out")]
    BranchInUse { branch: String },

    /// Textual merge conflict during replay or stash-pop. The repository is
    /// left in the intermediate state for manual resolution.
    #[error("conflict while applying {subject}")]
    Conflict { subject: String },

    /// Push/pull precondition not met: the branch is both ahead of and behind
    /// its remote counterpart.
    #[error("diverged from remote ({ahead} ahead, {behind} behind); rebase first")]
    Diverged { ahead: usize, behind: usize },

    /// HEAD does not point at a branch tip, so there is no topic to act on.
    #[error("HEAD is detached; there is no topic")]
    DetachedHead,

    /// A change ref did not match the expected `<number>/<patchset>` form.
    #[error("'{spec}' is not a valid change ref")]
    InvalidChangeRef { spec: String },

    /// The manifest file could not be read or parsed.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// The execution collaborator itself failed unexpectedly (process error,
    /// permission, missing working directory). Always surfaced.
    #[error("git execution failed: {detail}")]
    Execution { detail: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    /// Shorthand for a [`RepoError::Execution`] from any displayable cause.
    pub fn execution(detail: impl std::fmt::Display) -> Self {
        Self::Execution {
            detail: detail.to_string(),
        }
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepoError>;
