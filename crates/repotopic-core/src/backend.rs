//! Version-control execution collaborator.
//!
//! [`VcsBackend`] is the narrow capability interface everything above it is
//! written against: the planner and orchestrator never spawn processes
//! themselves. Inject [`crate::git::GitCli`] in production or
//! [`crate::fakes::MemoryVcs`] in tests.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of an operation that can hit a textual merge conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    /// Applied cleanly.
    Clean,
    /// Stopped on a conflict; the working tree is left in the intermediate
    /// state for manual resolution.
    Conflict,
}

impl ApplyStatus {
    pub fn is_clean(self) -> bool {
        matches!(self, ApplyStatus::Clean)
    }
}

/// Command-execution interface over one repository working directory.
///
/// Every method is repository-local and synchronous from the caller's point
/// of view; failures are [`crate::error::RepoError`] values, never process
/// aborts. Methods that the contract says may conflict (`cherry_pick`,
/// `stash_pop`) report that through [`ApplyStatus`], not through `Err`.
#[async_trait]
pub trait VcsBackend: Send + Sync {
    /// Whether `dir` is an existing repository working tree.
    async fn is_repository(&self, dir: &Path) -> bool;

    /// Resolve a ref name to a commit sha. `RefNotFound` when it does not
    /// exist.
    async fn resolve_ref(&self, dir: &Path, reference: &str) -> Result<String>;

    /// The currently checked-out branch, or `None` for a detached HEAD.
    async fn current_branch(&self, dir: &Path) -> Result<Option<String>>;

    /// Hashes reachable from `source` but not from `target`, oldest first.
    /// Both refs must already resolve.
    async fn commit_range(&self, dir: &Path, source: &str, target: &str) -> Result<Vec<String>>;

    /// Full commit message (subject and body) for one commit.
    async fn commit_message(&self, dir: &Path, sha: &str) -> Result<String>;

    /// Check out an existing branch.
    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Create a branch at the current tip and check it out.
    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Force-delete a branch.
    async fn delete_branch(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Rename the currently checked-out branch.
    async fn rename_branch(&self, dir: &Path, new_name: &str) -> Result<()>;

    /// Check out a ref without moving any branch (detached HEAD).
    async fn detached_checkout(&self, dir: &Path, reference: &str) -> Result<()>;

    /// Point `branch` at `start_point` (or at HEAD when `None`) and check it
    /// out, creating or moving the branch as needed.
    async fn reset_branch(&self, dir: &Path, branch: &str, start_point: Option<&str>)
        -> Result<()>;

    /// Replay one commit onto the current HEAD.
    async fn cherry_pick(&self, dir: &Path, sha: &str) -> Result<ApplyStatus>;

    /// Push a refspec to a remote, with optional push options
    /// (`-o key=value`).
    async fn push(&self, dir: &Path, remote: &str, refspec: &str, options: &[String])
        -> Result<()>;

    /// Fetch a refspec from a remote and return the sha FETCH_HEAD now points
    /// at.
    async fn fetch(&self, dir: &Path, remote: &str, refspec: &str) -> Result<String>;

    /// First configured remote name (conventionally `origin`).
    async fn first_remote(&self, dir: &Path) -> Result<String>;

    /// Clone `url` into `dir`.
    async fn clone_repo(&self, url: &str, dir: &Path) -> Result<()>;

    /// Stash the working tree.
    async fn stash_save(&self, dir: &Path) -> Result<()>;

    /// Current stash entries, newest first. Empty when there is nothing
    /// stashed.
    async fn stash_list(&self, dir: &Path) -> Result<Vec<String>>;

    /// Pop the newest stash entry. On conflict the entry is preserved and the
    /// working tree keeps the partial application.
    async fn stash_pop(&self, dir: &Path) -> Result<ApplyStatus>;

    /// Commits in `local` not in `upstream`, and vice versa.
    async fn ahead_behind(
        &self,
        dir: &Path,
        local: &str,
        upstream: &str,
    ) -> Result<(usize, usize)>;

    /// Run an arbitrary operator-supplied command in the repository working
    /// directory; the exit status is passed through verbatim.
    async fn run_command(&self, dir: &Path, command: &str) -> Result<i32>;
}
