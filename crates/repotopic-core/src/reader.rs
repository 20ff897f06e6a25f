//! Commit-range reading on top of the execution collaborator.

use std::path::Path;

use crate::backend::VcsBackend;
use crate::commit::{Commit, CommitRange};
use crate::error::Result;

/// Read the commits reachable from `source` but not from `target`, oldest
/// first, with messages and derived Change-Ids.
///
/// Both refs are resolved up front so an unknown ref surfaces as
/// [`crate::error::RepoError::RefNotFound`] rather than a raw git failure. A
/// source already contained in the target yields an empty range, which is a
/// valid result, not an error.
pub async fn commit_range(
    backend: &dyn VcsBackend,
    dir: &Path,
    source: &str,
    target: &str,
) -> Result<CommitRange> {
    backend.resolve_ref(dir, source).await?;
    backend.resolve_ref(dir, target).await?;

    let shas = backend.commit_range(dir, source, target).await?;
    let mut commits = Vec::with_capacity(shas.len());
    for sha in shas {
        let message = backend.commit_message(dir, &sha).await?;
        commits.push(Commit::new(sha, message));
    }
    Ok(CommitRange::new(commits))
}
