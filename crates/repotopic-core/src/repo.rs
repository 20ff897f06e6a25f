//! Per-repository identity and state.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::VcsBackend;
use crate::error::{RepoError, Result};

/// One managed local clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Short display name (directory basename).
    pub name: String,
    /// Remote URL the clone came from (used by `sync` to create it).
    pub url: String,
    /// Absolute working directory.
    pub dir: PathBuf,
}

impl RepoHandle {
    pub fn new(name: impl Into<String>, url: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            dir: dir.into(),
        }
    }
}

/// What HEAD points at: a topic branch, or nothing (detached).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicState {
    Branch(String),
    Detached,
}

impl TopicState {
    pub fn branch(&self) -> Option<&str> {
        match self {
            TopicState::Branch(name) => Some(name),
            TopicState::Detached => None,
        }
    }
}

impl fmt::Display for TopicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicState::Branch(name) => f.write_str(name),
            TopicState::Detached => f.write_str("(detached)"),
        }
    }
}

/// Read-only snapshot of one repository's topic and remote relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoStatus {
    pub topic: TopicState,
    /// The remote counterpart ref the counts were computed against, when one
    /// exists.
    pub upstream: Option<String>,
    /// Commits in local and not in the remote counterpart.
    pub ahead: usize,
    /// Commits in the remote counterpart and not in local.
    pub behind: usize,
}

/// The ref naming the remote's primary tip, probed in conventional order.
async fn remote_target(backend: &dyn VcsBackend, dir: &Path) -> Result<Option<String>> {
    let remote = match backend.first_remote(dir).await {
        Ok(remote) => remote,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "no usable remote");
            return Ok(None);
        }
    };
    for candidate in [
        format!("{remote}/HEAD"),
        format!("{remote}/master"),
        format!("{remote}/main"),
    ] {
        match backend.resolve_ref(dir, &candidate).await {
            Ok(_) => return Ok(Some(candidate)),
            Err(RepoError::RefNotFound { .. }) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Inspect one repository: current topic, and ahead/behind counts against its
/// remote counterpart. Read-only and side-effect-free.
pub async fn inspect(backend: &dyn VcsBackend, repo: &RepoHandle) -> Result<RepoStatus> {
    let topic = match backend.current_branch(&repo.dir).await? {
        Some(branch) => TopicState::Branch(branch),
        None => TopicState::Detached,
    };

    let upstream = remote_target(backend, &repo.dir).await?;
    let (ahead, behind) = match &upstream {
        Some(upstream) => backend.ahead_behind(&repo.dir, "HEAD", upstream).await?,
        None => (0, 0),
    };

    Ok(RepoStatus {
        topic,
        upstream,
        ahead,
        behind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryVcs;
    use std::path::PathBuf;

    fn handle(dir: &Path) -> RepoHandle {
        RepoHandle::new("repo", "ssh://example/repo", dir)
    }

    #[tokio::test]
    async fn test_inspect_reports_branch_and_counts() {
        let vcs = MemoryVcs::new();
        let dir = PathBuf::from("/fake/inspect");
        vcs.add_repo(&dir, "feature-x");
        vcs.commit(&dir, "l1", "local one");
        vcs.commit(&dir, "l2", "local two");
        vcs.add_remote_commit(&dir, "r1", "remote one");

        let status = inspect(&vcs, &handle(&dir)).await.unwrap();
        assert_eq!(status.topic, TopicState::Branch("feature-x".to_string()));
        assert_eq!(status.upstream.as_deref(), Some("origin/HEAD"));
        assert_eq!((status.ahead, status.behind), (2, 1));
    }

    #[tokio::test]
    async fn test_inspect_detached() {
        let vcs = MemoryVcs::new();
        let dir = PathBuf::from("/fake/inspect-detached");
        vcs.add_repo(&dir, "master");
        vcs.detached_checkout(&dir, "root").await.unwrap();

        let status = inspect(&vcs, &handle(&dir)).await.unwrap();
        assert_eq!(status.topic, TopicState::Detached);
        assert_eq!(status.topic.to_string(), "(detached)");
    }

    #[test]
    fn test_topic_state_branch_accessor() {
        assert_eq!(
            TopicState::Branch("t".to_string()).branch(),
            Some("t")
        );
        assert_eq!(TopicState::Detached.branch(), None);
    }
}
