//! Commit and commit-range models.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::change_id::{extract_change_id, ChangeId};

/// A single commit as the planner sees it: hash, message, and the Change-Id
/// derived from the message (absent means the commit can only be matched by
/// hash, never by logical identity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Content hash (full sha).
    pub sha: String,
    /// Full commit message, subject and body.
    pub message: String,
    /// Derived Change-Id, when the message carries one.
    pub change_id: Option<ChangeId>,
}

impl Commit {
    /// Build a commit, deriving the Change-Id from `message`.
    pub fn new(sha: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let change_id = extract_change_id(&message);
        Self {
            sha: sha.into(),
            message,
            change_id,
        }
    }

    /// Abbreviated sha for log lines.
    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(8)]
    }

    /// First line of the message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Ordered sequence of commits reachable from one ref but not another,
/// oldest first. Linear ancestry order; duplicate hashes are rejected at
/// construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRange {
    commits: Vec<Commit>,
}

impl CommitRange {
    /// Wrap an oldest-first commit list. Panics in debug builds if the same
    /// hash appears twice; ranges come from `rev-list` walks where that
    /// cannot happen.
    pub fn new(commits: Vec<Commit>) -> Self {
        debug_assert!(
            {
                let mut seen = HashSet::new();
                commits.iter().all(|c| seen.insert(c.sha.as_str()))
            },
            "duplicate sha in commit range"
        );
        Self { commits }
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Commit> {
        self.commits.iter()
    }

    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    /// The set of Change-Ids present in this range. Used as the landed set
    /// when this range is the target side of a rebase plan.
    pub fn change_ids(&self) -> HashSet<ChangeId> {
        self.commits
            .iter()
            .filter_map(|c| c.change_id.clone())
            .collect()
    }
}

impl IntoIterator for CommitRange {
    type Item = Commit;
    type IntoIter = std::vec::IntoIter<Commit>;

    fn into_iter(self) -> Self::IntoIter {
        self.commits.into_iter()
    }
}
