//! Per-repository outcomes and the consolidated workspace report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RepoError;
use crate::repo::TopicState;

/// How one repository's operation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RepoOutcome {
    /// The operation completed.
    Success,
    /// Nothing to do here; not a failure (e.g. topic absent, nothing to
    /// push).
    Skipped { reason: String },
    /// Replay or stash-pop stopped on a textual conflict; the repository is
    /// left mid-operation for manual resolution.
    Conflict { detail: String },
    /// The operation failed.
    Failed { error: String },
}

impl RepoOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Success and clean skips both count as ok for the process exit status.
    pub fn is_ok(&self) -> bool {
        matches!(self, RepoOutcome::Success | RepoOutcome::Skipped { .. })
    }

    /// Fold a repository-local error into an outcome at the worker boundary.
    pub fn from_error(err: RepoError) -> Self {
        match err {
            RepoError::Conflict { subject } => RepoOutcome::Conflict { detail: subject },
            other => RepoOutcome::Failed {
                error: other.to_string(),
            },
        }
    }
}

/// One repository's row in the consolidated report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoReport {
    pub repo: String,
    /// Topic observed by the post-operation consistency pass; `None` when
    /// the repository could not be inspected.
    pub topic: Option<TopicState>,
    pub outcome: RepoOutcome,
}

/// Derived cross-repository topic view. Recomputed on every invocation,
/// never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSummary {
    /// Repository name -> topic (detached repositories show `(detached)`).
    pub topics: BTreeMap<String, String>,
    /// The most common topic, when any repository was inspectable.
    pub majority: Option<String>,
    /// Repositories not on the majority topic.
    pub divergent: Vec<String>,
    /// `true` only when every inspected repository is on the same topic.
    pub consistent: bool,
}

impl TopicSummary {
    /// Build the summary from observed per-repository topics, in workspace
    /// order.
    pub fn from_observations(observations: &[(String, TopicState)]) -> Self {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for (_, state) in observations {
            let display = state.to_string();
            match counts.iter_mut().find(|(t, _)| *t == display) {
                Some((_, n)) => *n += 1,
                None => counts.push((display, 1)),
            }
        }
        // First-seen wins ties, like the workspace order the operator reads.
        let majority = counts
            .iter()
            .max_by_key(|(_, n)| *n)
            .map(|(t, _)| t.clone());

        let topics: BTreeMap<String, String> = observations
            .iter()
            .map(|(repo, state)| (repo.clone(), state.to_string()))
            .collect();

        let divergent: Vec<String> = observations
            .iter()
            .filter(|(_, state)| Some(state.to_string()) != majority)
            .map(|(repo, _)| repo.clone())
            .collect();

        let consistent = !observations.is_empty() && divergent.is_empty();

        Self {
            topics,
            majority,
            divergent,
            consistent,
        }
    }
}

/// Aggregation of one operation across the whole workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceReport {
    /// Operation name (`start`, `rebase`, ...).
    pub operation: String,
    /// Per-repository rows, in manifest order.
    pub repos: Vec<RepoReport>,
    /// Advisory cross-repository topic view. Divergence never blocks an
    /// operation; it is reported alongside the outcomes.
    pub topics: TopicSummary,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

impl WorkspaceReport {
    /// `true` only when every repository succeeded or was cleanly skipped.
    pub fn overall_success(&self) -> bool {
        self.repos.iter().all(|r| r.outcome.is_ok())
    }

    /// Process exit status: 0 for success-or-skip everywhere, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.overall_success() {
            0
        } else {
            1
        }
    }

    /// Names of repositories that ended in conflict or failure.
    pub fn failed_repos(&self) -> Vec<&str> {
        self.repos
            .iter()
            .filter(|r| !r.outcome.is_ok())
            .map(|r| r.repo.as_str())
            .collect()
    }
}
