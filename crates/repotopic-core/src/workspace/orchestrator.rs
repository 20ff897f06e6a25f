//! Topic orchestration across the whole workspace.
//!
//! [`TopicOrchestrator`] applies one [`TopicOp`] to every repository and
//! folds the per-repository outcomes into a single [`WorkspaceReport`].
//! Repositories are independent working directories, so the fan-out runs
//! them concurrently through a bounded worker pool; one repository's failure
//! never aborts the others. An explicit fail-fast mode runs serially instead
//! and marks the remainder skipped after the first conflict or error.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::backend::{ApplyStatus, VcsBackend};
use crate::error::{RepoError, Result};
use crate::planner;
use crate::reader;
use crate::repo::{self, RepoHandle, TopicState};
use crate::workspace::op::TopicOp;
use crate::workspace::outcome::{RepoOutcome, RepoReport, TopicSummary, WorkspaceReport};

/// Tuning knobs for a workspace invocation.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on repositories operated on at once.
    pub max_concurrent: usize,
    /// Run serially and stop dispatching after the first conflict or error;
    /// remaining repositories are reported skipped. Opt-in.
    pub fail_fast: bool,
    /// Branch reviews are pushed for (`HEAD:refs/for/<review_branch>`).
    pub review_branch: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            fail_fast: false,
            review_branch: "master".to_string(),
        }
    }
}

/// Applies one operation uniformly to every repository and aggregates the
/// outcomes.
pub struct TopicOrchestrator {
    backend: Arc<dyn VcsBackend>,
    config: OrchestratorConfig,
}

impl TopicOrchestrator {
    pub fn new(backend: Arc<dyn VcsBackend>) -> Self {
        Self::with_config(backend, OrchestratorConfig::default())
    }

    pub fn with_config(backend: Arc<dyn VcsBackend>, config: OrchestratorConfig) -> Self {
        Self { backend, config }
    }

    /// Apply `op` to every repository and produce the consolidated report.
    ///
    /// The topic-consistency view is recomputed from the on-disk clones after
    /// the per-repository work; divergence is advisory and never blocks the
    /// operation.
    pub async fn run(&self, repos: &[RepoHandle], op: &TopicOp) -> WorkspaceReport {
        info!(op = op.name(), repos = repos.len(), "applying operation");

        let outcomes = if self.config.fail_fast {
            self.run_serial(repos, op).await
        } else {
            self.run_parallel(repos, op).await
        };

        let mut observations: Vec<(String, TopicState)> = Vec::new();
        let mut rows = Vec::with_capacity(repos.len());
        for (repo, outcome) in repos.iter().zip(outcomes) {
            let topic = match repo::inspect(self.backend.as_ref(), repo).await {
                Ok(status) => {
                    observations.push((repo.name.clone(), status.topic.clone()));
                    Some(status.topic)
                }
                Err(e) => {
                    debug!(repo = %repo.name, error = %e, "uninspectable, left out of topic view");
                    None
                }
            };
            rows.push(RepoReport {
                repo: repo.name.clone(),
                topic,
                outcome,
            });
        }

        let topics = TopicSummary::from_observations(&observations);
        if !topics.consistent && !topics.divergent.is_empty() {
            warn!(
                divergent = ?topics.divergent,
                majority = ?topics.majority,
                "repositories are not all on the same topic"
            );
        }

        WorkspaceReport {
            operation: op.name().to_string(),
            repos: rows,
            topics,
            generated_at: Utc::now(),
        }
    }

    async fn run_parallel(&self, repos: &[RepoHandle], op: &TopicOp) -> Vec<RepoOutcome> {
        let sem = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut join_set = JoinSet::new();

        for (idx, repo) in repos.iter().cloned().enumerate() {
            let backend = Arc::clone(&self.backend);
            let op = op.clone();
            let config = self.config.clone();
            let sem = Arc::clone(&sem);
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let outcome = apply_op(backend.as_ref(), &repo, &op, &config).await;
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<RepoOutcome>> = vec![None; repos.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "repository worker did not complete"),
            }
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or(RepoOutcome::Failed {
                    error: "worker task did not complete".to_string(),
                })
            })
            .collect()
    }

    async fn run_serial(&self, repos: &[RepoHandle], op: &TopicOp) -> Vec<RepoOutcome> {
        let mut outcomes = Vec::with_capacity(repos.len());
        let mut aborted_by: Option<String> = None;

        for repo in repos {
            if let Some(first_failed) = &aborted_by {
                outcomes.push(RepoOutcome::skipped(format!(
                    "aborted after failure in {first_failed}"
                )));
                continue;
            }
            let outcome = apply_op(self.backend.as_ref(), repo, op, &self.config).await;
            if !outcome.is_ok() {
                aborted_by = Some(repo.name.clone());
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// Run one operation in one repository, folding every repository-local error
/// into that repository's outcome.
#[instrument(skip_all, fields(repo = %repo.name, op = op.name()))]
async fn apply_op(
    backend: &dyn VcsBackend,
    repo: &RepoHandle,
    op: &TopicOp,
    config: &OrchestratorConfig,
) -> RepoOutcome {
    let result = match op {
        TopicOp::Start { topic } => op_start(backend, repo, topic).await,
        TopicOp::End { topic } => op_end(backend, repo, topic).await,
        TopicOp::Switch { topic } => op_switch(backend, repo, topic).await,
        TopicOp::Rename { topic } => op_rename(backend, repo, topic).await,
        TopicOp::Rebase { topic } => op_rebase(backend, repo, topic).await,
        TopicOp::Sync { detach } => op_sync(backend, repo, *detach).await,
        TopicOp::Download {
            change,
            detach,
            repo: only,
        } => op_download(backend, repo, change, *detach, only.as_deref()).await,
        TopicOp::Push => op_push(backend, repo, config).await,
        TopicOp::Pull => op_pull(backend, repo).await,
        TopicOp::Stash => op_stash(backend, repo).await,
        TopicOp::Pop => op_pop(backend, repo).await,
        TopicOp::Topic => op_topic(backend, repo).await,
        TopicOp::Forall { command } => op_forall(backend, repo, command).await,
    };

    match result {
        Ok(outcome) => {
            debug!(?outcome, "repository done");
            outcome
        }
        Err(e) => {
            warn!(error = %e, "repository operation failed");
            RepoOutcome::from_error(e)
        }
    }
}

async fn op_start(backend: &dyn VcsBackend, repo: &RepoHandle, topic: &str) -> Result<RepoOutcome> {
    match backend.resolve_ref(&repo.dir, topic).await {
        Ok(_) => Ok(RepoOutcome::Failed {
            error: format!("branch '{topic}' already exists"),
        }),
        Err(RepoError::RefNotFound { .. }) => {
            backend.create_branch(&repo.dir, topic).await?;
            info!(topic, "topic created");
            Ok(RepoOutcome::Success)
        }
        Err(e) => Err(e),
    }
}

async fn op_end(backend: &dyn VcsBackend, repo: &RepoHandle, topic: &str) -> Result<RepoOutcome> {
    // Ending a topic requires the branch to exist; a missing branch is a
    // failure here, unlike switch.
    backend.resolve_ref(&repo.dir, topic).await?;
    if backend.current_branch(&repo.dir).await?.as_deref() == Some(topic) {
        return Err(RepoError::BranchInUse {
            branch: topic.to_string(),
        });
    }
    backend.delete_branch(&repo.dir, topic).await?;
    Ok(RepoOutcome::Success)
}

async fn op_switch(
    backend: &dyn VcsBackend,
    repo: &RepoHandle,
    topic: &str,
) -> Result<RepoOutcome> {
    // A topic need not exist in every repository; absence is expected.
    match backend.resolve_ref(&repo.dir, topic).await {
        Ok(_) => {
            backend.checkout(&repo.dir, topic).await?;
            Ok(RepoOutcome::Success)
        }
        Err(RepoError::RefNotFound { .. }) => {
            Ok(RepoOutcome::skipped(format!("no branch '{topic}' here")))
        }
        Err(e) => Err(e),
    }
}

async fn op_rename(
    backend: &dyn VcsBackend,
    repo: &RepoHandle,
    new_name: &str,
) -> Result<RepoOutcome> {
    let Some(old) = backend.current_branch(&repo.dir).await? else {
        return Err(RepoError::DetachedHead);
    };
    backend.rename_branch(&repo.dir, new_name).await?;
    info!(from = %old, to = %new_name, "topic renamed");
    Ok(RepoOutcome::Success)
}

async fn op_rebase(
    backend: &dyn VcsBackend,
    repo: &RepoHandle,
    topic: &str,
) -> Result<RepoOutcome> {
    backend.resolve_ref(&repo.dir, topic).await?;
    rebase_onto(backend, repo, topic).await
}

async fn op_sync(backend: &dyn VcsBackend, repo: &RepoHandle, detach: bool) -> Result<RepoOutcome> {
    if !backend.is_repository(&repo.dir).await {
        info!(url = %repo.url, "cloning");
        backend.clone_repo(&repo.url, &repo.dir).await?;
        // A fresh clone carries the remote's default branch; the workspace
        // convention is that only topics are branches, so detach and drop it.
        if let Some(branch) = backend.current_branch(&repo.dir).await? {
            backend.detached_checkout(&repo.dir, "HEAD").await?;
            backend.delete_branch(&repo.dir, &branch).await?;
        }
        return Ok(RepoOutcome::Success);
    }

    let remote = backend.first_remote(&repo.dir).await?;
    backend.fetch(&repo.dir, &remote, "HEAD").await?;
    if detach {
        backend.detached_checkout(&repo.dir, "FETCH_HEAD").await?;
        return Ok(RepoOutcome::Success);
    }
    rebase_onto(backend, repo, "FETCH_HEAD").await
}

async fn op_download(
    backend: &dyn VcsBackend,
    repo: &RepoHandle,
    change: &str,
    detach: bool,
    only: Option<&str>,
) -> Result<RepoOutcome> {
    if let Some(only) = only {
        if only != repo.name {
            return Ok(RepoOutcome::skipped("not the requested repository"));
        }
    }
    let refspec = change_refspec(change)?;
    let remote = backend.first_remote(&repo.dir).await?;
    backend.fetch(&repo.dir, &remote, &refspec).await?;
    if detach {
        backend.detached_checkout(&repo.dir, "FETCH_HEAD").await?;
        return Ok(RepoOutcome::Success);
    }
    rebase_onto(backend, repo, "FETCH_HEAD").await
}

async fn op_push(
    backend: &dyn VcsBackend,
    repo: &RepoHandle,
    config: &OrchestratorConfig,
) -> Result<RepoOutcome> {
    let status = repo::inspect(backend, repo).await?;
    let Some(branch) = status.topic.branch() else {
        return Ok(RepoOutcome::skipped("detached HEAD, nothing to push"));
    };
    if status.upstream.is_none() {
        return Ok(RepoOutcome::skipped("no remote counterpart"));
    }
    if status.ahead == 0 {
        return Ok(RepoOutcome::skipped("nothing to push"));
    }
    if status.behind > 0 {
        return Err(RepoError::Diverged {
            ahead: status.ahead,
            behind: status.behind,
        });
    }

    let remote = backend.first_remote(&repo.dir).await?;
    let refspec = format!("HEAD:refs/for/{}", config.review_branch);
    let options = vec![format!("topic={branch}")];
    backend.push(&repo.dir, &remote, &refspec, &options).await?;
    info!(%branch, "pushed for review");
    Ok(RepoOutcome::Success)
}

async fn op_pull(backend: &dyn VcsBackend, repo: &RepoHandle) -> Result<RepoOutcome> {
    let status = repo::inspect(backend, repo).await?;
    let Some(branch) = status.topic.branch().map(str::to_string) else {
        return Ok(RepoOutcome::skipped("detached HEAD, nothing to pull"));
    };
    if status.upstream.is_none() {
        return Ok(RepoOutcome::skipped("no remote counterpart"));
    }
    if status.behind == 0 {
        return Ok(RepoOutcome::skipped("nothing to pull"));
    }
    if status.ahead > 0 {
        return Err(RepoError::Diverged {
            ahead: status.ahead,
            behind: status.behind,
        });
    }

    let remote = backend.first_remote(&repo.dir).await?;
    backend.fetch(&repo.dir, &remote, "HEAD").await?;
    backend
        .reset_branch(&repo.dir, &branch, Some("FETCH_HEAD"))
        .await?;
    Ok(RepoOutcome::Success)
}

async fn op_stash(backend: &dyn VcsBackend, repo: &RepoHandle) -> Result<RepoOutcome> {
    backend.stash_save(&repo.dir).await?;
    Ok(RepoOutcome::Success)
}

async fn op_pop(backend: &dyn VcsBackend, repo: &RepoHandle) -> Result<RepoOutcome> {
    if backend.stash_list(&repo.dir).await?.is_empty() {
        return Ok(RepoOutcome::skipped("no stashed content"));
    }
    match backend.stash_pop(&repo.dir).await? {
        ApplyStatus::Clean => Ok(RepoOutcome::Success),
        ApplyStatus::Conflict => Ok(RepoOutcome::Conflict {
            detail: "stash pop conflicted; entry preserved".to_string(),
        }),
    }
}

async fn op_topic(backend: &dyn VcsBackend, repo: &RepoHandle) -> Result<RepoOutcome> {
    // Read-only; the aggregated consistency pass does the reporting.
    repo::inspect(backend, repo).await?;
    Ok(RepoOutcome::Success)
}

async fn op_forall(
    backend: &dyn VcsBackend,
    repo: &RepoHandle,
    command: &str,
) -> Result<RepoOutcome> {
    let code = backend.run_command(&repo.dir, command).await?;
    if code == 0 {
        Ok(RepoOutcome::Success)
    } else {
        Ok(RepoOutcome::Failed {
            error: format!("command exited with status {code}"),
        })
    }
}

/// Replay the current branch's unique commits onto `target`.
///
/// The planner decides what to replay by Change-Id equivalence; every commit
/// it recognises as already landed is logged, never silently discarded. A
/// conflict leaves the repository mid-rebase for manual resolution.
async fn rebase_onto(
    backend: &dyn VcsBackend,
    repo: &RepoHandle,
    target: &str,
) -> Result<RepoOutcome> {
    let (branch, temporary) = match backend.current_branch(&repo.dir).await? {
        Some(branch) => (branch, false),
        None => {
            // Detached HEAD: pin the current position under a throwaway name
            // so ranges can be computed against it.
            let tmp = format!("tmp-{}", Uuid::new_v4().simple());
            backend.create_branch(&repo.dir, &tmp).await?;
            (tmp, true)
        }
    };

    let source = reader::commit_range(backend, &repo.dir, &branch, target).await?;
    let landed = reader::commit_range(backend, &repo.dir, target, &branch).await?;
    let plan = planner::plan(&source, &landed, target);

    for dropped in &plan.dropped {
        info!(
            sha = dropped.short_sha(),
            subject = dropped.subject(),
            "already on target, not replayed"
        );
    }

    backend.detached_checkout(&repo.dir, target).await?;
    for pick in &plan.picks {
        match backend.cherry_pick(&repo.dir, &pick.sha).await? {
            ApplyStatus::Clean => {}
            ApplyStatus::Conflict => {
                return Ok(RepoOutcome::Conflict {
                    detail: format!(
                        "conflict while applying {} ({}); resolve manually",
                        pick.short_sha(),
                        pick.subject()
                    ),
                });
            }
        }
    }

    if temporary {
        backend.delete_branch(&repo.dir, &branch).await?;
    } else {
        backend.reset_branch(&repo.dir, &branch, None).await?;
    }
    Ok(RepoOutcome::Success)
}

/// Gerrit-style change ref: `<number>/<patchset>` fetched from
/// `refs/changes/<last two digits>/<number>/<patchset>`.
fn change_refspec(change: &str) -> Result<String> {
    let (number, patchset) = change.split_once('/').ok_or(RepoError::InvalidChangeRef {
        spec: change.to_string(),
    })?;
    let number: u64 = number.parse().map_err(|_| RepoError::InvalidChangeRef {
        spec: change.to_string(),
    })?;
    if patchset.is_empty() || !patchset.chars().all(|c| c.is_ascii_digit()) {
        return Err(RepoError::InvalidChangeRef {
            spec: change.to_string(),
        });
    }
    Ok(format!("refs/changes/{:02}/{number}/{patchset}", number % 100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_refspec_shards_by_last_two_digits() {
        assert_eq!(
            change_refspec("1142/3").unwrap(),
            "refs/changes/42/1142/3"
        );
        assert_eq!(change_refspec("7/1").unwrap(), "refs/changes/07/7/1");
    }

    #[test]
    fn test_change_refspec_rejects_malformed_ids() {
        assert!(change_refspec("1142").is_err());
        assert!(change_refspec("abc/1").is_err());
        assert!(change_refspec("1142/").is_err());
        assert!(change_refspec("1142/x").is_err());
    }

    #[test]
    fn test_default_config_bounds_concurrency() {
        let config = OrchestratorConfig::default();
        assert!(config.max_concurrent >= 1);
        assert!(!config.fail_fast);
        assert_eq!(config.review_branch, "master");
    }
}
