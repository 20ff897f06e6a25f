//! In-memory fake of the execution collaborator (testing only).
//!
//! [`MemoryVcs`] models a fleet of repositories as linear commit graphs with
//! branches, a detachable HEAD, one remote, a stash, and scripted conflict
//! behaviour. It satisfies the [`VcsBackend`] contract without spawning any
//! external process, so planner and orchestrator logic can be tested
//! hermetically.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{ApplyStatus, VcsBackend};
use crate::error::{RepoError, Result};

#[derive(Debug, Clone)]
struct FakeCommit {
    parent: Option<String>,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Head {
    Branch(String),
    Detached(String),
}

/// A recorded `push` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPush {
    pub remote: String,
    pub refspec: String,
    pub options: Vec<String>,
}

#[derive(Debug, Default)]
struct RepoModel {
    commits: HashMap<String, FakeCommit>,
    branches: HashMap<String, String>,
    head: Option<Head>,
    remote: Option<String>,
    /// Tip the remote's HEAD currently points at (what `fetch HEAD` returns).
    remote_head: Option<String>,
    /// Scripted change refs: refspec -> sha.
    fetch_refs: HashMap<String, String>,
    fetch_head: Option<String>,
    stash: Vec<String>,
    conflict_on: HashSet<String>,
    pop_conflict: bool,
    command_exit: i32,
    commands_run: Vec<String>,
    pushes: Vec<RecordedPush>,
    pick_counter: u32,
}

impl RepoModel {
    fn head_sha(&self) -> Result<String> {
        match &self.head {
            Some(Head::Branch(b)) => self
                .branches
                .get(b)
                .cloned()
                .ok_or_else(|| RepoError::execution(format!("dangling head branch {b}"))),
            Some(Head::Detached(sha)) => Ok(sha.clone()),
            None => Err(RepoError::execution("repository has no HEAD")),
        }
    }

    fn resolve(&self, reference: &str) -> Result<String> {
        if reference == "HEAD" {
            return self.head_sha();
        }
        if reference == "FETCH_HEAD" {
            return self.fetch_head.clone().ok_or(RepoError::RefNotFound {
                reference: reference.to_string(),
            });
        }
        if let Some(remote) = &self.remote {
            if reference == format!("{remote}/HEAD") {
                return self.remote_head.clone().ok_or(RepoError::RefNotFound {
                    reference: reference.to_string(),
                });
            }
        }
        if let Some(tip) = self.branches.get(reference) {
            return Ok(tip.clone());
        }
        if self.commits.contains_key(reference) {
            return Ok(reference.to_string());
        }
        Err(RepoError::RefNotFound {
            reference: reference.to_string(),
        })
    }

    /// Ancestors of `sha` including itself, newest first.
    fn ancestry(&self, sha: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = Some(sha.to_string());
        while let Some(sha) = cursor {
            cursor = self.commits.get(&sha).and_then(|c| c.parent.clone());
            out.push(sha);
        }
        out
    }

    fn advance_head(&mut self, new_sha: String) {
        match self.head.clone() {
            Some(Head::Branch(b)) => {
                self.branches.insert(b, new_sha);
            }
            _ => self.head = Some(Head::Detached(new_sha)),
        }
    }
}

/// In-memory multi-repository [`VcsBackend`] keyed by working directory.
#[derive(Debug, Default)]
pub struct MemoryVcs {
    repos: Mutex<HashMap<PathBuf, RepoModel>>,
}

impl MemoryVcs {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_repo<T>(&self, dir: &Path, f: impl FnOnce(&mut RepoModel) -> Result<T>) -> Result<T> {
        let mut repos = self.repos.lock().unwrap();
        let model = repos
            .get_mut(dir)
            .ok_or_else(|| RepoError::execution(format!("not a repository: {}", dir.display())))?;
        f(model)
    }

    /// Create a repository with a `root` commit on `branch`, one remote named
    /// `origin` whose HEAD also sits at `root`.
    pub fn add_repo(&self, dir: &Path, branch: &str) {
        let mut model = RepoModel {
            remote: Some("origin".to_string()),
            remote_head: Some("root".to_string()),
            ..Default::default()
        };
        model.commits.insert(
            "root".to_string(),
            FakeCommit {
                parent: None,
                message: "initial".to_string(),
            },
        );
        model.branches.insert(branch.to_string(), "root".to_string());
        model.head = Some(Head::Branch(branch.to_string()));
        self.repos.lock().unwrap().insert(dir.to_path_buf(), model);
    }

    /// Insert a commit with an explicit parent without touching any branch.
    pub fn add_commit_raw(&self, dir: &Path, sha: &str, parent: Option<&str>, message: &str) {
        self.with_repo(dir, |m| {
            m.commits.insert(
                sha.to_string(),
                FakeCommit {
                    parent: parent.map(str::to_string),
                    message: message.to_string(),
                },
            );
            Ok(())
        })
        .unwrap();
    }

    /// Append a commit on the current HEAD.
    pub fn commit(&self, dir: &Path, sha: &str, message: &str) {
        self.with_repo(dir, |m| {
            let parent = m.head_sha()?;
            m.commits.insert(
                sha.to_string(),
                FakeCommit {
                    parent: Some(parent),
                    message: message.to_string(),
                },
            );
            m.advance_head(sha.to_string());
            Ok(())
        })
        .unwrap();
    }

    /// Point `branch` at `sha`, creating it if needed.
    pub fn set_branch(&self, dir: &Path, branch: &str, sha: &str) {
        self.with_repo(dir, |m| {
            m.branches.insert(branch.to_string(), sha.to_string());
            Ok(())
        })
        .unwrap();
    }

    /// Append a commit to the remote's history and move the remote HEAD.
    pub fn add_remote_commit(&self, dir: &Path, sha: &str, message: &str) {
        self.with_repo(dir, |m| {
            let parent = m.remote_head.clone();
            m.commits.insert(
                sha.to_string(),
                FakeCommit {
                    parent,
                    message: message.to_string(),
                },
            );
            m.remote_head = Some(sha.to_string());
            Ok(())
        })
        .unwrap();
    }

    /// Script a fetchable change ref (e.g. `refs/changes/42/1142/3`).
    pub fn set_fetch_ref(&self, dir: &Path, refspec: &str, sha: &str) {
        self.with_repo(dir, |m| {
            m.fetch_refs.insert(refspec.to_string(), sha.to_string());
            Ok(())
        })
        .unwrap();
    }

    /// Make `cherry_pick` of `sha` stop on a conflict.
    pub fn set_conflict_on(&self, dir: &Path, sha: &str) {
        self.with_repo(dir, |m| {
            m.conflict_on.insert(sha.to_string());
            Ok(())
        })
        .unwrap();
    }

    /// Make the next `stash_pop` conflict (preserving the entry).
    pub fn set_pop_conflict(&self, dir: &Path, conflict: bool) {
        self.with_repo(dir, |m| {
            m.pop_conflict = conflict;
            Ok(())
        })
        .unwrap();
    }

    /// Exit status `run_command` reports for this repository.
    pub fn set_command_exit(&self, dir: &Path, exit: i32) {
        self.with_repo(dir, |m| {
            m.command_exit = exit;
            Ok(())
        })
        .unwrap();
    }

    pub fn recorded_pushes(&self, dir: &Path) -> Vec<RecordedPush> {
        self.with_repo(dir, |m| Ok(m.pushes.clone())).unwrap()
    }

    pub fn commands_run(&self, dir: &Path) -> Vec<String> {
        self.with_repo(dir, |m| Ok(m.commands_run.clone())).unwrap()
    }

    pub fn tip_of(&self, dir: &Path, branch: &str) -> Option<String> {
        self.with_repo(dir, |m| Ok(m.branches.get(branch).cloned()))
            .unwrap()
    }

    pub fn branch_exists(&self, dir: &Path, branch: &str) -> bool {
        self.tip_of(dir, branch).is_some()
    }

    pub fn head_message_chain(&self, dir: &Path) -> Vec<String> {
        self.with_repo(dir, |m| {
            let head = m.head_sha()?;
            Ok(m.ancestry(&head)
                .into_iter()
                .rev()
                .map(|sha| m.commits[&sha].message.clone())
                .collect())
        })
        .unwrap()
    }
}

#[async_trait]
impl VcsBackend for MemoryVcs {
    async fn is_repository(&self, dir: &Path) -> bool {
        self.repos.lock().unwrap().contains_key(dir)
    }

    async fn resolve_ref(&self, dir: &Path, reference: &str) -> Result<String> {
        self.with_repo(dir, |m| m.resolve(reference))
    }

    async fn current_branch(&self, dir: &Path) -> Result<Option<String>> {
        self.with_repo(dir, |m| {
            Ok(match &m.head {
                Some(Head::Branch(b)) => Some(b.clone()),
                _ => None,
            })
        })
    }

    async fn commit_range(&self, dir: &Path, source: &str, target: &str) -> Result<Vec<String>> {
        self.with_repo(dir, |m| {
            let source_tip = m.resolve(source)?;
            let target_tip = m.resolve(target)?;
            let excluded: HashSet<String> = m.ancestry(&target_tip).into_iter().collect();
            let mut shas: Vec<String> = m
                .ancestry(&source_tip)
                .into_iter()
                .filter(|sha| !excluded.contains(sha))
                .collect();
            shas.reverse();
            Ok(shas)
        })
    }

    async fn commit_message(&self, dir: &Path, sha: &str) -> Result<String> {
        self.with_repo(dir, |m| {
            m.commits
                .get(sha)
                .map(|c| c.message.clone())
                .ok_or_else(|| RepoError::RefNotFound {
                    reference: sha.to_string(),
                })
        })
    }

    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        self.with_repo(dir, |m| {
            if !m.branches.contains_key(branch) {
                return Err(RepoError::RefNotFound {
                    reference: branch.to_string(),
                });
            }
            m.head = Some(Head::Branch(branch.to_string()));
            Ok(())
        })
    }

    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        self.with_repo(dir, |m| {
            if m.branches.contains_key(branch) {
                return Err(RepoError::execution(format!(
                    "branch '{branch}' already exists"
                )));
            }
            let tip = m.head_sha()?;
            m.branches.insert(branch.to_string(), tip);
            m.head = Some(Head::Branch(branch.to_string()));
            Ok(())
        })
    }

    async fn delete_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        self.with_repo(dir, |m| {
            if m.head == Some(Head::Branch(branch.to_string())) {
                return Err(RepoError::BranchInUse {
                    branch: branch.to_string(),
                });
            }
            m.branches
                .remove(branch)
                .ok_or_else(|| RepoError::RefNotFound {
                    reference: branch.to_string(),
                })?;
            Ok(())
        })
    }

    async fn rename_branch(&self, dir: &Path, new_name: &str) -> Result<()> {
        self.with_repo(dir, |m| {
            let Some(Head::Branch(old)) = m.head.clone() else {
                return Err(RepoError::DetachedHead);
            };
            let tip = m.branches.remove(&old).expect("head branch has a tip");
            m.branches.insert(new_name.to_string(), tip);
            m.head = Some(Head::Branch(new_name.to_string()));
            Ok(())
        })
    }

    async fn detached_checkout(&self, dir: &Path, reference: &str) -> Result<()> {
        self.with_repo(dir, |m| {
            let sha = m.resolve(reference)?;
            m.head = Some(Head::Detached(sha));
            Ok(())
        })
    }

    async fn reset_branch(
        &self,
        dir: &Path,
        branch: &str,
        start_point: Option<&str>,
    ) -> Result<()> {
        self.with_repo(dir, |m| {
            let tip = match start_point {
                Some(start) => m.resolve(start)?,
                None => m.head_sha()?,
            };
            m.branches.insert(branch.to_string(), tip);
            m.head = Some(Head::Branch(branch.to_string()));
            Ok(())
        })
    }

    async fn cherry_pick(&self, dir: &Path, sha: &str) -> Result<ApplyStatus> {
        self.with_repo(dir, |m| {
            if m.conflict_on.contains(sha) {
                return Ok(ApplyStatus::Conflict);
            }
            let picked = m
                .commits
                .get(sha)
                .cloned()
                .ok_or_else(|| RepoError::RefNotFound {
                    reference: sha.to_string(),
                })?;
            m.pick_counter += 1;
            let new_sha = format!("{sha}-pick{}", m.pick_counter);
            let parent = m.head_sha()?;
            m.commits.insert(
                new_sha.clone(),
                FakeCommit {
                    parent: Some(parent),
                    message: picked.message,
                },
            );
            m.advance_head(new_sha);
            Ok(ApplyStatus::Clean)
        })
    }

    async fn push(
        &self,
        dir: &Path,
        remote: &str,
        refspec: &str,
        options: &[String],
    ) -> Result<()> {
        self.with_repo(dir, |m| {
            m.pushes.push(RecordedPush {
                remote: remote.to_string(),
                refspec: refspec.to_string(),
                options: options.to_vec(),
            });
            Ok(())
        })
    }

    async fn fetch(&self, dir: &Path, remote: &str, refspec: &str) -> Result<String> {
        self.with_repo(dir, |m| {
            if m.remote.as_deref() != Some(remote) {
                return Err(RepoError::execution(format!("unknown remote {remote}")));
            }
            let sha = if refspec == "HEAD" {
                m.remote_head.clone()
            } else {
                m.fetch_refs.get(refspec).cloned()
            }
            .ok_or_else(|| RepoError::execution(format!("cannot fetch {refspec}")))?;
            m.fetch_head = Some(sha.clone());
            Ok(sha)
        })
    }

    async fn first_remote(&self, dir: &Path) -> Result<String> {
        self.with_repo(dir, |m| {
            m.remote
                .clone()
                .ok_or_else(|| RepoError::execution("no remotes configured"))
        })
    }

    async fn clone_repo(&self, _url: &str, dir: &Path) -> Result<()> {
        self.add_repo(dir, "master");
        Ok(())
    }

    async fn stash_save(&self, dir: &Path) -> Result<()> {
        self.with_repo(dir, |m| {
            let entry = format!("stash@{{{}}}: WIP", m.stash.len());
            m.stash.insert(0, entry);
            Ok(())
        })
    }

    async fn stash_list(&self, dir: &Path) -> Result<Vec<String>> {
        self.with_repo(dir, |m| Ok(m.stash.clone()))
    }

    async fn stash_pop(&self, dir: &Path) -> Result<ApplyStatus> {
        self.with_repo(dir, |m| {
            if m.stash.is_empty() {
                return Err(RepoError::execution("no stash entries"));
            }
            if m.pop_conflict {
                return Ok(ApplyStatus::Conflict);
            }
            m.stash.remove(0);
            Ok(ApplyStatus::Clean)
        })
    }

    async fn ahead_behind(
        &self,
        dir: &Path,
        local: &str,
        upstream: &str,
    ) -> Result<(usize, usize)> {
        self.with_repo(dir, |m| {
            let local_tip = m.resolve(local)?;
            let upstream_tip = m.resolve(upstream)?;
            let local_set: HashSet<String> = m.ancestry(&local_tip).into_iter().collect();
            let upstream_set: HashSet<String> = m.ancestry(&upstream_tip).into_iter().collect();
            let ahead = local_set.difference(&upstream_set).count();
            let behind = upstream_set.difference(&local_set).count();
            Ok((ahead, behind))
        })
    }

    async fn run_command(&self, dir: &Path, command: &str) -> Result<i32> {
        self.with_repo(dir, |m| {
            m.commands_run.push(command.to_string());
            Ok(m.command_exit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dir(name: &str) -> PathBuf {
        PathBuf::from(format!("/fake/{name}"))
    }

    #[tokio::test]
    async fn test_commit_range_excludes_shared_ancestry() {
        let vcs = MemoryVcs::new();
        let d = dir("a");
        vcs.add_repo(&d, "master");
        vcs.commit(&d, "m1", "on master");
        vcs.create_branch(&d, "topic").await.unwrap();
        vcs.commit(&d, "t1", "on topic");
        vcs.commit(&d, "t2", "also on topic");

        let range = vcs.commit_range(&d, "topic", "master").await.unwrap();
        assert_eq!(range, vec!["t1".to_string(), "t2".to_string()]);
        assert!(vcs.commit_range(&d, "master", "topic").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_checked_out_branch_is_in_use() {
        let vcs = MemoryVcs::new();
        let d = dir("b");
        vcs.add_repo(&d, "master");
        let err = vcs.delete_branch(&d, "master").await;
        assert!(matches!(err, Err(RepoError::BranchInUse { .. })));
    }

    #[tokio::test]
    async fn test_cherry_pick_advances_branch_with_new_sha() {
        let vcs = MemoryVcs::new();
        let d = dir("c");
        vcs.add_repo(&d, "master");
        vcs.add_commit_raw(&d, "x1", Some("root"), "side change");
        vcs.cherry_pick(&d, "x1").await.unwrap();
        let tip = vcs.tip_of(&d, "master").unwrap();
        assert_ne!(tip, "x1");
        assert_eq!(
            vcs.commit_message(&d, &tip).await.unwrap(),
            "side change"
        );
    }

    #[tokio::test]
    async fn test_ahead_behind_symmetry() {
        let vcs = MemoryVcs::new();
        let d = dir("d");
        vcs.add_repo(&d, "master");
        vcs.commit(&d, "m1", "local work");
        vcs.add_remote_commit(&d, "r1", "remote work");
        let (ahead, behind) = vcs.ahead_behind(&d, "HEAD", "origin/HEAD").await.unwrap();
        assert_eq!((ahead, behind), (1, 1));
    }
}
