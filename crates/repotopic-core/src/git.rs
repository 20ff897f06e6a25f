//! Git CLI implementation of [`VcsBackend`].
//!
//! Shells out to the `git` binary with `tokio::process::Command`, one process
//! per call, in the repository's working directory. Conflict-capable
//! operations (`cherry_pick`, `stash_pop`) distinguish a stopped application
//! from a genuine execution failure by inspecting the command output.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::backend::{ApplyStatus, VcsBackend};
use crate::error::{RepoError, Result};

/// [`VcsBackend`] backed by the system `git` binary.
#[derive(Debug, Default, Clone)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<std::process::Output> {
        debug!(?dir, ?args, "git");
        let mut cmd = Command::new("git");
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        let child = cmd
            .spawn()
            .map_err(|e| RepoError::execution(format!("failed to spawn git: {e}")))?;
        child
            .wait_with_output()
            .await
            .map_err(|e| RepoError::execution(format!("failed to run git: {e}")))
    }

    /// Run git and require success; returns trimmed stdout.
    async fn run_ok(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = self.run(Some(dir), args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepoError::execution(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Whether a failed apply-style command stopped on a merge conflict rather
/// than failing outright.
fn looks_like_conflict(output: &std::process::Output) -> bool {
    let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
    let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
    stdout.contains("conflict")
        || stderr.contains("conflict")
        || stderr.contains("could not apply")
}

#[async_trait]
impl VcsBackend for GitCli {
    async fn is_repository(&self, dir: &Path) -> bool {
        match self
            .run(Some(dir), &["rev-parse", "--is-inside-work-tree"])
            .await
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn resolve_ref(&self, dir: &Path, reference: &str) -> Result<String> {
        let probe = format!("{reference}^{{commit}}");
        let output = self
            .run(Some(dir), &["rev-parse", "--verify", "--quiet", &probe])
            .await?;
        if !output.status.success() {
            return Err(RepoError::RefNotFound {
                reference: reference.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn current_branch(&self, dir: &Path) -> Result<Option<String>> {
        let branch = self.run_ok(dir, &["branch", "--show-current"]).await?;
        Ok(if branch.is_empty() {
            None
        } else {
            Some(branch)
        })
    }

    async fn commit_range(&self, dir: &Path, source: &str, target: &str) -> Result<Vec<String>> {
        let range = format!("{target}..{source}");
        let out = self.run_ok(dir, &["rev-list", "--reverse", &range]).await?;
        Ok(out.lines().map(str::to_string).collect())
    }

    async fn commit_message(&self, dir: &Path, sha: &str) -> Result<String> {
        self.run_ok(dir, &["show", "-s", "--format=%B", sha]).await
    }

    async fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        self.run_ok(dir, &["checkout", branch]).await?;
        Ok(())
    }

    async fn create_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        self.run_ok(dir, &["checkout", "-b", branch]).await?;
        Ok(())
    }

    async fn delete_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        self.run_ok(dir, &["branch", "-D", branch]).await?;
        Ok(())
    }

    async fn rename_branch(&self, dir: &Path, new_name: &str) -> Result<()> {
        self.run_ok(dir, &["branch", "-m", new_name]).await?;
        Ok(())
    }

    async fn detached_checkout(&self, dir: &Path, reference: &str) -> Result<()> {
        self.run_ok(dir, &["checkout", "--detach", reference])
            .await?;
        Ok(())
    }

    async fn reset_branch(
        &self,
        dir: &Path,
        branch: &str,
        start_point: Option<&str>,
    ) -> Result<()> {
        match start_point {
            Some(start) => self.run_ok(dir, &["checkout", "-B", branch, start]).await?,
            None => self.run_ok(dir, &["checkout", "-B", branch]).await?,
        };
        Ok(())
    }

    async fn cherry_pick(&self, dir: &Path, sha: &str) -> Result<ApplyStatus> {
        let output = self.run(Some(dir), &["cherry-pick", sha]).await?;
        if output.status.success() {
            return Ok(ApplyStatus::Clean);
        }
        if looks_like_conflict(&output) {
            return Ok(ApplyStatus::Conflict);
        }
        Err(RepoError::execution(format!(
            "git cherry-pick {sha} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    async fn push(
        &self,
        dir: &Path,
        remote: &str,
        refspec: &str,
        options: &[String],
    ) -> Result<()> {
        let mut args = vec!["push", remote, refspec];
        for opt in options {
            args.push("-o");
            args.push(opt.as_str());
        }
        self.run_ok(dir, &args).await?;
        Ok(())
    }

    async fn fetch(&self, dir: &Path, remote: &str, refspec: &str) -> Result<String> {
        self.run_ok(dir, &["fetch", remote, refspec]).await?;
        self.run_ok(dir, &["rev-parse", "FETCH_HEAD"]).await
    }

    async fn first_remote(&self, dir: &Path) -> Result<String> {
        let out = self.run_ok(dir, &["remote"]).await?;
        out.lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| RepoError::execution("no remotes configured"))
    }

    async fn clone_repo(&self, url: &str, dir: &Path) -> Result<()> {
        let dir_str = dir
            .to_str()
            .ok_or_else(|| RepoError::execution("non-utf8 repository path"))?;
        let output = self.run(None, &["clone", url, dir_str]).await?;
        if !output.status.success() {
            return Err(RepoError::execution(format!(
                "git clone {url} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn stash_save(&self, dir: &Path) -> Result<()> {
        self.run_ok(dir, &["stash"]).await?;
        Ok(())
    }

    async fn stash_list(&self, dir: &Path) -> Result<Vec<String>> {
        let out = self.run_ok(dir, &["stash", "list"]).await?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn stash_pop(&self, dir: &Path) -> Result<ApplyStatus> {
        let output = self.run(Some(dir), &["stash", "pop"]).await?;
        if output.status.success() {
            return Ok(ApplyStatus::Clean);
        }
        if looks_like_conflict(&output) {
            return Ok(ApplyStatus::Conflict);
        }
        Err(RepoError::execution(format!(
            "git stash pop failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }

    async fn ahead_behind(
        &self,
        dir: &Path,
        local: &str,
        upstream: &str,
    ) -> Result<(usize, usize)> {
        let range = format!("{local}...{upstream}");
        let out = self
            .run_ok(dir, &["rev-list", "--left-right", "--count", &range])
            .await?;
        let mut parts = out.split_whitespace();
        let ahead = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RepoError::execution(format!("unparseable rev-list count: {out}")))?;
        let behind = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RepoError::execution(format!("unparseable rev-list count: {out}")))?;
        Ok((ahead, behind))
    }

    async fn run_command(&self, dir: &Path, command: &str) -> Result<i32> {
        let output = Command::new("sh")
            .args(["-c", command])
            .current_dir(dir)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| RepoError::execution(format!("failed to run '{command}': {e}")))?;
        Ok(output.status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn commit_file(repo_dir: &Path, name: &str, content: &str, message: &str) {
        std::fs::write(repo_dir.join(name), content).unwrap();
        run_git(repo_dir, &["add", "."]);
        run_git(repo_dir, &["commit", "-m", message]);
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-b", "master"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[tokio::test]
    async fn test_resolve_ref_returns_sha() {
        let repo = make_git_repo();
        let git = GitCli::new();
        let sha = git.resolve_ref(repo.path(), "HEAD").await.unwrap();
        assert_eq!(sha.len(), 40);
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_resolve_missing_ref_is_ref_not_found() {
        let repo = make_git_repo();
        let git = GitCli::new();
        let err = git.resolve_ref(repo.path(), "no-such-branch").await;
        assert!(matches!(err, Err(RepoError::RefNotFound { .. })));
    }

    #[tokio::test]
    async fn test_current_branch_and_detached() {
        let repo = make_git_repo();
        let git = GitCli::new();
        assert_eq!(
            git.current_branch(repo.path()).await.unwrap().as_deref(),
            Some("master")
        );
        git.detached_checkout(repo.path(), "HEAD").await.unwrap();
        assert_eq!(git.current_branch(repo.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_commit_range_is_oldest_first() {
        let repo = make_git_repo();
        let git = GitCli::new();
        git.create_branch(repo.path(), "topic").await.unwrap();
        commit_file(repo.path(), "a.txt", "a", "first on topic");
        commit_file(repo.path(), "b.txt", "b", "second on topic");

        let range = git
            .commit_range(repo.path(), "topic", "master")
            .await
            .unwrap();
        assert_eq!(range.len(), 2);
        let first_msg = git.commit_message(repo.path(), &range[0]).await.unwrap();
        assert!(first_msg.starts_with("first on topic"));
    }

    #[tokio::test]
    async fn test_empty_range_when_source_contained() {
        let repo = make_git_repo();
        let git = GitCli::new();
        let range = git
            .commit_range(repo.path(), "master", "master")
            .await
            .unwrap();
        assert!(range.is_empty());
    }

    #[tokio::test]
    async fn test_cherry_pick_clean_and_conflict() {
        let repo = make_git_repo();
        let git = GitCli::new();

        git.create_branch(repo.path(), "side").await.unwrap();
        commit_file(repo.path(), "shared.txt", "side version\n", "side change");
        let side_sha = git.resolve_ref(repo.path(), "side").await.unwrap();

        git.checkout(repo.path(), "master").await.unwrap();
        let status = git.cherry_pick(repo.path(), &side_sha).await.unwrap();
        assert_eq!(status, ApplyStatus::Clean);

        // Now make the same file diverge so a second pick conflicts.
        git.checkout(repo.path(), "side").await.unwrap();
        commit_file(repo.path(), "shared.txt", "side again\n", "side change 2");
        let side_sha2 = git.resolve_ref(repo.path(), "side").await.unwrap();

        git.checkout(repo.path(), "master").await.unwrap();
        commit_file(repo.path(), "shared.txt", "master version\n", "master change");
        let status = git.cherry_pick(repo.path(), &side_sha2).await.unwrap();
        assert_eq!(status, ApplyStatus::Conflict);
    }

    #[tokio::test]
    async fn test_stash_save_list_pop() {
        let repo = make_git_repo();
        let git = GitCli::new();
        commit_file(repo.path(), "f.txt", "clean\n", "add f");

        std::fs::write(repo.path().join("f.txt"), "dirty\n").unwrap();
        git.stash_save(repo.path()).await.unwrap();
        assert_eq!(git.stash_list(repo.path()).await.unwrap().len(), 1);

        let status = git.stash_pop(repo.path()).await.unwrap();
        assert_eq!(status, ApplyStatus::Clean);
        assert!(git.stash_list(repo.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ahead_behind_counts() {
        let repo = make_git_repo();
        let git = GitCli::new();
        git.create_branch(repo.path(), "topic").await.unwrap();
        commit_file(repo.path(), "t.txt", "t", "topic commit");
        let (ahead, behind) = git
            .ahead_behind(repo.path(), "topic", "master")
            .await
            .unwrap();
        assert_eq!((ahead, behind), (1, 0));
    }

    #[tokio::test]
    async fn test_run_command_passes_exit_status_through() {
        let repo = make_git_repo();
        let git = GitCli::new();
        assert_eq!(git.run_command(repo.path(), "true").await.unwrap(), 0);
        assert_eq!(git.run_command(repo.path(), "exit 3").await.unwrap(), 3);
    }
}
