//! The operations a workspace invocation can apply.

use serde::{Deserialize, Serialize};

/// One operation, applied uniformly to every repository in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicOp {
    /// Create branch `topic` at every repository's current tip.
    Start { topic: String },
    /// Delete branch `topic` everywhere it is not checked out.
    End { topic: String },
    /// Check out branch `topic` where it exists; elsewhere the repository is
    /// skipped.
    Switch { topic: String },
    /// Rename the current branch.
    Rename { topic: String },
    /// Rebase the current branch onto local branch `topic` using Change-Id
    /// equivalence.
    Rebase { topic: String },
    /// Fetch the remote HEAD and rebase onto it; with `detach`, check the
    /// fetched tip out directly instead.
    Sync { detach: bool },
    /// Fetch a review change and rebase onto (or detach at) it. With `repo`
    /// set, only the named repository participates.
    Download {
        change: String,
        detach: bool,
        repo: Option<String>,
    },
    /// Push the current branch for review where strictly ahead of the remote.
    Push,
    /// Fast-forward the current branch where strictly behind the remote.
    Pull,
    /// Stash the working tree everywhere.
    Stash,
    /// Pop the newest stash entry everywhere one exists.
    Pop,
    /// Report every repository's current topic.
    Topic,
    /// Run an arbitrary command in every repository directory.
    Forall { command: String },
}

impl TopicOp {
    /// Stable name used in reports and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            TopicOp::Start { .. } => "start",
            TopicOp::End { .. } => "end",
            TopicOp::Switch { .. } => "switch",
            TopicOp::Rename { .. } => "rename",
            TopicOp::Rebase { .. } => "rebase",
            TopicOp::Sync { .. } => "sync",
            TopicOp::Download { .. } => "download",
            TopicOp::Push => "push",
            TopicOp::Pull => "pull",
            TopicOp::Stash => "stash",
            TopicOp::Pop => "pop",
            TopicOp::Topic => "topic",
            TopicOp::Forall { .. } => "forall",
        }
    }

    /// Whether manifest entries without an on-disk clone should be kept for
    /// this operation (`sync` creates the clone itself).
    pub fn keeps_missing_clones(&self) -> bool {
        matches!(self, TopicOp::Sync { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_cli_subcommands() {
        assert_eq!(
            TopicOp::Start {
                topic: "t".to_string()
            }
            .name(),
            "start"
        );
        assert_eq!(TopicOp::Push.name(), "push");
        assert_eq!(
            TopicOp::Sync { detach: true }.name(),
            "sync"
        );
    }

    #[test]
    fn test_only_sync_keeps_missing_clones() {
        assert!(TopicOp::Sync { detach: false }.keeps_missing_clones());
        assert!(!TopicOp::Push.keeps_missing_clones());
        assert!(!TopicOp::Topic.keeps_missing_clones());
    }
}
