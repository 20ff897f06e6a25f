//! Rebase planning with Change-Id equivalence.
//!
//! A plain hash-based rebase re-applies logically-identical commits under new
//! hashes, producing spurious conflicts and duplicate history. The planner
//! instead filters the source range against the set of Change-Ids the target
//! has landed since the two histories diverged: a commit whose logical change
//! is already on the other side is dropped, everything else is replayed in
//! its original order. Planning is pure and offline; applying the plan (and
//! hitting conflicts) is the orchestrator's concern.

use serde::{Deserialize, Serialize};

use crate::commit::{Commit, CommitRange};

/// The computed replay sequence for one repository's rebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebasePlan {
    /// Ref the picks are replayed onto.
    pub onto: String,
    /// Commits to replay, oldest first. Strict subsequence of the source
    /// range.
    pub picks: Vec<Commit>,
    /// Source commits recognised as already landed on the target (matched by
    /// Change-Id). Kept so callers can report every skipped commit instead of
    /// dropping it silently.
    pub dropped: Vec<Commit>,
}

impl RebasePlan {
    /// A plan with nothing to replay: the source is already fully represented
    /// on the target. Success, not an error.
    pub fn is_noop(&self) -> bool {
        self.picks.is_empty()
    }
}

/// Compute which commits of `source` must be replayed onto `onto`, given the
/// `target` range (commits the target has that the source does not — the
/// landed set).
///
/// A source commit is dropped only when its Change-Id appears in the landed
/// set. Commits without a Change-Id are always retained; they can only be
/// matched by hash, and shared hashes are excluded from the ranges by
/// construction.
pub fn plan(source: &CommitRange, target: &CommitRange, onto: impl Into<String>) -> RebasePlan {
    let landed = target.change_ids();

    let mut picks = Vec::new();
    let mut dropped = Vec::new();
    for commit in source.iter() {
        let is_landed = commit
            .change_id
            .as_ref()
            .is_some_and(|id| landed.contains(id));
        if is_landed {
            dropped.push(commit.clone());
        } else {
            picks.push(commit.clone());
        }
    }

    RebasePlan {
        onto: onto.into(),
        picks,
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::Commit;

    fn commit(sha: &str, subject: &str, change_id: Option<&str>) -> Commit {
        let message = match change_id {
            Some(id) => format!("{subject}\n\nChange-Id: {id}\n"),
            None => subject.to_string(),
        };
        Commit::new(sha, message)
    }

    fn range(commits: Vec<Commit>) -> CommitRange {
        CommitRange::new(commits)
    }

    #[test]
    fn test_empty_target_retains_everything() {
        let source = range(vec![
            commit("a1", "one", Some("Ia")),
            commit("b2", "two", Some("Ib")),
        ]);
        let plan = plan(&source, &CommitRange::default(), "master");
        assert_eq!(plan.picks.len(), 2);
        assert!(plan.dropped.is_empty());
        assert_eq!(plan.picks[0].sha, "a1");
        assert_eq!(plan.picks[1].sha, "b2");
    }

    #[test]
    fn test_landed_change_id_is_dropped_order_preserved() {
        let source = range(vec![
            commit("a1", "one", Some("Ia")),
            commit("b2", "two", Some("Ib")),
            commit("c3", "three", Some("Ic")),
        ]);
        let target = range(vec![commit("b9", "two, amended", Some("Ib"))]);
        let plan = plan(&source, &target, "master");
        let shas: Vec<&str> = plan.picks.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["a1", "c3"]);
        assert_eq!(plan.dropped.len(), 1);
        assert_eq!(plan.dropped[0].sha, "b2");
    }

    #[test]
    fn test_fully_landed_source_is_noop() {
        let source = range(vec![
            commit("a1", "one", Some("Ia")),
            commit("b2", "two", Some("Ib")),
        ]);
        let target = range(vec![
            commit("a9", "one'", Some("Ia")),
            commit("b9", "two'", Some("Ib")),
        ]);
        let plan = plan(&source, &target, "master");
        assert!(plan.is_noop());
        assert_eq!(plan.dropped.len(), 2);
    }

    #[test]
    fn test_commit_without_change_id_is_never_dropped() {
        let source = range(vec![commit("x1", "anonymous", None)]);
        let target = range(vec![
            commit("a9", "whatever", Some("Ia")),
            commit("n9", "anonymous", None),
        ]);
        let plan = plan(&source, &target, "master");
        assert_eq!(plan.picks.len(), 1);
        assert_eq!(plan.picks[0].sha, "x1");
    }

    // The amended-upstream scenario: T1 carries A,B; T2 branched after B and
    // added C; B was then amended on T1 to B' (same Change-Id, new hash).
    // Rebasing T2 onto T1 must replay only C.
    #[test]
    fn test_amended_upstream_commit_is_recognised() {
        let source = range(vec![
            commit("b-old", "B", Some("Ib")),
            commit("c", "C", Some("Ic")),
        ]);
        let target = range(vec![commit("b-new", "B amended", Some("Ib"))]);
        let plan = plan(&source, &target, "t1");
        let shas: Vec<&str> = plan.picks.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["c"]);
        assert_eq!(plan.onto, "t1");
    }
}
