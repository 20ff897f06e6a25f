//! repotopic core library
//!
//! Manages a set of independently-cloned git repositories as one logical
//! workspace: a *topic* is a branch-name convention shared across every
//! clone, and rebases recognise already-landed commits by their Change-Id
//! instead of their hash, so the same logical change is never replayed
//! twice.
//!
//! The planning and orchestration logic is written against the narrow
//! [`backend::VcsBackend`] capability trait; production wires in
//! [`git::GitCli`] (one `git` process per call), tests wire in
//! [`fakes::MemoryVcs`].

pub mod backend;
pub mod change_id;
pub mod commit;
pub mod error;
pub mod fakes;
pub mod git;
pub mod manifest;
pub mod planner;
pub mod reader;
pub mod repo;
pub mod telemetry;
pub mod workspace;

pub use backend::{ApplyStatus, VcsBackend};
pub use change_id::{extract_change_id, ChangeId};
pub use commit::{Commit, CommitRange};
pub use error::{RepoError, Result};
pub use git::GitCli;
pub use planner::{plan, RebasePlan};
pub use repo::{inspect, RepoHandle, RepoStatus, TopicState};
pub use telemetry::init_tracing;
pub use workspace::{
    OrchestratorConfig, RepoOutcome, RepoReport, TopicOp, TopicOrchestrator, TopicSummary,
    WorkspaceReport,
};

/// repotopic version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
