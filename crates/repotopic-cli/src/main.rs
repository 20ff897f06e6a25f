//! repotopic - manage a fleet of Gerrit-style git clones as one workspace
//!
//! Every subcommand applies one operation uniformly to all repositories
//! listed in the manifest and prints a consolidated report. The exit status
//! is 0 only when every repository succeeded or was cleanly skipped.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use repotopic_core::workspace::{
    OrchestratorConfig, RepoOutcome, TopicOp, TopicOrchestrator, WorkspaceReport,
};
use repotopic_core::{init_tracing, manifest, GitCli};

#[derive(Parser)]
#[command(name = "repotopic")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manage multiple Gerrit repositories as one topic workspace", long_about = None)]
struct Cli {
    /// Manifest file: one `<url> [directory]` per line
    #[arg(short, long, default_value = "manifest.txt", global = true)]
    manifest: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit the report (and log lines) as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Maximum repositories operated on concurrently
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Run repositories serially and stop after the first conflict or error
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Branch reviews are pushed for (refs/for/<branch>)
    #[arg(long, default_value = "master", global = true)]
    review_branch: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every remote and rebase local topics onto the fetched tips
    Sync {
        /// Detach HEAD at the fetched tip instead of rebasing
        #[arg(short, long)]
        detach: bool,
    },

    /// Start a topic: create the branch in every repository
    Start {
        /// Topic name
        topic: String,
    },

    /// Switch to a topic where it exists
    Switch {
        /// Topic name
        topic: String,
    },

    /// End a topic: delete the branch everywhere it is not checked out
    End {
        /// Topic name
        topic: String,
    },

    /// Rename the current topic
    Rename {
        /// New topic name
        name: String,
    },

    /// Rebase the current topic onto another local topic
    Rebase {
        /// Topic to rebase onto
        topic: String,
    },

    /// Show every repository's current topic
    Topic,

    /// Push topics for review where strictly ahead of the remote
    Push,

    /// Fast-forward topics where strictly behind the remote
    Pull,

    /// Download a review change and rebase onto it
    Download {
        /// Change ref as `<number>/<patchset>`
        change: String,

        /// Detach HEAD at the fetched change instead of rebasing
        #[arg(short, long)]
        detach: bool,

        /// Only fetch into the named repository
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// Stash the working tree of every repository
    Stash,

    /// Pop the newest stash entry of every repository
    Pop,

    /// Run a command in every repository directory
    Forall {
        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

impl Commands {
    fn to_op(&self) -> TopicOp {
        match self {
            Commands::Sync { detach } => TopicOp::Sync { detach: *detach },
            Commands::Start { topic } => TopicOp::Start {
                topic: topic.clone(),
            },
            Commands::Switch { topic } => TopicOp::Switch {
                topic: topic.clone(),
            },
            Commands::End { topic } => TopicOp::End {
                topic: topic.clone(),
            },
            Commands::Rename { name } => TopicOp::Rename {
                topic: name.clone(),
            },
            Commands::Rebase { topic } => TopicOp::Rebase {
                topic: topic.clone(),
            },
            Commands::Topic => TopicOp::Topic,
            Commands::Push => TopicOp::Push,
            Commands::Pull => TopicOp::Pull,
            Commands::Download {
                change,
                detach,
                repo,
            } => TopicOp::Download {
                change: change.clone(),
                detach: *detach,
                repo: repo.clone(),
            },
            Commands::Stash => TopicOp::Stash,
            Commands::Pop => TopicOp::Pop,
            Commands::Forall { command } => TopicOp::Forall {
                command: command.join(" "),
            },
        }
    }
}

/// Render the consolidated report for humans.
fn render_report(report: &WorkspaceReport) -> String {
    let mut out = String::new();
    let width = report
        .repos
        .iter()
        .map(|r| r.repo.len())
        .max()
        .unwrap_or(0);

    for row in &report.repos {
        let status = match &row.outcome {
            RepoOutcome::Success => "ok".to_string(),
            RepoOutcome::Skipped { reason } => format!("skipped ({reason})"),
            RepoOutcome::Conflict { detail } => format!("CONFLICT: {detail}"),
            RepoOutcome::Failed { error } => format!("FAILED: {error}"),
        };
        out.push_str(&format!("{:<width$}  {status}\n", row.repo));
    }

    if report.operation == "topic" || !report.topics.consistent {
        out.push('\n');
        if report.topics.consistent {
            if let Some(topic) = &report.topics.majority {
                out.push_str(&format!("topic: {topic}\n"));
            }
        } else {
            for (repo, topic) in &report.topics.topics {
                let marker = if report.topics.divergent.contains(repo) {
                    " <- diverges"
                } else {
                    ""
                };
                out.push_str(&format!("{repo:<width$}  {topic}{marker}\n"));
            }
            out.push_str("warning: repositories are not all on the same topic\n");
        }
    }

    let failed = report.failed_repos();
    if failed.is_empty() {
        out.push_str("\nExecution successfully completed.\n");
    } else {
        out.push_str(&format!(
            "\nThe command failed in the following repos: {}.\n",
            failed.join(", ")
        ));
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let op = cli.command.to_op();
    let repos = manifest::load(&cli.manifest, op.keeps_missing_clones())
        .context("failed to load manifest")?;

    let defaults = OrchestratorConfig::default();
    let config = OrchestratorConfig {
        max_concurrent: cli.jobs.unwrap_or(defaults.max_concurrent),
        fail_fast: cli.fail_fast,
        review_branch: cli.review_branch.clone(),
    };

    let orchestrator = TopicOrchestrator::with_config(Arc::new(GitCli::new()), config);
    let report = orchestrator.run(&repos, &op).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    std::process::exit(report.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use repotopic_core::workspace::{RepoReport, TopicSummary};
    use repotopic_core::TopicState;

    fn report_with(rows: Vec<RepoReport>, topics: TopicSummary, operation: &str) -> WorkspaceReport {
        WorkspaceReport {
            operation: operation.to_string(),
            repos: rows,
            topics,
            generated_at: Utc::now(),
        }
    }

    fn row(repo: &str, outcome: RepoOutcome) -> RepoReport {
        RepoReport {
            repo: repo.to_string(),
            topic: None,
            outcome,
        }
    }

    #[test]
    fn test_render_success_report() {
        let topics = TopicSummary::from_observations(&[
            ("alpha".to_string(), TopicState::Branch("feat".to_string())),
            ("beta".to_string(), TopicState::Branch("feat".to_string())),
        ]);
        let report = report_with(
            vec![
                row("alpha", RepoOutcome::Success),
                row("beta", RepoOutcome::skipped("nothing to push")),
            ],
            topics,
            "push",
        );
        let text = render_report(&report);
        assert!(text.contains("alpha"));
        assert!(text.contains("skipped (nothing to push)"));
        assert!(text.contains("successfully completed"));
        assert!(!text.contains("warning"));
    }

    #[test]
    fn test_render_divergent_report_names_repos_and_topics() {
        let topics = TopicSummary::from_observations(&[
            (
                "alpha".to_string(),
                TopicState::Branch("feature-x".to_string()),
            ),
            (
                "beta".to_string(),
                TopicState::Branch("feature-y".to_string()),
            ),
        ]);
        let report = report_with(
            vec![
                row("alpha", RepoOutcome::Success),
                row("beta", RepoOutcome::Success),
            ],
            topics,
            "topic",
        );
        let text = render_report(&report);
        assert!(text.contains("feature-x"));
        assert!(text.contains("feature-y"));
        assert!(text.contains("beta") && text.contains("diverges"));
        assert!(text.contains("warning: repositories are not all on the same topic"));
    }

    #[test]
    fn test_render_failure_report_lists_failed_repos() {
        let topics = TopicSummary::from_observations(&[]);
        let report = report_with(
            vec![
                row("alpha", RepoOutcome::Success),
                row(
                    "beta",
                    RepoOutcome::Conflict {
                        detail: "apply stopped".to_string(),
                    },
                ),
            ],
            topics,
            "rebase",
        );
        let text = render_report(&report);
        assert!(text.contains("CONFLICT"));
        assert!(text.contains("failed in the following repos: beta"));
    }

    #[test]
    fn test_forall_args_join_into_one_command() {
        let cmd = Commands::Forall {
            command: vec!["git".to_string(), "gc".to_string()],
        };
        assert_eq!(
            cmd.to_op(),
            TopicOp::Forall {
                command: "git gc".to_string()
            }
        );
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["repotopic", "sync", "-d"]).unwrap();
        assert!(matches!(
            cli.command.to_op(),
            TopicOp::Sync { detach: true }
        ));

        let cli = Cli::try_parse_from(["repotopic", "-m", "ws.txt", "start", "feature-x"]).unwrap();
        assert_eq!(cli.manifest, PathBuf::from("ws.txt"));
        assert!(matches!(cli.command.to_op(), TopicOp::Start { .. }));

        let cli =
            Cli::try_parse_from(["repotopic", "download", "1142/3", "-d", "-r", "frontend"])
                .unwrap();
        assert!(matches!(
            cli.command.to_op(),
            TopicOp::Download { detach: true, .. }
        ));
    }
}
