//! Change-Id extraction from commit messages.
//!
//! A Change-Id is a stable per-logical-change token embedded in the commit
//! message by the review tooling. Two commits with different hashes but equal
//! Change-Ids represent the same logical change, which is what lets a rebase
//! recognise already-landed work instead of replaying it.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Opaque per-logical-change identifier (e.g. `I8f3a9c...`).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChangeId(String);

impl ChangeId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn change_id_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^Change-Id:[ \t]*(\S+)[ \t]*$").expect("valid regex"))
}

/// Extract the Change-Id from a full commit message, if present.
///
/// The whole message is scanned: Change-Id lines conventionally sit in the
/// trailer block, but tooling around them is lenient about position. When a
/// message carries several Change-Id lines the first one wins, matching what
/// git's own trailer handling tolerates.
pub fn extract_change_id(message: &str) -> Option<ChangeId> {
    change_id_line()
        .captures(message)
        .map(|caps| ChangeId::new(&caps[1]))
}
