//! Workspace manifest loading.
//!
//! The manifest is a plain text file, one repository per non-empty line:
//! `<url> [directory]`. The directory defaults to the URL's last path
//! segment (a trailing `.git` is stripped) and resolves relative to the
//! manifest's own directory.

use std::path::Path;

use tracing::warn;

use crate::error::{RepoError, Result};
use crate::repo::RepoHandle;

/// Directory implied by a repository URL when the manifest names none.
fn default_dir_name(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Load the manifest at `path`.
///
/// Entries whose directory does not exist on disk are skipped with a warning
/// unless `keep_missing` is set — `sync` keeps them so it can create the
/// clone.
pub fn load(path: &Path, keep_missing: bool) -> Result<Vec<RepoHandle>> {
    let root = path.parent().unwrap_or_else(|| Path::new("."));
    let content = std::fs::read_to_string(path).map_err(|e| {
        RepoError::Manifest(format!("cannot read manifest {}: {e}", path.display()))
    })?;

    let mut repos = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (url, rest) = match line.split_once(char::is_whitespace) {
            Some((url, rest)) => (url, rest.trim()),
            None => (line, ""),
        };
        let dir_name = if rest.is_empty() {
            default_dir_name(url).ok_or_else(|| {
                RepoError::Manifest(format!("cannot derive a directory from url '{url}'"))
            })?
        } else {
            rest.to_string()
        };
        let dir = root.join(&dir_name);
        if !keep_missing && !dir.is_dir() {
            warn!(dir = %dir.display(), "directory does not exist, skipped");
            continue;
        }
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(dir_name);
        repos.push(RepoHandle::new(name, url, dir));
    }

    if repos.is_empty() {
        return Err(RepoError::Manifest(
            "there is no valid repository defined".to_string(),
        ));
    }
    Ok(repos)
}
