//! Git operations for changelog generation.
//!
//! Shells out to `git` for all operations. This ensures we inherit the user's
//! SSH keys, GPG signing, hooks, and other configuration. Every call runs in
//! the process working directory.

use std::process::Command;

use camino::Utf8Path;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "status").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// One commit from `git log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitLog {
    /// Abbreviated hash.
    pub short_hash: String,
    /// Full hash.
    pub commit_hash: String,
    /// Raw message, subject and body.
    pub message: String,
}

impl CommitLog {
    /// Build a log entry.
    pub fn new(
        short_hash: impl Into<String>,
        commit_hash: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            short_hash: short_hash.into(),
            commit_hash: commit_hash.into(),
            message: message.into(),
        }
    }
}

/// Working tree and tracking-branch state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoState {
    /// Uncommitted changes present.
    pub dirty: bool,
    /// Upstream has commits the local branch lacks.
    pub missing_local: bool,
    /// Local branch has commits the upstream lacks.
    pub missing_remote: bool,
    /// Current branch, `None` when detached.
    pub branch: Option<String>,
}

/// Check whether the working tree is clean (no uncommitted changes).
#[instrument]
pub fn is_clean() -> GitResult<bool> {
    let output = git(&["status", "--porcelain"])?;
    let clean = output.trim().is_empty();
    debug!(clean, "working tree status");
    Ok(clean)
}

/// Get the current branch name.
///
/// Returns `None` if in a detached HEAD state.
#[instrument]
pub fn current_branch() -> GitResult<Option<String>> {
    let output = git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
    let branch = output.trim().to_string();
    if branch == "HEAD" {
        debug!("detached HEAD");
        Ok(None)
    } else {
        debug!(%branch, "current branch");
        Ok(Some(branch))
    }
}

/// Commits missing on each side of the upstream: `(missing_local, missing_remote)`.
///
/// Both are `false` when no upstream is configured.
#[instrument]
#[expect(clippy::literal_string_with_formatting_args)]
pub fn missing_commits() -> GitResult<(bool, bool)> {
    // @{upstream} is a git refspec, not a format arg
    if git(&["rev-parse", "--abbrev-ref", "@{upstream}"]).is_err() {
        debug!("no upstream tracking branch");
        return Ok((false, false));
    }
    let count = |range: &str| -> GitResult<bool> {
        let out = git(&["rev-list", "--count", range])?;
        Ok(out.trim() != "0")
    };
    let missing_local = count("HEAD..@{upstream}")?;
    let missing_remote = count("@{upstream}..HEAD")?;
    debug!(missing_local, missing_remote, "upstream comparison");
    Ok((missing_local, missing_remote))
}

/// Collect dirty/branch/divergence state in one go.
#[instrument]
pub fn repo_state() -> GitResult<RepoState> {
    let (missing_local, missing_remote) = missing_commits()?;
    Ok(RepoState {
        dirty: !is_clean()?,
        missing_local,
        missing_remote,
        branch: current_branch()?,
    })
}

/// Get the latest semver tag, if any.
///
/// Looks for tags matching `v*` and sorts by version.
#[instrument]
pub fn latest_version_tag() -> GitResult<Option<String>> {
    let output = git(&["tag", "--list", "v*", "--sort=-version:refname"]);
    let Ok(output) = output else {
        return Ok(None);
    };

    let tag = output.lines().next().map(|s| s.trim().to_string());
    debug!(?tag, "latest version tag");
    Ok(tag)
}

/// Find the tag for a version, e.g. `v0.1.2` or `0.1.2` for `0.1.2`.
#[instrument]
pub fn find_tag(version: &str) -> GitResult<Option<String>> {
    let output = git(&["tag", "-l", &format!("*{version}")])?;
    let tag = pick_version_tag(&output, version).map(str::to_string);
    debug!(?tag, "version tag lookup");
    Ok(tag)
}

/// Choose the tag for `version` among `git tag -l *<version>` results.
///
/// `v<version>` wins, then the bare version, then any other prefix that
/// does not run into the version's digits (`release-1.0.0` but not
/// `v11.0.0` for `1.0.0`).
fn pick_version_tag<'a>(output: &'a str, version: &str) -> Option<&'a str> {
    let tags: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    let prefixed = format!("v{version}");
    tags.iter()
        .find(|t| **t == prefixed)
        .or_else(|| tags.iter().find(|t| **t == version))
        .or_else(|| {
            tags.iter().find(|t| {
                t.strip_suffix(version).is_some_and(|prefix| {
                    !prefix.ends_with(|c: char| c.is_ascii_digit() || c == '.')
                })
            })
        })
        .copied()
}

/// Commits since `tag` (or the whole history), newest first.
#[instrument]
pub fn get_logs(since: Option<&str>) -> GitResult<Vec<CommitLog>> {
    let range = since.map(|tag| format!("{tag}..HEAD"));
    let mut args = vec!["log"];
    if let Some(range) = range.as_deref() {
        args.push(range);
    }
    args.extend(["-z", "--format=%h:%H:%B"]);

    let logs = parse_log_output(&git(&args)?);
    debug!(count = logs.len(), "read commit logs");
    Ok(logs)
}

/// A single commit by revision.
#[instrument]
pub fn get_log(rev: &str) -> GitResult<CommitLog> {
    let output = git(&["log", "-1", "-z", "--format=%h:%H:%B", rev])?;
    parse_log_output(&output)
        .into_iter()
        .next()
        .ok_or_else(|| GitError::Command {
            command: "log".to_string(),
            stderr: format!("no commit found for '{rev}'"),
        })
}

/// Split `-z --format=%h:%H:%B` output into entries.
fn parse_log_output(output: &str) -> Vec<CommitLog> {
    output
        .split('\0')
        .map(|entry| entry.trim_start_matches('\n'))
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let short = parts.next()?;
            let full = parts.next()?;
            let message = parts.next().unwrap_or_default();
            Some(CommitLog::new(short, full, message))
        })
        .collect()
}

/// Stage the given paths plus every modified tracked file.
#[instrument(skip(paths))]
pub fn add_paths(paths: &[&Utf8Path]) -> GitResult<()> {
    if !paths.is_empty() {
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(|p| p.as_str()));
        git(&args)?;
    }
    git(&["add", "--update"])?;
    debug!(count = paths.len(), "staged paths");
    Ok(())
}

/// Commit staged changes.
#[instrument]
pub fn commit(message: &str) -> GitResult<()> {
    git(&["commit", "-m", message])?;
    info!("committed release");
    Ok(())
}

/// Create a lightweight tag at HEAD.
#[instrument]
pub fn tag(name: &str) -> GitResult<()> {
    git(&["tag", name])?;
    info!(%name, "tagged release");
    Ok(())
}

/// Drop the last commit and its changes (`reset --hard HEAD~1`).
#[instrument]
pub fn revert_last_commit() -> GitResult<()> {
    warn!("reverting release commit");
    git(&["reset", "--hard", "HEAD~1"])?;
    Ok(())
}

/// Check if we're inside a git repository.
#[instrument]
pub fn is_inside_repo() -> GitResult<bool> {
    let result = git(&["rev-parse", "--is-inside-work-tree"]);
    match result {
        Ok(output) => Ok(output.trim() == "true"),
        Err(GitError::Command { .. } | GitError::NotARepo) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Run a git command and return its stdout.
fn git(args: &[&str]) -> GitResult<String> {
    let output = Command::new("git").args(args).output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepo);
        }

        Err(GitError::Command {
            command: args.first().unwrap_or(&"").to_string(),
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These run against whatever repository the tests are started from and
    // only assert on shape, so they pass outside a checkout too.

    #[test]
    fn is_inside_repo_returns_bool() {
        assert!(is_inside_repo().is_ok());
    }

    #[test]
    fn repo_state_works_in_repo() {
        if is_inside_repo().unwrap_or(false) {
            assert!(repo_state().is_ok());
        }
    }

    #[test]
    fn latest_version_tag_works() {
        if is_inside_repo().unwrap_or(false) {
            assert!(latest_version_tag().is_ok());
        }
    }

    #[test]
    fn version_tag_prefers_exact_match() {
        let output = "release-2.0.0\nv12.0.0\nv2.0.0\n";
        assert_eq!(pick_version_tag(output, "2.0.0"), Some("v2.0.0"));
        assert_eq!(pick_version_tag("12.0.0\n2.0.0\n", "2.0.0"), Some("2.0.0"));
        assert_eq!(
            pick_version_tag("release-2.0.0\nv12.0.0\n", "2.0.0"),
            Some("release-2.0.0")
        );
        assert_eq!(pick_version_tag("v12.0.0\n", "2.0.0"), None);
        assert_eq!(pick_version_tag("", "2.0.0"), None);
    }

    #[test]
    fn git_error_on_bad_command() {
        assert!(git(&["not-a-real-subcommand"]).is_err());
    }

    #[test]
    fn parses_nul_separated_log() {
        let output = "abc1234:abc1234full:fix: A\n\nRefs: #1\n\0\ndef5678:def5678full:feat: B: with colon\n\0";
        let logs = parse_log_output(output);
        assert_eq!(
            logs,
            vec![
                CommitLog::new("abc1234", "abc1234full", "fix: A\n\nRefs: #1\n"),
                CommitLog::new("def5678", "def5678full", "feat: B: with colon\n"),
            ]
        );
    }

    #[test]
    fn parses_empty_log() {
        assert!(parse_log_output("").is_empty());
        assert!(parse_log_output("\0\n").is_empty());
    }
}
