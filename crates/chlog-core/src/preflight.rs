//! Repository checks run before a changelog is generated.
//!
//! Evaluates the working tree, upstream divergence and branch against the
//! `[release]` settings. Returns structured results that the CLI formats.

use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::ReleaseConfig;
use crate::git::{self, RepoState};

/// A single preflight check result.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Human-readable name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Description of the result (reason for failure, or confirmation).
    pub message: String,
}

impl CheckResult {
    fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
        }
    }

    fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
        }
    }
}

/// Full preflight report.
#[derive(Debug, Clone, Serialize)]
pub struct PreflightReport {
    /// Individual check results.
    pub checks: Vec<CheckResult>,
    /// Whether all checks passed.
    pub all_passed: bool,
    /// The state the checks were run against, when it could be read.
    pub state: Option<RepoState>,
}

impl PreflightReport {
    /// The first failed check, if any.
    pub fn first_failure(&self) -> Option<&CheckResult> {
        self.checks.iter().find(|c| !c.passed)
    }
}

/// Read the repository state and check it against `release`.
#[instrument(skip(release))]
pub fn run_preflight(release: &ReleaseConfig) -> PreflightReport {
    let in_repo = check_git_repo();
    if !in_repo.passed {
        return PreflightReport {
            checks: vec![in_repo],
            all_passed: false,
            state: None,
        };
    }

    match git::repo_state() {
        Ok(state) => {
            let mut report = check_repo_state(&state, release);
            report.checks.insert(0, in_repo);
            report
        }
        Err(e) => PreflightReport {
            checks: vec![
                in_repo,
                CheckResult::fail("Repository state", format!("Failed to check: {e}")),
            ],
            all_passed: false,
            state: None,
        },
    }
}

/// Check an already-read state against `release`. No git calls.
pub fn check_repo_state(state: &RepoState, release: &ReleaseConfig) -> PreflightReport {
    let branch = state.branch.as_deref().unwrap_or("HEAD");
    let checks = vec![
        check_clean_tree(state, release),
        check_missing_local(state, release, branch),
        check_missing_remote(state, release, branch),
        check_allowed_branch(state, release),
    ];

    let all_passed = checks.iter().all(|c| c.passed);
    debug!(all_passed, check_count = checks.len(), "preflight complete");

    PreflightReport {
        checks,
        all_passed,
        state: Some(state.clone()),
    }
}

fn check_git_repo() -> CheckResult {
    match git::is_inside_repo() {
        Ok(true) => CheckResult::pass("Git repository", "Inside a git repository"),
        Ok(false) => CheckResult::fail("Git repository", "Not inside a git repository"),
        Err(e) => CheckResult::fail("Git repository", format!("Failed to check: {e}")),
    }
}

fn check_clean_tree(state: &RepoState, release: &ReleaseConfig) -> CheckResult {
    const NAME: &str = "Working tree";
    match (state.dirty, release.allow_dirty) {
        (false, _) => CheckResult::pass(NAME, "Clean working tree"),
        (true, true) => CheckResult::pass(NAME, "Uncommitted changes (allowed by allow_dirty)"),
        (true, false) => CheckResult::fail(
            NAME,
            "Working directory is not clean. Use `allow_dirty` configuration to ignore.",
        ),
    }
}

fn check_missing_local(state: &RepoState, release: &ReleaseConfig, branch: &str) -> CheckResult {
    const NAME: &str = "Local branch";
    match (state.missing_local, release.allow_missing) {
        (false, _) => CheckResult::pass(NAME, "Local branch has every upstream commit"),
        (true, true) => CheckResult::pass(NAME, "Behind upstream (allowed by allow_missing)"),
        (true, false) => CheckResult::fail(
            NAME,
            format!(
                "Current local branch is missing commits from remote {branch}. Use `allow_missing` configuration to ignore."
            ),
        ),
    }
}

fn check_missing_remote(state: &RepoState, release: &ReleaseConfig, branch: &str) -> CheckResult {
    const NAME: &str = "Remote branch";
    match (state.missing_remote, release.allow_missing) {
        (false, _) => CheckResult::pass(NAME, "Upstream has every local commit"),
        (true, true) => CheckResult::pass(NAME, "Ahead of upstream (allowed by allow_missing)"),
        (true, false) => CheckResult::fail(
            NAME,
            format!(
                "Current remote branch is missing commits from local {branch}. Use `allow_missing` configuration to ignore."
            ),
        ),
    }
}

fn check_allowed_branch(state: &RepoState, release: &ReleaseConfig) -> CheckResult {
    const NAME: &str = "Release branch";
    if release.allowed_branches.is_empty() {
        return CheckResult::pass(NAME, "Any branch allowed");
    }
    match state.branch.as_deref() {
        Some(branch) if release.allowed_branches.iter().any(|b| b == branch) => {
            CheckResult::pass(NAME, format!("On allowed branch '{branch}'"))
        }
        _ => CheckResult::fail(NAME, "Current branch not in allowed generation branches."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RepoState {
        RepoState {
            dirty: false,
            missing_local: false,
            missing_remote: false,
            branch: Some("main".into()),
        }
    }

    #[test]
    fn clean_state_passes() {
        let report = check_repo_state(&state(), &ReleaseConfig::default());
        assert!(report.all_passed);
        assert!(report.first_failure().is_none());
    }

    #[test]
    fn dirty_tree_fails_unless_allowed() {
        let dirty = RepoState {
            dirty: true,
            ..state()
        };
        let report = check_repo_state(&dirty, &ReleaseConfig::default());
        assert!(!report.all_passed);
        assert!(
            report
                .first_failure()
                .unwrap()
                .message
                .contains("allow_dirty")
        );

        let allowed = ReleaseConfig {
            allow_dirty: true,
            ..ReleaseConfig::default()
        };
        assert!(check_repo_state(&dirty, &allowed).all_passed);
    }

    #[test]
    fn divergence_fails_unless_allowed() {
        let behind = RepoState {
            missing_local: true,
            ..state()
        };
        let report = check_repo_state(&behind, &ReleaseConfig::default());
        assert!(
            report
                .first_failure()
                .unwrap()
                .message
                .contains("missing commits from remote main")
        );

        let ahead = RepoState {
            missing_remote: true,
            ..state()
        };
        let allowed = ReleaseConfig {
            allow_missing: true,
            ..ReleaseConfig::default()
        };
        assert!(!check_repo_state(&ahead, &ReleaseConfig::default()).all_passed);
        assert!(check_repo_state(&ahead, &allowed).all_passed);
    }

    #[test]
    fn branch_must_be_allowed() {
        let release = ReleaseConfig {
            allowed_branches: vec!["release".into()],
            ..ReleaseConfig::default()
        };
        assert!(!check_repo_state(&state(), &release).all_passed);

        let detached = RepoState {
            branch: None,
            ..state()
        };
        assert!(!check_repo_state(&detached, &release).all_passed);

        let on_release = RepoState {
            branch: Some("release".into()),
            ..state()
        };
        assert!(check_repo_state(&on_release, &release).all_passed);
    }

    #[test]
    fn preflight_report_serializes() {
        let report = check_repo_state(&state(), &ReleaseConfig::default());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"all_passed\":true"));
        assert!(json.contains("\"branch\":\"main\""));
    }
}
