//! End-to-end CLI integration tests
//!
//! These tests invoke the compiled binary as a subprocess to verify
//! that the CLI behaves correctly from a user's perspective. Most of them
//! build a throwaway git repository in a temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Returns a Command configured to run our binary, logging into the temp dir.
#[allow(deprecated)]
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.env("CHLOG_LOG_DIR", std::env::temp_dir().join("chlog-test-logs"));
    cmd
}

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

fn commit(dir: &Path, message: &str) {
    git(dir, &["commit", "--allow-empty", "-q", "-m", message]);
}

/// A repo with a tagged `v0.1.0` release, a changelog and two conventional
/// commits after the tag.
fn repo() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    git(dir, &["config", "tag.gpgsign", "false"]);

    fs::write(dir.join("CHANGELOG.md"), "# Changelog\n").unwrap();
    git(dir, &["add", "CHANGELOG.md"]);
    commit(dir, "chore: Initial commit");
    git(dir, &["tag", "v0.1.0"]);

    commit(dir, "fix: Handle empty input\n\nRefs: #1");
    commit(dir, "feat(api): Add export endpoint\n\nRefs: #2");
    tmp
}

fn run_in(dir: &Path) -> Command {
    let mut c = cmd();
    c.args(["-C", dir.to_str().unwrap()]);
    c
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_shows_usage() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn version_flag_shows_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn long_help_lists_environment() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("CHLOG_LOG_DIR"));
}

#[test]
fn no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn invalid_flag_shows_error() {
    cmd()
        .arg("--not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn chdir_nonexistent_fails() {
    cmd()
        .args(["-C", "/nonexistent/path/that/does/not/exist", "config"])
        .assert()
        .failure();
}

// =============================================================================
// Init
// =============================================================================

#[test]
fn init_creates_markdown_changelog() {
    let tmp = TempDir::new().unwrap();
    run_in(tmp.path()).arg("init").assert().success();
    assert_eq!(
        fs::read_to_string(tmp.path().join("CHANGELOG.md")).unwrap(),
        "# Changelog\n"
    );
}

#[test]
fn init_rst_and_refuses_second_changelog() {
    let tmp = TempDir::new().unwrap();
    run_in(tmp.path())
        .args(["init", "--format", "rst"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(tmp.path().join("CHANGELOG.rst")).unwrap(),
        "=========\nChangelog\n=========\n"
    );

    run_in(tmp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

// =============================================================================
// Generate
// =============================================================================

#[test]
fn generate_dry_run_previews_without_writing() {
    let repo = repo();
    run_in(repo.path())
        .args(["generate", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## v0.1.1"))
        .stdout(predicate::str::contains("### Features and Improvements"))
        .stdout(predicate::str::contains("- (`api`) Add export endpoint"))
        .stdout(predicate::str::contains("### Bug fixes"));

    assert_eq!(
        fs::read_to_string(repo.path().join("CHANGELOG.md")).unwrap(),
        "# Changelog\n"
    );
}

#[test]
fn generate_writes_commits_and_tags() {
    let repo = repo();
    run_in(repo.path())
        .args(["generate", "--yes", "--tag", "--statistics"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 commits contributed to the release."));

    let changelog = fs::read_to_string(repo.path().join("CHANGELOG.md")).unwrap();
    assert!(changelog.starts_with("# Changelog\n\n## v0.1.1\n"), "{changelog}");

    let tags = std::process::Command::new("git")
        .args(["tag", "--list"])
        .current_dir(repo.path())
        .output()
        .unwrap();
    assert!(String::from_utf8_lossy(&tags.stdout).contains("v0.1.1"));

    let log = std::process::Command::new("git")
        .args(["log", "-1", "--format=%B"])
        .current_dir(repo.path())
        .output()
        .unwrap();
    assert!(
        String::from_utf8_lossy(&log.stdout)
            .starts_with("Update CHANGELOG for 0.1.1\nBump version: 0.1.0 → 0.1.1")
    );
}

#[test]
fn generate_refuses_dirty_tree() {
    let repo = repo();
    fs::write(repo.path().join("CHANGELOG.md"), "# Changelog\n\nlocal edit\n").unwrap();
    run_in(repo.path())
        .args(["generate", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Working directory is not clean"));
}

#[test]
fn generate_without_changelog_fails() {
    let repo = repo();
    fs::remove_file(repo.path().join("CHANGELOG.md")).unwrap();
    run_in(repo.path())
        .args(["generate", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No CHANGELOG file detected"));
}

#[test]
fn generate_forced_version_and_json() {
    let repo = repo();
    let output = run_in(repo.path())
        .args(["--json", "generate", "--dry-run", "--version-part", "major"])
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
    assert_eq!(json["plan"]["next"], "1.0.0");
    assert_eq!(json["plan"]["bump"], "major");
    assert_eq!(json["outcome"]["issue_refs"][0]["issue_ref"], "#1");
}

#[test]
fn generate_reject_empty_exits_cleanly() {
    let repo = repo();
    git(repo.path(), &["tag", "v0.2.0"]);
    fs::write(repo.path().join(".chlog.toml"), "current_version = \"0.2.0\"\n").unwrap();
    run_in(repo.path())
        .args(["generate", "--dry-run", "--reject-empty"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No changes present"));
}

#[test]
fn generate_dry_run_lists_post_process_requests() {
    let repo = repo();
    run_in(repo.path())
        .args([
            "generate",
            "--dry-run",
            "--post-process-url",
            "https://issues.example.com/::issue_ref::",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://issues.example.com/#1"))
        .stdout(predicate::str::contains("Released on 0.1.1"));
}

// =============================================================================
// Test command
// =============================================================================

#[test]
fn test_renders_single_change() {
    let repo = repo();
    run_in(repo.path())
        .args(["test", "HEAD"])
        .assert()
        .success()
        .stdout(predicate::str::contains("- (`api`) Add export endpoint"));
}

#[test]
fn test_renders_release_since_tag() {
    let repo = repo();
    run_in(repo.path())
        .args(["test", "v0.1.0", "--template", "release", "--format", "rst"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v0.0.0\n======"))
        .stdout(predicate::str::contains("* Handle empty input"));
}

#[test]
fn test_reports_non_conventional_commit() {
    let repo = repo();
    commit(repo.path(), "Tidy things up");
    run_in(repo.path())
        .args(["test", "HEAD"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not a conventional commit"));
}

// =============================================================================
// Preflight
// =============================================================================

#[test]
fn preflight_passes_on_clean_repo() {
    let repo = repo();
    run_in(repo.path())
        .arg("preflight")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ready to generate"));
}

#[test]
fn preflight_json_reports_failures() {
    let repo = repo();
    fs::write(
        repo.path().join(".chlog.toml"),
        "[release]\nallowed_branches = [\"release\"]\n",
    )
    .unwrap();
    git(repo.path(), &["add", ".chlog.toml"]);
    commit(repo.path(), "chore: Add config");

    let output = run_in(repo.path())
        .args(["--json", "preflight"])
        .assert()
        .failure();
    let json: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
    assert_eq!(json["all_passed"], false);
}
