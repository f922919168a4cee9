//! The generate workflow: from commit history to a written changelog.
//!
//! # Two-phase workflow
//!
//! 1. **Plan** ([`plan_generate`]) validates configuration, checks the
//!    repository, reads and classifies commits, works out the next version
//!    and renders the release. Nothing is written.
//! 2. **Execute** ([`GeneratePlan::execute`]) writes the changelog, runs
//!    hooks, then commits and tags as configured.
//!
//! The CLI shows the plan's preview between the two and asks for
//! confirmation.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::change::Change;
use crate::classify::{CommitClassifier, ParseStats};
use crate::config::Config;
use crate::git::{self, CommitLog};
use crate::hooks::{self, HookContext, HookOutput};
use crate::post_process::{self, IssueRef};
use crate::preflight;
use crate::render::{self, ChangelogWriter, OutputFormat};
use crate::sections::{self, SemverRule};
use crate::version::{self, BumpLevel};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors from the generate workflow.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// No `CHANGELOG.md` or `CHANGELOG.rst` in the project root.
    #[error("No CHANGELOG file detected, run `chlog init`")]
    NoChangelog,

    /// A repository check failed.
    #[error("{0}")]
    RepoState(String),

    /// No changes were found and `reject_empty` is set.
    #[error("No changes present and reject_empty configured.")]
    Rejected,

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] crate::error::ConfigError),

    /// Git error.
    #[error(transparent)]
    Git(#[from] crate::git::GitError),

    /// Version error.
    #[error(transparent)]
    Version(#[from] crate::version::VersionError),

    /// Render or write error.
    #[error(transparent)]
    Render(#[from] crate::render::RenderError),

    /// Hook error.
    #[error(transparent)]
    Hook(#[from] crate::hooks::HookError),

    /// Post-processing error.
    #[error(transparent)]
    PostProcess(#[from] crate::post_process::PostProcessError),
}

/// Result alias for generate operations.
pub type GenerateResult<T> = Result<T, GenerateError>;

// ──────────────────────────────────────────────
// Options
// ──────────────────────────────────────────────

/// Per-run options that are not part of the configuration.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Skip repository checks and never write.
    pub dry_run: bool,
    /// Keep non-conventional commits under "Miscellaneous".
    pub include_all: bool,
    /// Use this version instead of computing one.
    pub version_tag: Option<String>,
    /// Use this bump instead of computing one.
    pub version_part: Option<BumpLevel>,
}

// ──────────────────────────────────────────────
// Plan
// ──────────────────────────────────────────────

/// A rendered but unwritten release.
#[derive(Debug, Serialize)]
pub struct GeneratePlan {
    /// Version the release is computed from.
    pub previous: Version,
    /// Version being released.
    pub next: Version,
    /// Bump applied (computed or forced).
    pub bump: BumpLevel,
    /// `version_string` with the new version, used for tags.
    pub version_tag: String,
    /// Release heading: the tag plus the date when configured.
    pub version_string: String,
    /// Classified changes, in commit order.
    pub changes: Vec<Change>,
    /// Commit counters.
    pub stats: ParseStats,
    /// Rendered release section.
    pub preview: String,
    /// Changelog being updated.
    pub changelog_path: Utf8PathBuf,
    #[serde(skip)]
    writer: ChangelogWriter,
}

/// Plan a release for the repository rooted at `root`.
///
/// Git commands run in the process working directory, which the CLI sets to
/// `root`.
#[instrument(skip(config, options), fields(dry_run = options.dry_run))]
pub fn plan_generate(
    root: &Utf8Path,
    config: &Config,
    options: &GenerateOptions,
) -> GenerateResult<GeneratePlan> {
    config.validate()?;
    let format = render::detect_format(root).ok_or(GenerateError::NoChangelog)?;

    if options.dry_run {
        debug!("dry run, skipping repository checks");
    } else {
        let report = preflight::run_preflight(&config.release);
        if let Some(failed) = report.first_failure() {
            return Err(GenerateError::RepoState(failed.message.clone()));
        }
    }

    let previous = version::resolve_current_version(config.current_version.as_deref())?;
    let since = git::find_tag(&previous.to_string())?;
    let logs = git::get_logs(since.as_deref())?;
    info!(%previous, ?since, commits = logs.len(), "read history");

    plan_from_logs(root, format, config, options, previous, &logs, Utc::now())
}

/// Plan a release from already-read logs. No git calls.
pub fn plan_from_logs(
    root: &Utf8Path,
    format: OutputFormat,
    config: &Config,
    options: &GenerateOptions,
    previous: Version,
    logs: &[CommitLog],
    now: DateTime<Utc>,
) -> GenerateResult<GeneratePlan> {
    let mut classifier = CommitClassifier::new(config, options.include_all)?;
    let mut changes = classifier.classify_all(logs);
    let stats = classifier.stats();

    if changes.is_empty() && config.release.reject_empty {
        return Err(GenerateError::Rejected);
    }

    let rule = SemverRule::from_config(config)?;
    let bump = options
        .version_part
        .unwrap_or_else(|| sections::bump(&changes, &rule, &previous.to_string()));
    let next = match options.version_tag.as_deref() {
        Some(explicit) => version::parse_version(explicit)?,
        None => version::next_version(&previous, bump),
    };

    let version_tag = version::format_version_string(&config.version_string, &next);
    let date = config.date_items()?;
    let version_string = version::release_heading(&version_tag, date.as_deref(), now);
    debug!(%next, %bump, %version_string, "next version");

    let mut writer = ChangelogWriter::open(root, format, config)?;
    let preview = writer
        .consume(&version_string, classifier.type_headers(), &mut changes)?
        .to_string();

    Ok(GeneratePlan {
        previous,
        next,
        bump,
        version_tag,
        version_string,
        changes,
        stats,
        preview,
        changelog_path: writer.path().to_path_buf(),
        writer,
    })
}

// ──────────────────────────────────────────────
// Execute
// ──────────────────────────────────────────────

/// What an executed plan did.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    /// Version released.
    pub version: Version,
    /// Tag name (formatted version string).
    pub version_tag: String,
    /// Changelog that was written.
    pub changelog_path: Utf8PathBuf,
    /// Hook results, in order.
    pub hooks: Vec<HookOutput>,
    /// Whether a release commit was made.
    pub committed: bool,
    /// Whether the release was tagged.
    pub tagged: bool,
    /// Issues referenced by the release, for post-processing.
    pub issue_refs: Vec<IssueRef>,
    /// Commit counters.
    pub stats: ParseStats,
}

impl GeneratePlan {
    /// The document that [`Self::execute`] would write.
    pub fn document(&self) -> String {
        self.writer.document()
    }

    /// Write, run hooks, commit and tag.
    ///
    /// A dry run writes nothing and runs nothing but still reports the
    /// issue refs, so post-processing can show what it would send.
    #[instrument(skip_all, fields(version = %self.next, dry_run = dry_run))]
    pub fn execute(
        self,
        root: &Utf8Path,
        config: &Config,
        dry_run: bool,
    ) -> GenerateResult<GenerateOutcome> {
        let changelog_path = self.writer.write(dry_run)?;
        let issue_refs = post_process::unique_issue_refs(&self.changes);

        let mut outcome = GenerateOutcome {
            version: self.next.clone(),
            version_tag: self.version_tag.clone(),
            changelog_path,
            hooks: Vec::new(),
            committed: false,
            tagged: false,
            issue_refs,
            stats: self.stats,
        };
        if dry_run {
            return Ok(outcome);
        }

        let context = HookContext {
            version: self.next.to_string(),
            prev_version: self.previous.to_string(),
            tag: self.version_tag.clone(),
            changelog_path: outcome.changelog_path.to_string(),
        };
        outcome.hooks = hooks::run_hooks(&config.hooks, &context, root)?;

        if config.release.commit {
            git::add_paths(&[outcome.changelog_path.as_path()])?;
            git::commit(&commit_message(&self.previous, &self.next))?;
            outcome.committed = true;

            if config.release.tag {
                if let Err(e) = git::tag(&self.version_tag) {
                    warn!(error = %e, "tagging failed, reverting release commit");
                    git::revert_last_commit()?;
                    return Err(e.into());
                }
                outcome.tagged = true;
            }
        }

        info!(version = %outcome.version, "release generated");
        Ok(outcome)
    }
}

/// Release commit message.
pub fn commit_message(previous: &Version, next: &Version) -> String {
    format!("Update CHANGELOG for {next}\nBump version: {previous} → {next}")
}

/// Statistics block printed with `--statistics`.
pub fn statistics_block(stats: ParseStats) -> String {
    format!(
        "# Commit Statistics\n\n* {} commits contributed to the release.\n* {} commits were parsed as conventional.\n",
        stats.commits, stats.conventional
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommitType;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn project(content: &str) -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        fs::write(root.join("CHANGELOG.md"), content).unwrap();
        (tmp, root)
    }

    fn logs() -> Vec<CommitLog> {
        vec![
            CommitLog::new("aaa", "aaa111", "fix: A\n\nRefs: #1\n"),
            CommitLog::new("bbb", "bbb222", "feat: B\n\nRefs: #2\n"),
            CommitLog::new("ccc", "ccc333", "Merge branch 'x'\n"),
        ]
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap()
    }

    fn plan(
        root: &Utf8Path,
        config: &Config,
        options: &GenerateOptions,
        logs: &[CommitLog],
    ) -> GenerateResult<GeneratePlan> {
        plan_from_logs(
            root,
            OutputFormat::Md,
            config,
            options,
            Version::new(1, 0, 0),
            logs,
            now(),
        )
    }

    #[test]
    fn plans_minor_release_with_sections() {
        let (_tmp, root) = project("# Changelog\n");
        let config = Config {
            commit_types: vec![
                CommitType {
                    name: "feat".into(),
                    header: "Features".into(),
                    semver: None,
                },
                CommitType {
                    name: "fix".into(),
                    header: "Bug fixes".into(),
                    semver: None,
                },
            ],
            ..Config::default()
        };
        let p = plan(&root, &config, &GenerateOptions::default(), &logs()).unwrap();

        assert_eq!(p.bump, BumpLevel::Minor);
        assert_eq!(p.next, Version::new(1, 1, 0));
        assert_eq!(p.version_tag, "v1.1.0");
        assert_eq!(p.stats.commits, 3);
        assert_eq!(p.stats.conventional, 2);
        assert_eq!(
            p.preview,
            "## v1.1.0\n\n### Features\n\n- B\n\n### Bug fixes\n\n- A\n"
        );
    }

    #[test]
    fn include_all_keeps_misc_commits() {
        let (_tmp, root) = project("# Changelog\n");
        let options = GenerateOptions {
            include_all: true,
            ..GenerateOptions::default()
        };
        let p = plan(&root, &Config::default(), &options, &logs()).unwrap();
        assert_eq!(p.changes.len(), 3);
        assert!(p.preview.contains("### Miscellaneous\n\n- Merge branch 'x'"));
    }

    #[test]
    fn overrides_and_date() {
        let (_tmp, root) = project("# Changelog\n");
        let config = Config {
            date_format: Some("%Y-%m-%d".into()),
            ..Config::default()
        };
        let forced_part = GenerateOptions {
            version_part: Some(BumpLevel::Major),
            ..GenerateOptions::default()
        };
        let p = plan(&root, &config, &forced_part, &logs()).unwrap();
        assert_eq!(p.next, Version::new(2, 0, 0));
        assert_eq!(p.version_string, "v2.0.0 2024-03-09");

        let forced_tag = GenerateOptions {
            version_tag: Some("v5.0.1".into()),
            ..GenerateOptions::default()
        };
        let p = plan(&root, &Config::default(), &forced_tag, &logs()).unwrap();
        assert_eq!(p.next, Version::new(5, 0, 1));
        assert_eq!(p.bump, BumpLevel::Minor);
    }

    #[test]
    fn reject_empty() {
        let (_tmp, root) = project("# Changelog\n");
        let mut config = Config::default();
        assert!(plan(&root, &config, &GenerateOptions::default(), &[]).is_ok());

        config.release.reject_empty = true;
        assert!(matches!(
            plan(&root, &config, &GenerateOptions::default(), &[]),
            Err(GenerateError::Rejected)
        ));
    }

    #[test]
    fn dry_run_execute_writes_nothing_but_reports_issues() {
        let (_tmp, root) = project("# Changelog\n");
        let p = plan(&root, &Config::default(), &GenerateOptions::default(), &logs()).unwrap();
        let outcome = p.execute(&root, &Config::default(), true).unwrap();

        assert_eq!(
            fs::read_to_string(root.join("CHANGELOG.md")).unwrap(),
            "# Changelog\n"
        );
        let refs: Vec<_> = outcome.issue_refs.iter().map(|r| r.issue_ref.as_str()).collect();
        assert_eq!(refs, vec!["#1", "#2"]);
        assert!(!outcome.committed);
    }

    #[test]
    fn execute_writes_and_runs_hooks() {
        let (_tmp, root) = project("# Changelog\n\n## v1.0.0\n\n- Old\n");
        let config = Config {
            hooks: vec!["echo {prev_version} {version} > hook.txt".into()],
            ..Config::default()
        };
        let p = plan(&root, &config, &GenerateOptions::default(), &logs()).unwrap();
        let expected = p.document();
        let outcome = p.execute(&root, &config, false).unwrap();

        let written = fs::read_to_string(&outcome.changelog_path).unwrap();
        assert_eq!(written, expected);
        assert!(written.starts_with("# Changelog\n\n## v1.1.0\n"));
        assert!(written.ends_with("## v1.0.0\n\n- Old\n"));
        assert_eq!(
            fs::read_to_string(root.join("hook.txt")).unwrap().trim(),
            "1.0.0 1.1.0"
        );
        assert_eq!(outcome.hooks.len(), 1);
    }

    #[test]
    fn bad_config_fails_before_anything() {
        let (_tmp, root) = project("# Changelog\n");
        let config = Config {
            minor_regex: "(".into(),
            ..Config::default()
        };
        assert!(matches!(
            plan_generate(&root, &config, &GenerateOptions::default()),
            Err(GenerateError::Config(_))
        ));
    }

    #[test]
    fn missing_changelog() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        assert!(matches!(
            plan_generate(&root, &Config::default(), &GenerateOptions::default()),
            Err(GenerateError::NoChangelog)
        ));
    }

    #[test]
    fn messages() {
        assert_eq!(
            commit_message(&Version::new(1, 0, 0), &Version::new(1, 1, 0)),
            "Update CHANGELOG for 1.1.0\nBump version: 1.0.0 → 1.1.0"
        );
        let stats = ParseStats {
            commits: 4,
            conventional: 3,
        };
        assert_eq!(
            statistics_block(stats),
            "# Commit Statistics\n\n* 4 commits contributed to the release.\n* 3 commits were parsed as conventional.\n"
        );
    }
}
