//! Post-write hook commands.
//!
//! Hooks are shell commands from the `hooks` setting. They run in order after
//! the changelog is written and before anything is committed, so a hook that
//! bumps a version file gets its edit into the release commit.
//!
//! Commands support `{var}` interpolation for `{version}`, `{prev_version}`,
//! `{tag}` and `{changelog_path}`.

use std::process::Command;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from hook execution.
#[derive(Error, Debug)]
pub enum HookError {
    /// A hook command exited with a non-zero status.
    #[error("hook command failed: {command}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code, if available.
        exit_code: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },

    /// Failed to spawn a hook command.
    #[error("failed to execute hook: {0}")]
    Exec(#[from] std::io::Error),
}

/// Result alias for hook operations.
pub type HookResult<T> = Result<T, HookError>;

/// Variables available for interpolation in hook commands.
#[derive(Debug, Clone, Serialize)]
pub struct HookContext {
    /// The new version (e.g., `1.2.3`).
    pub version: String,
    /// The version released before it (e.g., `1.1.0`).
    pub prev_version: String,
    /// The formatted version string / tag (e.g., `v1.2.3`).
    pub tag: String,
    /// Path to the changelog file.
    pub changelog_path: String,
}

/// Result of running a single hook command.
#[derive(Debug, Clone, Serialize)]
pub struct HookOutput {
    /// The original command (before interpolation).
    pub command: String,
    /// Captured stdout.
    pub stdout: String,
    /// How long the command took to run.
    pub duration: Duration,
}

/// Run hook commands one after another.
///
/// Stops at the first failing command and returns its error; commands after
/// it do not run.
#[instrument(skip_all, fields(count = commands.len()))]
pub fn run_hooks(
    commands: &[String],
    context: &HookContext,
    project_root: &Utf8Path,
) -> HookResult<Vec<HookOutput>> {
    commands
        .iter()
        .map(|cmd| run_single(cmd, context, project_root))
        .collect()
}

fn run_single(cmd: &str, context: &HookContext, project_root: &Utf8Path) -> HookResult<HookOutput> {
    let interpolated = interpolate_command(cmd, context);
    debug!(%interpolated, "running hook");

    let start = Instant::now();
    let output = Command::new("sh")
        .args(["-c", &interpolated])
        .current_dir(project_root.as_std_path())
        .output()?;
    let duration = start.elapsed();

    if !output.status.success() {
        return Err(HookError::CommandFailed {
            command: cmd.to_string(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    debug!(?duration, "hook finished");
    Ok(HookOutput {
        command: cmd.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        duration,
    })
}

/// Replace `{var}` placeholders with values from the context.
///
/// Public so dry runs can show what would be executed.
pub fn interpolate_command(command: &str, context: &HookContext) -> String {
    command
        .replace("{version}", &context.version)
        .replace("{prev_version}", &context.prev_version)
        .replace("{tag}", &context.tag)
        .replace("{changelog_path}", &context.changelog_path)
}
