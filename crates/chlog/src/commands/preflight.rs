//! Preflight command: show whether the repository is ready for a release.

use clap::Args;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use chlog_core::config::Config;
use chlog_core::preflight;

/// Arguments for the `preflight` subcommand.
#[derive(Args, Debug, Default)]
pub struct PreflightArgs {
    /// Check as if `allow_dirty` were set
    #[arg(long)]
    pub allow_dirty: bool,

    /// Check as if `allow_missing` were set
    #[arg(long)]
    pub allow_missing: bool,
}

/// Run the repository checks `generate` runs and display results.
#[instrument(name = "cmd_preflight", skip_all, fields(json_output))]
pub fn cmd_preflight(
    args: PreflightArgs,
    global_json: bool,
    config: &Config,
    _cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, "executing preflight command");

    let mut release = config.release.clone();
    release.allow_dirty |= args.allow_dirty;
    release.allow_missing |= args.allow_missing;
    let report = preflight::run_preflight(&release);

    if global_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", "Preflight Checks".bold().underline());
        println!();

        for check in &report.checks {
            let icon = if check.passed {
                "✓".green().to_string()
            } else {
                "✗".red().to_string()
            };
            println!("  {icon} {}: {}", check.name.bold(), check.message);
        }

        println!();
        if report.all_passed {
            println!("  {}", "Ready to generate.".green().bold());
        } else {
            let failed = report.checks.iter().filter(|c| !c.passed).count();
            println!(
                "  {}, fix the issues above or adjust [release] settings",
                format!("{failed} check(s) failed").red().bold(),
            );
        }
    }

    if report.all_passed {
        Ok(())
    } else {
        Err(anyhow::anyhow!("preflight checks failed"))
    }
}
