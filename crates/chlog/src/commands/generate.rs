//! Generate command: thin CLI layer over `chlog_core::generate`.

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use chlog_core::BumpLevel;
use chlog_core::config::{Config, PostProcessConfig};
use chlog_core::generate::{self, GenerateError, GenerateOptions, GenerateOutcome};
use chlog_core::post_process::{self, DispatchReport, PostProcessRequest};

/// Arguments for the `generate` subcommand.
#[derive(Args, Debug, Default)]
pub struct GenerateArgs {
    /// Use this version instead of computing one (e.g. "1.2.3")
    #[arg(long, value_name = "VERSION")]
    pub version_tag: Option<String>,

    /// Use this bump instead of computing one
    #[arg(long, value_enum, value_name = "PART")]
    pub version_part: Option<BumpLevel>,

    /// strftime format appended to the release heading (empty for none)
    #[arg(long, value_name = "FORMAT")]
    pub date_format: Option<String>,

    /// Endpoint for per-issue release notifications
    #[arg(long, value_name = "URL")]
    pub post_process_url: Option<String>,

    /// Environment variable holding the notification credentials
    #[arg(long, value_name = "VAR")]
    pub post_process_auth_env: Option<String>,

    /// Don't write anything, show what would happen
    #[arg(long)]
    pub dry_run: bool,

    /// Include non-conventional commits under "Miscellaneous"
    #[arg(long)]
    pub include_all: bool,

    /// Stop when there are no changes to release
    #[arg(long)]
    pub reject_empty: bool,

    /// Allow uncommitted changes in the working tree
    #[arg(long)]
    pub allow_dirty: bool,

    /// Allow local and remote branches to have diverged
    #[arg(long)]
    pub allow_missing: bool,

    /// Commit the updated changelog
    #[arg(long)]
    pub commit: bool,

    /// Tag the release commit (implies --commit)
    #[arg(long)]
    pub tag: bool,

    /// Print commit statistics after generating
    #[arg(long)]
    pub statistics: bool,

    /// Write without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

impl GenerateArgs {
    /// Layer command-line switches over the loaded configuration.
    ///
    /// Flags only ever turn settings on; they never disable a configured one.
    fn apply(&self, config: &Config) -> Config {
        let mut config = config.clone();
        let release = &mut config.release;
        release.reject_empty |= self.reject_empty;
        release.allow_dirty |= self.allow_dirty;
        release.allow_missing |= self.allow_missing;
        release.tag |= self.tag;
        release.commit |= self.commit || self.tag;

        if let Some(date_format) = &self.date_format {
            config.date_format = Some(date_format.clone());
        }
        if self.post_process_url.is_some() || self.post_process_auth_env.is_some() {
            let pp = config
                .post_process
                .get_or_insert_with(PostProcessConfig::default);
            if let Some(url) = &self.post_process_url {
                pp.url = Some(url.clone());
            }
            if let Some(var) = &self.post_process_auth_env {
                pp.auth_env = Some(var.clone());
            }
        }
        config
    }

    fn options(&self) -> GenerateOptions {
        GenerateOptions {
            dry_run: self.dry_run,
            include_all: self.include_all,
            version_tag: self.version_tag.clone(),
            version_part: self.version_part,
        }
    }
}

/// `--json` output of a generate run.
#[derive(Debug, Serialize)]
struct GenerateOutput {
    dry_run: bool,
    plan: Option<serde_json::Value>,
    outcome: GenerateOutcome,
    post_process: Option<DispatchReport>,
}

/// Plan, preview, confirm, write, then post-process.
#[instrument(name = "cmd_generate", skip_all, fields(json_output))]
pub fn cmd_generate(
    args: GenerateArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, dry_run = args.dry_run, "executing generate command");

    let config = args.apply(config);
    let plan = match generate::plan_generate(cwd, &config, &args.options()) {
        Ok(plan) => plan,
        Err(GenerateError::Rejected) => {
            // Nothing to release is not a failure
            eprintln!("{}", GenerateError::Rejected.to_string().yellow());
            return Ok(());
        }
        Err(e) => return Err(e).context("changelog generation failed"),
    };

    if !global_json {
        println!(
            "{}: {} → {} ({})",
            "Version".bold(),
            plan.previous.to_string().dimmed(),
            plan.next.to_string().green().bold(),
            plan.bump,
        );
        println!();
        println!("{}", plan.preview);
    }

    let ask = !(args.dry_run || args.yes || global_json);
    if ask
        && !super::confirm(&format!(
            "Write CHANGELOG for suggested version {}",
            plan.next
        ))?
    {
        println!("{}", "Cancelled.".yellow());
        return Ok(());
    }

    let plan_json = global_json
        .then(|| serde_json::to_value(&plan))
        .transpose()?;
    let outcome = plan
        .execute(cwd, &config, args.dry_run)
        .context("failed to write changelog")?;

    let report = match &config.post_process {
        Some(pp) => {
            let version = outcome.version.to_string();
            let requests = post_process::plan_requests(pp, &outcome.issue_refs, &version);
            notify_issues(pp, &requests, args.dry_run, global_json)?
        }
        None => None,
    };

    if global_json {
        let out = GenerateOutput {
            dry_run: args.dry_run,
            plan: plan_json,
            outcome,
            post_process: report,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_outcome(&outcome, args.dry_run);
        if args.statistics {
            println!();
            println!("{}", generate::statistics_block(outcome.stats));
        }
    }
    Ok(())
}

/// Send (or on a dry run, list) the per-issue requests.
fn notify_issues(
    cfg: &PostProcessConfig,
    requests: &[PostProcessRequest],
    dry_run: bool,
    global_json: bool,
) -> anyhow::Result<Option<DispatchReport>> {
    if requests.is_empty() {
        debug!("no post-process requests");
        return Ok(None);
    }
    if dry_run {
        for request in requests {
            info!(verb = %request.verb, url = %request.url, "would send post-process request");
            if !global_json {
                println!(
                    "{} {} {} {}",
                    "Would request:".dimmed(),
                    request.verb,
                    request.url.cyan(),
                    request.body.dimmed()
                );
            }
        }
        return Ok(None);
    }

    let spinner = (!global_json).then(|| {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Notifying {} issue(s)...", requests.len()));
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    });
    let report = post_process::dispatch(cfg, requests);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let report = report.context("post-processing failed")?;

    if !global_json {
        for failed in &report.failed {
            warn!(url = %failed.url, "notification failed");
            println!("  {} {} {}", "✗".red(), failed.url, failed.reason.dimmed());
        }
        println!(
            "  {} {} notification(s) sent",
            "✓".green(),
            report.sent
        );
    }
    Ok(Some(report))
}

fn print_outcome(outcome: &GenerateOutcome, dry_run: bool) {
    if dry_run {
        println!("{}", "Dry run, no changes made.".yellow());
        return;
    }
    println!(
        "  {} Wrote {}",
        "✓".green(),
        outcome.changelog_path.cyan()
    );
    for hook in &outcome.hooks {
        println!("  {} {}", "→".dimmed(), hook.command.dimmed());
    }
    if outcome.committed {
        println!("  {} Committed release", "✓".green());
    }
    if outcome.tagged {
        println!(
            "  {} Tagged {}",
            "✓".green(),
            outcome.version_tag.green().bold()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_enable_settings() {
        let args = GenerateArgs {
            tag: true,
            allow_dirty: true,
            date_format: Some("%Y".into()),
            post_process_url: Some("https://x/::issue_ref::".into()),
            ..GenerateArgs::default()
        };
        let config = args.apply(&Config::default());
        assert!(config.release.tag);
        assert!(config.release.commit);
        assert!(config.release.allow_dirty);
        assert!(!config.release.allow_missing);
        assert_eq!(config.date_format.as_deref(), Some("%Y"));
        let pp = config.post_process.unwrap();
        assert_eq!(pp.url.as_deref(), Some("https://x/::issue_ref::"));
        assert_eq!(pp.verb, "POST");
    }

    #[test]
    fn flags_never_disable_config() {
        let mut base = Config::default();
        base.release.reject_empty = true;
        let config = GenerateArgs::default().apply(&base);
        assert!(config.release.reject_empty);
        assert!(config.post_process.is_none());
    }
}
