//! Init command: create an empty changelog.

use anyhow::Context;
use clap::Args;
use owo_colors::OwoColorize;
use tracing::{debug, instrument};

use chlog_core::OutputFormat;
use chlog_core::config::Config;
use chlog_core::render;

/// Arguments for the `init` subcommand.
#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Changelog format (defaults to the `format` setting, then md)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

/// Create `CHANGELOG.md` or `CHANGELOG.rst` with just the header.
#[instrument(name = "cmd_init", skip_all, fields(json_output))]
pub fn cmd_init(
    args: InitArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    let format = args.format.or(config.format).unwrap_or_default();
    debug!(json_output = global_json, %format, "executing init command");

    let path = render::init_changelog(cwd, format).context("failed to create changelog")?;

    if global_json {
        let out = serde_json::json!({ "path": path, "format": format });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{} Created {}", "✓".green(), path.cyan());
    }
    Ok(())
}
