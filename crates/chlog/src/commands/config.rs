//! Config command: print the effective configuration.

use anyhow::{Context, bail};
use clap::Args;
use serde_json::Value;
use tracing::{debug, instrument};

use chlog_core::config::{self, Config};

/// Arguments for the `config` subcommand.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Only show this setting (dotted path, e.g. `release.commit`)
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,
}

/// Print the merged configuration as YAML, or JSON with `--json`.
#[instrument(name = "cmd_config", skip_all, fields(json_output))]
pub fn cmd_config(
    args: ConfigArgs,
    global_json: bool,
    config: &Config,
    cwd: &camino::Utf8Path,
) -> anyhow::Result<()> {
    debug!(json_output = global_json, key = ?args.key, "executing config command");

    config.validate().context("configuration is invalid")?;
    let full = serde_json::to_value(config)?;
    let value = match args.key.as_deref() {
        Some(key) => lookup(&full, key)?.clone(),
        None => full,
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if args.key.is_none()
        && let Some(source) = config::find_project_config(cwd)
    {
        println!("# {source}");
    }
    match &value {
        Value::String(s) => println!("{s}"),
        other => print!("{}", serde_saphyr::to_string(other)?),
    }
    Ok(())
}

/// Follow a dotted path into a JSON value.
fn lookup<'a>(value: &'a Value, key: &str) -> anyhow::Result<&'a Value> {
    let pointer = format!("/{}", key.replace('.', "/"));
    match value.pointer(&pointer) {
        Some(found) => Ok(found),
        None => bail!("unknown configuration key '{key}'"),
    }
}
