//! Command implementations

pub mod config;

pub mod generate;

pub mod init;

pub mod preflight;


use std::io::IsTerminal;

use anyhow::Context;
use camino::Utf8Path;
use chlog_core::OutputFormat;
use chlog_core::config::Config;
use chlog_core::render;
use inquire::Confirm;

/// Format to render with: flag, then the existing changelog, then config, then markdown.
pub fn resolve_format(flag: Option<OutputFormat>, config: &Config, cwd: &Utf8Path) -> OutputFormat {
    flag.or_else(|| render::detect_format(cwd))
        .or(config.format)
        .unwrap_or_default()
}

/// Ask a yes/no question; `true` without asking when stdin is not a terminal.
pub fn confirm(question: &str) -> anyhow::Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    Confirm::new(question)
        .with_default(true)
        .prompt()
        .context("confirmation prompt failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_precedence() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = camino::Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let config = Config {
            format: Some(OutputFormat::Rst),
            ..Config::default()
        };

        assert_eq!(resolve_format(None, &Config::default(), &cwd), OutputFormat::Md);
        assert_eq!(resolve_format(None, &config, &cwd), OutputFormat::Rst);

        std::fs::write(cwd.join("CHANGELOG.md"), "# Changelog\n").unwrap();
        assert_eq!(resolve_format(None, &config, &cwd), OutputFormat::Md);
        assert_eq!(
            resolve_format(Some(OutputFormat::Rst), &config, &cwd),
            OutputFormat::Rst
        );
    }
}
