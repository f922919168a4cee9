//! Configuration loading, discovery, and validation.
//!
//! This module provides configuration file discovery by:
//! 1. Walking up from the current directory to find project config
//! 2. Loading user config from XDG config directory
//! 3. Merging with sensible defaults
//!
//! # Supported formats
//!
//! - TOML (`.toml`)
//! - YAML (`.yaml`, `.yml`)
//! - JSON (`.json`)
//!
//! # Config file locations (in order of precedence, highest first):
//! - `.chlog.<ext>` in current directory or any parent
//! - `chlog.<ext>` in current directory or any parent
//! - `~/.config/chlog/config.<ext>` (user config)
//!
//! # Example
//! ```no_run
//! use camino::Utf8PathBuf;
//! use chlog_core::config::ConfigLoader;
//!
//! let cwd = Utf8PathBuf::from(".");
//! let config = ConfigLoader::new()
//!     .with_project_search(&cwd)
//!     .load()
//!     .unwrap();
//! config.validate().unwrap();
//! ```

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::format::{Item, StrftimeItems};
use figment::Figment;
use figment::providers::{Format, Json, Serialized, Toml, Yaml};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::render::OutputFormat;
use crate::version::BumpLevel;

/// Commit type assigned to non-conventional commits under `--include-all`.
pub const MISC_TYPE: &str = "_misc";

/// Section header used for [`MISC_TYPE`].
pub const MISC_HEADER: &str = "Miscellaneous";

/// Replacement tokens understood by post-processing.
const SUPPORTED_REPLACE: &[&str] = &["::issue_ref::", "::version::", "::commit_hash::"];

/// Built-in commit types and their section headers, in display order.
const BUILTIN_TYPES: &[(&str, &str)] = &[
    ("feat", "Features and Improvements"),
    ("fix", "Bug fixes"),
    ("bug", "Bug fixes"),
    ("docs", "Documentation"),
    ("chore", "Miscellaneous"),
    ("ci", "Miscellaneous"),
    ("perf", "Miscellaneous"),
    ("refactor", "Miscellaneous"),
    ("revert", "Miscellaneous"),
    ("style", "Miscellaneous"),
    ("test", "Miscellaneous"),
];

/// The configuration for chlog.
///
/// Deserialized from config files found during discovery (TOML, YAML, or JSON).
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log level for the application (e.g., "debug", "info", "warn", "error").
    pub log_level: LogLevel,
    /// Directory for JSONL log files (falls back to platform defaults if unset).
    pub log_dir: Option<Utf8PathBuf>,
    /// Version the next release is computed from. Defaults to the latest `v*` tag.
    pub current_version: Option<String>,
    /// Heading and tag format; `{new_version}` is replaced.
    pub version_string: String,
    /// strftime pattern appended to the version heading.
    pub date_format: Option<String>,
    /// Output format when no changelog exists yet.
    pub format: Option<OutputFormat>,
    /// Commit types layered over the built-in set.
    pub commit_types: Vec<CommitType>,
    /// Commit types matching this pattern (at their start) bump the minor version.
    pub minor_regex: String,
    /// Footer patterns, each with label, separator, and value groups.
    pub footer_parsers: Vec<String>,
    /// Rules pulling named values out of footers.
    pub extractors: Vec<ExtractorRule>,
    /// Rules turning extracted values into links.
    pub link_generators: Vec<LinkRule>,
    /// GitHub conventions.
    pub github: GithubConfig,
    /// Tera template for a single change line.
    pub change_template: Option<String>,
    /// Tera template for a whole release section.
    pub release_template: Option<String>,
    /// Repository and git behaviour.
    pub release: ReleaseConfig,
    /// Shell commands run after the changelog is written.
    ///
    /// Supports `{version}`, `{prev_version}`, `{tag}` and `{changelog_path}`.
    pub hooks: Vec<String>,
    /// Per-issue webhook notifications.
    pub post_process: Option<PostProcessConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_dir: None,
            current_version: None,
            version_string: "v{new_version}".to_string(),
            date_format: None,
            format: None,
            commit_types: Vec::new(),
            minor_regex: "feat".to_string(),
            footer_parsers: vec![
                r"(Refs)(: )(#?[\w-]+)".to_string(),
                r"(Authors)(: )(.*)".to_string(),
            ],
            extractors: Vec::new(),
            link_generators: Vec::new(),
            github: GithubConfig::default(),
            change_template: None,
            release_template: None,
            release: ReleaseConfig::default(),
            hooks: Vec::new(),
            post_process: None,
        }
    }
}

/// A commit type and the section it is listed under.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CommitType {
    /// The type token, e.g. `feat`.
    #[serde(rename = "type")]
    pub name: String,
    /// Section header.
    pub header: String,
    /// Explicit bump level, overriding `minor_regex`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver: Option<BumpLevel>,
}

/// Footer selector for an extractor: one label or several.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FooterSelector {
    /// A single footer label.
    One(String),
    /// Any of several footer labels.
    Many(Vec<String>),
}

impl FooterSelector {
    /// The selected labels.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            Self::One(label) => vec![label.as_str()],
            Self::Many(labels) => labels.iter().map(String::as_str).collect(),
        }
    }
}

/// `{footer, pattern}` extraction rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExtractorRule {
    /// Footer label(s) the pattern runs against.
    pub footer: FooterSelector,
    /// Pattern with named groups.
    pub pattern: String,
}

/// `{source, link, text}` link rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LinkRule {
    /// Extraction key, or `__change__` for the whole change.
    pub source: String,
    /// URL template.
    pub link: String,
    /// Display text template (default `{0}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// GitHub-specific conveniences.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GithubConfig {
    /// Strip a trailing `(#123)` from descriptions.
    pub strip_pr_from_description: bool,
    /// Record the stripped number as a `PR` footer.
    pub extract_pr_from_description: bool,
    /// Recognize `closes #1`, `fixed #2`, `resolves #3` and friends.
    pub extract_common_footers: bool,
}

/// Repository checks and git actions around a release.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Commit the changelog (and hook edits) after writing.
    pub commit: bool,
    /// Tag the release commit with the version string.
    pub tag: bool,
    /// Proceed with uncommitted changes in the working tree.
    pub allow_dirty: bool,
    /// Proceed when local and remote have diverged.
    pub allow_missing: bool,
    /// Refuse to release when there are no changes.
    pub reject_empty: bool,
    /// Branches releases may be cut from (empty = any).
    pub allowed_branches: Vec<String>,
}

/// HTTP authentication scheme for post-processing.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// `user:api_key` basic auth.
    #[default]
    Basic,
    /// Bearer token.
    Bearer,
}

/// Webhook fired once per referenced issue after a release.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Endpoint; may contain `::issue_ref::` and `::version::`.
    pub url: Option<String>,
    /// HTTP method.
    pub verb: String,
    /// Request body; may contain `::issue_ref::` and `::version::`.
    pub body: String,
    /// How `auth_env` is interpreted.
    pub auth_type: AuthType,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Environment variable holding credentials.
    pub auth_env: Option<String>,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            url: None,
            verb: "POST".to_string(),
            body: r#"{"body": "Released on ::version::"}"#.to_string(),
            auth_type: AuthType::default(),
            headers: BTreeMap::new(),
            auth_env: None,
        }
    }
}

/// Log level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose output for debugging and development.
    Debug,
    /// Standard operational information (default).
    #[default]
    Info,
    /// Warnings about potential issues.
    Warn,
    /// Errors that indicate failures.
    Error,
}

impl LogLevel {
    /// Returns the log level as a lowercase string slice.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

// ──────────────────────────────────────────────
// Type → header mapping
// ──────────────────────────────────────────────

/// Ordered commit type → section header mapping.
///
/// Declaration order decides section order in the rendered changelog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeHeaders(IndexMap<String, String>);

impl TypeHeaders {
    /// Build a mapping from `(type, header)` pairs, keeping their order.
    pub fn from_pairs<I, T, H>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, H)>,
        T: Into<String>,
        H: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(t, h)| (t.into().to_lowercase(), h.into()))
                .collect(),
        )
    }

    /// Header for a commit type, if it is configured.
    pub fn header_for(&self, commit_type: &str) -> Option<&str> {
        self.0.get(commit_type).map(String::as_str)
    }

    /// Configured commit types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Section headers in declaration order, duplicates removed.
    pub fn headers(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for header in self.0.values() {
            if !seen.contains(&header.as_str()) {
                seen.push(header.as_str());
            }
        }
        seen
    }

    /// A copy with the include-all fallback type added.
    pub fn with_misc(&self) -> Self {
        let mut copy = self.clone();
        copy.0
            .entry(MISC_TYPE.to_string())
            .or_insert_with(|| MISC_HEADER.to_string());
        copy
    }

    /// Number of configured types.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no types are configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Config {
    /// Built-in commit types overlaid with the configured ones.
    ///
    /// A configured type replaces the built-in entry of the same name in place;
    /// new types are appended in the order they are declared.
    pub fn resolved_commit_types(&self) -> ConfigResult<Vec<CommitType>> {
        let mut resolved: Vec<CommitType> = BUILTIN_TYPES
            .iter()
            .map(|(name, header)| CommitType {
                name: (*name).to_string(),
                header: (*header).to_string(),
                semver: None,
            })
            .collect();

        let mut declared: IndexMap<String, &CommitType> = IndexMap::new();
        for ct in &self.commit_types {
            let key = ct.name.to_lowercase();
            if let Some(previous) = declared.get(&key)
                && previous.header != ct.header
            {
                return Err(ConfigError::ConflictingType {
                    commit_type: key,
                    first: previous.header.clone(),
                    second: ct.header.clone(),
                });
            }
            declared.insert(key, ct);
        }

        for (key, ct) in declared {
            let entry = CommitType {
                name: key.clone(),
                header: ct.header.clone(),
                semver: ct.semver,
            };
            match resolved.iter_mut().find(|existing| existing.name == key) {
                Some(existing) => *existing = entry,
                None => resolved.push(entry),
            }
        }

        Ok(resolved)
    }

    /// The ordered type → header mapping.
    pub fn type_headers(&self) -> ConfigResult<TypeHeaders> {
        Ok(TypeHeaders::from_pairs(
            self.resolved_commit_types()?
                .into_iter()
                .map(|ct| (ct.name, ct.header)),
        ))
    }

    /// Check every pattern, template and replacement token.
    ///
    /// Runs the same compilation the classifier uses, so a config that
    /// validates will not fail later during parsing.
    #[tracing::instrument(skip(self))]
    pub fn validate(&self) -> ConfigResult<()> {
        self.type_headers()?;
        crate::footer::FooterParser::from_config(self)?;
        crate::footer::Extractor::compile_all(&self.extractors)?;
        crate::link::LinkGenerator::compile_all(&self.link_generators)?;
        crate::sections::SemverRule::from_config(self)?;
        self.date_items()?;
        if let Some(pp) = &self.post_process {
            check_replace_tokens(pp.url.as_deref().unwrap_or_default())?;
            check_replace_tokens(&pp.body)?;
        }
        tracing::debug!("configuration valid");
        Ok(())
    }

    /// Parsed `date_format`, if one is set and non-empty.
    pub fn date_items(&self) -> ConfigResult<Option<Vec<Item<'_>>>> {
        let Some(fmt) = self.date_format.as_deref().filter(|f| !f.is_empty()) else {
            return Ok(None);
        };
        let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidDateFormat(fmt.to_string()));
        }
        Ok(Some(items))
    }
}

/// Reject `::token::` placeholders that post-processing cannot fill.
pub fn check_replace_tokens(value: &str) -> ConfigResult<()> {
    let mut unsupported: Vec<String> = replace_tokens(value)
        .filter(|token| !SUPPORTED_REPLACE.contains(token))
        .map(str::to_string)
        .collect();
    unsupported.sort();
    unsupported.dedup();

    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedReplace {
            tokens: unsupported,
        })
    }
}

/// Non-overlapping `::name::` spans, left to right.
fn replace_tokens(value: &str) -> impl Iterator<Item = &str> {
    let mut rest = 0;
    std::iter::from_fn(move || {
        let start = rest + value[rest..].find("::")?;
        let end = start + 2 + value[start + 2..].find("::")? + 2;
        rest = end;
        Some(&value[start..end])
    })
}

// ──────────────────────────────────────────────
// Loader
// ──────────────────────────────────────────────

/// Supported configuration file extensions (in order of preference).
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Application name for XDG directory lookup and config file names.
const APP_NAME: &str = "chlog";

/// Builder for loading configuration from multiple sources.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Starting directory for project config search.
    project_search_root: Option<Utf8PathBuf>,
    /// Whether to include user config from XDG directory.
    include_user_config: bool,
    /// Stop searching when we hit a directory containing this file/dir.
    boundary_marker: Option<String>,
    /// Explicit config files to load (for testing or programmatic use).
    explicit_files: Vec<Utf8PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default settings.
    pub fn new() -> Self {
        Self {
            project_search_root: None,
            include_user_config: true,
            boundary_marker: Some(".git".to_string()),
            explicit_files: Vec::new(),
        }
    }

    /// Set the starting directory for project config search.
    pub fn with_project_search<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.project_search_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set whether to include user config from `~/.config/chlog/`.
    pub const fn with_user_config(mut self, include: bool) -> Self {
        self.include_user_config = include;
        self
    }

    /// Stop walking up at a directory containing `marker` (default `.git`).
    pub fn with_boundary_marker<S: Into<String>>(mut self, marker: S) -> Self {
        self.boundary_marker = Some(marker.into());
        self
    }

    /// Disable boundary marker (search all the way to filesystem root).
    pub fn without_boundary_marker(mut self) -> Self {
        self.boundary_marker = None;
        self
    }

    /// Add an explicit config file; later files take precedence.
    pub fn with_file<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.explicit_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration, merging all discovered sources.
    ///
    /// Precedence (highest to lowest):
    /// 1. Explicit files (in order added via `with_file`)
    /// 2. Project config (closest to search root)
    /// 3. User config (`~/.config/chlog/config.<ext>`)
    /// 4. Default values
    #[tracing::instrument(skip(self), fields(search_root = ?self.project_search_root))]
    pub fn load(self) -> ConfigResult<Config> {
        tracing::debug!("loading configuration");
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if self.include_user_config
            && let Some(user_config) = find_user_config()
        {
            figment = merge_file(figment, &user_config);
        }

        if let Some(ref root) = self.project_search_root
            && let Some(project_config) = self.find_project_config(root)
        {
            figment = merge_file(figment, &project_config);
        }

        for file in &self.explicit_files {
            figment = merge_file(figment, file);
        }

        let config: Config = figment
            .extract()
            .map_err(|e| ConfigError::Deserialize(Box::new(e)))?;
        tracing::info!(
            log_level = config.log_level.as_str(),
            commit_types = config.commit_types.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration, returning an error if no config file is found.
    pub fn load_or_error(self) -> ConfigResult<Config> {
        let has_user = self.include_user_config && find_user_config().is_some();
        let has_project = self
            .project_search_root
            .as_ref()
            .and_then(|root| self.find_project_config(root))
            .is_some();
        let has_explicit = !self.explicit_files.is_empty();

        if !has_user && !has_project && !has_explicit {
            return Err(ConfigError::NotFound);
        }

        self.load()
    }

    /// Find project config by walking up from the given directory.
    fn find_project_config(&self, start: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            for ext in CONFIG_EXTENSIONS {
                let dotfile = dir.join(format!(".{APP_NAME}.{ext}"));
                if dotfile.is_file() {
                    return Some(dotfile);
                }

                let regular = dir.join(format!("{APP_NAME}.{ext}"));
                if regular.is_file() {
                    return Some(regular);
                }
            }

            // The directory holding the marker is the last one searched
            if let Some(ref marker) = self.boundary_marker
                && dir.join(marker).exists()
            {
                break;
            }

            current = dir.parent().map(Utf8Path::to_path_buf);
        }

        None
    }
}

/// Find user config in the XDG config directory.
fn find_user_config() -> Option<Utf8PathBuf> {
    let config_dir = user_config_dir()?;
    CONFIG_EXTENSIONS
        .iter()
        .map(|ext| config_dir.join(format!("config.{ext}")))
        .find(|path| path.is_file())
}

/// Merge a config file into the figment, detecting format from extension.
fn merge_file(figment: Figment, path: &Utf8Path) -> Figment {
    match path.extension() {
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path.as_str())),
        Some("json") => figment.merge(Json::file_exact(path.as_str())),
        _ => figment.merge(Toml::file_exact(path.as_str())),
    }
}

/// The project config file [`ConfigLoader::load`] would pick up from `start`.
pub fn find_project_config<P: AsRef<Utf8Path>>(start: P) -> Option<Utf8PathBuf> {
    ConfigLoader::new().find_project_config(start.as_ref())
}

/// The user config directory (`~/.config/chlog/` on Linux).
pub fn user_config_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("", "", APP_NAME)?;
    Utf8PathBuf::from_path_buf(proj_dirs.config_dir().to_path_buf()).ok()
}
