//! Changelog rendering and persistence.
//!
//! Each [`Change`] is rendered through the change template first, then the
//! grouped sections go through the release template. The result is prepended
//! to the existing document and written atomically.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write as _;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::change::Change;
use crate::config::{Config, TypeHeaders};
use crate::sections;

/// Errors from rendering or writing the changelog.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A template failed to parse or evaluate.
    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    /// Reading or writing the changelog failed.
    #[error("changelog I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The temporary file could not replace the changelog.
    #[error("failed to replace changelog: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// `init` found a changelog already in place.
    #[error("{0} already exists")]
    ChangelogExists(Utf8PathBuf),

    /// Not `md` or `rst`.
    #[error("unsupported changelog format '{0}' (expected md or rst)")]
    UnsupportedFormat(String),
}

/// Result alias for rendering.
pub type RenderResult<T> = Result<T, RenderError>;

// ──────────────────────────────────────────────
// Formats
// ──────────────────────────────────────────────

const MD_CHANGE: &str = r#"
-{% if change.scope %} (`{{change.scope}}`){% endif %}
{% if change.breaking %} **Breaking**{% endif %}
 {{ change.description }}
{% for footer in change.footers %}{% if footer.footer == "Authors" %} {{footer.value}}{% endif %}{% endfor %}
{% for link in change.links %} [[{{ link.text }}]({{ link.link }})]{% endfor %}
"#;

const MD_RELEASE: &str = r"## {{ version_string }}

{% for section in sections -%}
### {{ section.header }}

{% for change in section.changes -%}
{{ change.rendered }}
{% endfor %}
{% endfor %}
";

const RST_CHANGE: &str = r#"
*{% if change.scope %} (`{{change.scope}}`){% endif %}
{% if change.breaking %} **Breaking**{% endif %}
 {{ change.description }}
{% for footer in change.footers %}{% if footer.footer == "Authors" %} {{footer.value}}{% endif %}{% endfor %}
{% for link in change.links %} [`{{ link.text }}`_]{% endfor %}
"#;

const RST_RELEASE: &str = r#"{{ version_string }}
{{ version_string | underline(char="=") }}

{% for section in sections -%}
{{ section.header }}
{{ section.header | underline(char="-") }}

{% for change in section.changes -%}
{{ change.rendered }}

{% endfor %}
{% endfor %}
"#;

/// Changelog file format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown, `CHANGELOG.md`.
    #[default]
    Md,
    /// reStructuredText, `CHANGELOG.rst`.
    Rst,
}

impl OutputFormat {
    /// Every supported format, in detection order.
    pub const ALL: [Self; 2] = [Self::Md, Self::Rst];

    /// File extension without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Md => "md",
            Self::Rst => "rst",
        }
    }

    /// Changelog file name for this format.
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Md => "CHANGELOG.md",
            Self::Rst => "CHANGELOG.rst",
        }
    }

    /// Fixed block at the top of every changelog.
    pub const fn file_header(self) -> &'static str {
        match self {
            Self::Md => "# Changelog\n",
            Self::Rst => "=========\nChangelog\n=========\n",
        }
    }

    const fn header_lines(self) -> usize {
        match self {
            Self::Md => 1,
            Self::Rst => 3,
        }
    }

    /// Built-in change template.
    pub const fn default_change_template(self) -> &'static str {
        match self {
            Self::Md => MD_CHANGE,
            Self::Rst => RST_CHANGE,
        }
    }

    /// Built-in release template.
    pub const fn default_release_template(self) -> &'static str {
        match self {
            Self::Md => MD_RELEASE,
            Self::Rst => RST_RELEASE,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(s))
            .ok_or_else(|| RenderError::UnsupportedFormat(s.to_string()))
    }
}

/// The format of the changelog already present in `dir`, if any.
pub fn detect_format(dir: &Utf8Path) -> Option<OutputFormat> {
    let found = OutputFormat::ALL
        .into_iter()
        .find(|f| dir.join(f.file_name()).is_file());
    debug!(?found, %dir, "changelog format detection");
    found
}

/// Create an empty changelog (header only) in `dir`.
#[instrument]
pub fn init_changelog(dir: &Utf8Path, format: OutputFormat) -> RenderResult<Utf8PathBuf> {
    if let Some(existing) = detect_format(dir) {
        return Err(RenderError::ChangelogExists(dir.join(existing.file_name())));
    }
    let path = dir.join(format.file_name());
    persist(&path, format.file_header())?;
    info!(%path, "created changelog");
    Ok(path)
}

// ──────────────────────────────────────────────
// Template engine
// ──────────────────────────────────────────────

/// Evaluates a template string against a JSON context.
pub trait TemplateRenderer {
    /// Render `template` with `context` (a JSON object).
    fn render(&mut self, template: &str, context: &Value) -> RenderResult<String>;
}

/// [`TemplateRenderer`] backed by Tera, with the changelog filters registered.
pub struct TeraRenderer {
    tera: Tera,
}

impl fmt::Debug for TeraRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeraRenderer").finish_non_exhaustive()
    }
}

impl Default for TeraRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TeraRenderer {
    /// Tera without autoescaping, plus `regex_replace` and `underline` filters.
    pub fn new() -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_filter("regex_replace", regex_replace);
        tera.register_filter("underline", underline);
        Self { tera }
    }
}

impl TemplateRenderer for TeraRenderer {
    fn render(&mut self, template: &str, context: &Value) -> RenderResult<String> {
        let context = Context::from_value(context.clone())?;
        Ok(self.tera.render_str(template, &context)?)
    }
}

fn string_arg<'a>(
    filter: &str,
    args: &'a HashMap<String, Value>,
    name: &str,
) -> tera::Result<Option<&'a str>> {
    args.get(name)
        .map(|v| {
            v.as_str().ok_or_else(|| {
                tera::Error::msg(format!("filter `{filter}`: `{name}` must be a string"))
            })
        })
        .transpose()
}

/// `value | regex_replace(pattern="…", replace="…")`; `$1` refers to groups.
fn regex_replace(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("filter `regex_replace` expects a string"))?;
    let pattern = string_arg("regex_replace", args, "pattern")?
        .ok_or_else(|| tera::Error::msg("filter `regex_replace` requires `pattern`"))?;
    let replace = string_arg("regex_replace", args, "replace")?.unwrap_or_default();
    let re = Regex::new(pattern)
        .map_err(|e| tera::Error::msg(format!("filter `regex_replace`: {e}")))?;
    Ok(Value::String(re.replace_all(text, replace).into_owned()))
}

/// `value | underline(char="=")`: the character repeated to the value's width.
fn underline(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("filter `underline` expects a string"))?;
    let mark = string_arg("underline", args, "char")?.unwrap_or("=");
    Ok(Value::String(mark.repeat(text.chars().count())))
}

// ──────────────────────────────────────────────
// Writer
// ──────────────────────────────────────────────

/// Renders a release and merges it into a changelog document.
#[derive(Debug)]
pub struct ChangelogWriter<R = TeraRenderer> {
    path: Utf8PathBuf,
    format: OutputFormat,
    change_template: String,
    release_template: String,
    existing: String,
    release: Option<String>,
    links: BTreeMap<String, String>,
    renderer: R,
}

impl ChangelogWriter<TeraRenderer> {
    /// Writer for the changelog in `dir`, using the configured templates.
    pub fn open(dir: &Utf8Path, format: OutputFormat, config: &Config) -> RenderResult<Self> {
        Self::with_renderer(dir, format, config, TeraRenderer::new())
    }
}

impl<R: TemplateRenderer> ChangelogWriter<R> {
    /// Writer with a custom template engine.
    pub fn with_renderer(
        dir: &Utf8Path,
        format: OutputFormat,
        config: &Config,
        renderer: R,
    ) -> RenderResult<Self> {
        let path = dir.join(format.file_name());
        let existing = if path.is_file() {
            let content = std::fs::read_to_string(&path)?;
            existing_body(&content, format.header_lines()).to_string()
        } else {
            String::new()
        };
        debug!(%path, existing_bytes = existing.len(), "opened changelog");

        Ok(Self {
            path,
            format,
            change_template: config
                .change_template
                .clone()
                .unwrap_or_else(|| format.default_change_template().to_string()),
            release_template: config
                .release_template
                .clone()
                .unwrap_or_else(|| format.default_release_template().to_string()),
            existing,
            release: None,
            links: BTreeMap::new(),
            renderer,
        })
    }

    /// Destination path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Output format.
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render one change through the change template.
    ///
    /// Newlines in the template are dropped, so a change is always one line.
    pub fn render_change(&mut self, change: &Change) -> RenderResult<String> {
        let template = self.change_template.replace('\n', "");
        let line = self.renderer.render(&template, &json!({ "change": change }))?;
        if self.format == OutputFormat::Rst {
            for link in &change.links {
                self.links.insert(link.text.clone(), link.link.clone());
            }
        }
        Ok(line)
    }

    /// Render a release from `changes` and keep it for [`Self::document`].
    #[instrument(skip(self, headers, changes), fields(changes = changes.len()))]
    pub fn consume(
        &mut self,
        version_string: &str,
        headers: &TypeHeaders,
        changes: &mut [Change],
    ) -> RenderResult<&str> {
        for change in changes.iter_mut() {
            change.rendered = Some(self.render_change(change)?);
        }
        let sections = sections::group(changes, headers);
        debug!(sections = sections.len(), "grouped changes");
        let context = json!({
            "version_string": version_string,
            "sections": sections,
        });
        let rendered = self.renderer.render(&self.release_template, &context)?;
        let mut release = rendered.trim_end().to_string();
        release.push('\n');
        Ok(self.release.insert(release).as_str())
    }

    /// The last rendered release, if any.
    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    /// The full document: header, new release, then the previous body.
    pub fn document(&self) -> String {
        let mut doc = String::from(self.format.file_header());
        doc.push('\n');
        if let Some(release) = &self.release {
            doc.push_str(release);
        }
        if !self.existing.is_empty() {
            doc.push('\n');
            doc.push_str(&self.existing);
        }

        let targets: Vec<String> = self
            .links
            .iter()
            .map(|(text, link)| format!(".. _`{text}`: {link}"))
            .filter(|target| !doc.contains(target.as_str()))
            .collect();
        if !targets.is_empty() {
            let needs_gap = !doc
                .trim_end()
                .lines()
                .last()
                .unwrap_or_default()
                .starts_with(".. _");
            if !doc.ends_with('\n') {
                doc.push('\n');
            }
            if needs_gap {
                doc.push('\n');
            }
            for target in targets {
                doc.push_str(&target);
                doc.push('\n');
            }
        }
        doc
    }

    /// Write the document. A dry run writes nothing.
    #[instrument(skip(self), fields(path = %self.path))]
    pub fn write(&self, dry_run: bool) -> RenderResult<Utf8PathBuf> {
        if dry_run {
            info!("dry run, not writing changelog");
            return Ok(self.path.clone());
        }
        persist(&self.path, &self.document())?;
        info!("changelog written");
        Ok(self.path.clone())
    }
}

/// Everything after the file header block and one separating line.
fn existing_body(content: &str, header_lines: usize) -> &str {
    let mut rest = content;
    for _ in 0..=header_lines {
        match rest.split_once('\n') {
            Some((_, tail)) => rest = tail,
            None => return "",
        }
    }
    rest
}

/// Write `content` to a sibling temp file, then rename it over `path`.
fn persist(path: &Utf8Path, content: &str) -> RenderResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}
