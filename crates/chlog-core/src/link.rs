//! Link generation from extracted values.
//!
//! Templates use positional placeholders: `{0}` is the value being linked,
//! and `{0.field}` reads a field of the change when the rule's source is
//! [`CHANGE_SOURCE`]. Literal braces are written `{{` and `}}`.

use tracing::{debug, warn};

use crate::change::{Change, Link};
use crate::config::LinkRule;
use crate::error::{ConfigError, ConfigResult};

/// Source name that links the whole change instead of an extraction.
pub const CHANGE_SOURCE: &str = "__change__";

/// Default display text: the value itself.
const DEFAULT_TEXT: &str = "{0}";

/// Change fields addressable as `{0.field}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeField {
    ShortHash,
    CommitHash,
    CommitType,
    Scope,
    Description,
    Header,
    IssueRef,
}

impl ChangeField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "short_hash" => Self::ShortHash,
            "commit_hash" => Self::CommitHash,
            "commit_type" => Self::CommitType,
            "scope" => Self::Scope,
            "description" => Self::Description,
            "header" => Self::Header,
            "issue_ref" => Self::IssueRef,
            _ => return None,
        })
    }

    fn read(self, change: &Change) -> &str {
        match self {
            Self::ShortHash => &change.short_hash,
            Self::CommitHash => &change.commit_hash,
            Self::CommitType => &change.commit_type,
            Self::Scope => &change.scope,
            Self::Description => &change.description,
            Self::Header => &change.header,
            Self::IssueRef => change.issue_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value,
    Field(ChangeField),
}

/// A parsed link or text template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTemplate {
    segments: Vec<Segment>,
}

impl LinkTemplate {
    /// Parse `template`. Field access is only allowed when `whole_change` is set.
    pub fn parse(template: &str, whole_change: bool) -> ConfigResult<Self> {
        let invalid = |reason: &str| ConfigError::InvalidLinkTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(invalid("single '}' encountered")),
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(invalid("unclosed '{' in placeholder")),
                            Some(ch) => name.push(ch),
                        }
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_placeholder(&name, whole_change).map_err(|r| invalid(&r))?);
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Substitute `value` (and fields of `change`) into the template.
    pub fn render(&self, value: &str, change: &Change) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Value => out.push_str(value),
                Segment::Field(field) => out.push_str(field.read(change)),
            }
        }
        out
    }
}

fn parse_placeholder(name: &str, whole_change: bool) -> Result<Segment, String> {
    let (index, field) = match name.split_once('.') {
        Some((index, field)) => (index, Some(field)),
        None => (name, None),
    };
    if !index.is_empty() && index != "0" {
        return Err(format!("only positional argument 0 is available, found '{{{name}}}'"));
    }
    match field {
        None => Ok(Segment::Value),
        Some(_) if !whole_change => Err(format!(
            "field access '{{{name}}}' requires source '{CHANGE_SOURCE}'"
        )),
        Some(field) => ChangeField::parse(field)
            .map(Segment::Field)
            .ok_or_else(|| format!("unknown change field '{field}'")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkSource {
    Change,
    Extraction(String),
}

/// A compiled `{source, link, text}` rule.
#[derive(Debug, Clone)]
pub struct LinkGenerator {
    source: LinkSource,
    link: LinkTemplate,
    text: LinkTemplate,
}

impl LinkGenerator {
    /// Compile a rule, parsing both of its templates.
    pub fn compile(rule: &LinkRule) -> ConfigResult<Self> {
        let whole_change = rule.source == CHANGE_SOURCE;
        let source = if whole_change {
            LinkSource::Change
        } else {
            LinkSource::Extraction(rule.source.clone())
        };
        Ok(Self {
            source,
            link: LinkTemplate::parse(&rule.link, whole_change)?,
            text: LinkTemplate::parse(rule.text.as_deref().unwrap_or(DEFAULT_TEXT), whole_change)?,
        })
    }

    /// Compile every rule with a non-empty source, in order.
    pub fn compile_all(rules: &[LinkRule]) -> ConfigResult<Vec<Self>> {
        rules
            .iter()
            .filter(|rule| {
                if rule.source.is_empty() {
                    warn!(link = %rule.link, "skipping link generator without a source");
                }
                !rule.source.is_empty()
            })
            .map(Self::compile)
            .collect()
    }

    /// Links for `change`. Empty when the source has no values.
    pub fn generate(&self, change: &Change) -> Vec<Link> {
        let values: Vec<&str> = match &self.source {
            LinkSource::Change => vec![change.short_hash.as_str()],
            LinkSource::Extraction(key) => change
                .extractions
                .get(key)
                .map(|values| values.iter().map(String::as_str).collect())
                .unwrap_or_default(),
        };
        if values.is_empty() {
            debug!(source = ?self.source, "no values for link source");
        }
        values
            .into_iter()
            .map(|value| {
                Link::new(
                    self.text.render(value, change),
                    self.link.render(value, change),
                )
            })
            .collect()
    }
}

/// Run every generator over `change`, in rule order.
pub fn generate_links(generators: &[LinkGenerator], change: &Change) -> Vec<Link> {
    generators.iter().flat_map(|g| g.generate(change)).collect()
}
