//! Commit message classification.
//!
//! [`CommitClassifier`] turns raw commit messages into [`Change`] records.
//! Messages that do not follow the `type(scope)!: subject` convention are
//! dropped, or filed under `_misc` when include-all is on.

use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::change::{Change, Footer};
use crate::config::{Config, GithubConfig, MISC_TYPE, TypeHeaders};
use crate::error::{ConfigError, ConfigResult};
use crate::footer::{self, Extractor, FooterParser};
use crate::git::CommitLog;
use crate::link::{self, LinkGenerator};

/// Marker in a commit body that flags a breaking change.
const BREAKING_MARKER: &str = "BREAKING CHANGE";

/// Characters allowed in a subject; anything else starts the body.
const SUBJECT_CLASS: &str = r"[\w .,?`\-/()#]+";

/// Run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Commits seen.
    pub commits: usize,
    /// Commits that parsed as conventional.
    pub conventional: usize,
}

/// Parses commit messages against the configured types and rules.
#[derive(Debug)]
pub struct CommitClassifier {
    header_re: Regex,
    headers: TypeHeaders,
    footers: FooterParser,
    extractors: Vec<Extractor>,
    links: Vec<LinkGenerator>,
    github: GithubConfig,
    include_all: bool,
    stats: ParseStats,
}

impl CommitClassifier {
    /// Build a classifier from configuration.
    ///
    /// The type mapping is copied; with `include_all` the copy also gets the
    /// `_misc` fallback type.
    pub fn new(config: &Config, include_all: bool) -> ConfigResult<Self> {
        let headers = config.type_headers()?;
        let headers = if include_all {
            headers.with_misc()
        } else {
            headers
        };
        Ok(Self {
            header_re: header_regex(&headers)?,
            footers: FooterParser::from_config(config)?,
            extractors: Extractor::compile_all(&config.extractors)?,
            links: LinkGenerator::compile_all(&config.link_generators)?,
            github: config.github.clone(),
            include_all,
            stats: ParseStats::default(),
            headers,
        })
    }

    /// The type mapping in effect, including `_misc` under include-all.
    pub const fn type_headers(&self) -> &TypeHeaders {
        &self.headers
    }

    /// Counters accumulated so far.
    pub const fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Classify a single commit message.
    pub fn classify(
        &mut self,
        message: &str,
        short_hash: &str,
        commit_hash: &str,
    ) -> Option<Change> {
        self.stats.commits += 1;

        let Some(caps) = self.header_re.captures(message) else {
            return self.fallback(message, short_hash, commit_hash);
        };
        self.stats.conventional += 1;

        let group = |i| caps.get(i).map_or("", |m| m.as_str());
        let commit_type = group(1).to_lowercase();
        let Some(header) = self.headers.header_for(&commit_type) else {
            debug!(%commit_type, "type matched without a header");
            return None;
        };
        let rest = group(5);

        let mut description = group(4).trim().to_string();
        let mut pr_footer = None;
        if self.github.strip_pr_from_description
            && let Some((subject, number)) = split_pr_suffix(&description)
        {
            if self.github.extract_pr_from_description {
                pr_footer = Some(Footer::new("PR", ": ", format!("#{number}")));
            }
            description = subject.to_string();
        }

        let mut change = Change::new(header, description, commit_type, short_hash, commit_hash);
        change.scope = group(2)
            .trim_start_matches('(')
            .trim_end_matches(')')
            .to_string();
        change.breaking = caps.get(3).is_some() || rest.contains(BREAKING_MARKER);

        change.footers = self.footers.parse(rest);
        if let Some(pr) = pr_footer {
            change
                .footers
                .retain(|f| !f.footer.eq_ignore_ascii_case(&pr.footer));
            change.footers.insert(0, pr);
        }
        change.extractions = footer::extract(&self.extractors, &change.footers);
        change.links = link::generate_links(&self.links, &change);

        trace!(
            short_hash,
            commit_type = %change.commit_type,
            breaking = change.breaking,
            "classified commit"
        );
        Some(change)
    }

    fn fallback(&self, message: &str, short_hash: &str, commit_hash: &str) -> Option<Change> {
        if !self.include_all {
            debug!(short_hash, "skipping non-conventional commit");
            return None;
        }
        let header = self.headers.header_for(MISC_TYPE)?;
        let first_line = message.trim().lines().next().unwrap_or_default().trim();
        Some(Change::new(header, first_line, MISC_TYPE, short_hash, commit_hash))
    }

    /// Classify a batch of log entries, keeping their order.
    #[instrument(skip_all, fields(count = logs.len()))]
    pub fn classify_all(&mut self, logs: &[CommitLog]) -> Vec<Change> {
        let changes: Vec<Change> = logs
            .iter()
            .filter_map(|log| self.classify(&log.message, &log.short_hash, &log.commit_hash))
            .collect();
        debug!(
            commits = self.stats.commits,
            conventional = self.stats.conventional,
            changes = changes.len(),
            "classification finished"
        );
        changes
    }
}

/// `^(types)(\(scope\))?(!)?: (subject)(rest)`, case-insensitive.
fn header_regex(headers: &TypeHeaders) -> ConfigResult<Regex> {
    let mut types: Vec<&str> = headers.types().collect();
    // longest first so a type never shadows one it prefixes
    types.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let alternation = types
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    let pattern =
        format!(r"(?i)^({alternation})(\([\w\-\.]+\))?(!)?: ({SUBJECT_CLASS})([\s\S]*)");
    Regex::new(&pattern).map_err(|source| ConfigError::InvalidRegex {
        field: "commit_types".to_string(),
        source,
    })
}

/// Split `"Subject (#12)"` into `("Subject", "12")`.
fn split_pr_suffix(description: &str) -> Option<(&str, &str)> {
    let inner = description.strip_suffix(')')?;
    let (subject, number) = inner.rsplit_once("(#")?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((subject.trim_end(), number))
}
