//! Footer recognition and value extraction.
//!
//! A [`FooterParser`] scans commit body lines against an ordered list of
//! three-group patterns (label, separator, value). An [`Extractor`] then runs
//! a named-group pattern over recognized footer values and collects the
//! captures into a change's `extractions`.

use indexmap::IndexMap;
use regex::Regex;
use tracing::debug;

use crate::change::Footer;
use crate::config::{Config, ExtractorRule};
use crate::error::{ConfigError, ConfigResult};

/// `closes #1`, `fixed #2`, `resolves #3` and the other close/fix/resolve forms.
pub const COMMON_FOOTER: &str =
    r"(close|closes|closed|fix|fixes|fixed|resolve|resolves|resolved)( )(#[\w-]+)";

/// Ordered, case-insensitive footer patterns.
#[derive(Debug, Clone)]
pub struct FooterParser {
    patterns: Vec<Regex>,
}

impl FooterParser {
    /// Compile footer patterns. Each must have exactly three capture groups.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> ConfigResult<Self> {
        let patterns = patterns
            .iter()
            .enumerate()
            .map(|(i, p)| compile_footer(p.as_ref(), i))
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// The configured parsers, plus the common close/fix/resolve set when
    /// `github.extract_common_footers` is on.
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        let mut patterns: Vec<&str> = config.footer_parsers.iter().map(String::as_str).collect();
        if config.github.extract_common_footers {
            patterns.push(COMMON_FOOTER);
        }
        Self::new(&patterns)
    }

    /// First pattern matching `line`, split into a [`Footer`].
    pub fn parse_line(&self, line: &str) -> Option<Footer> {
        let line = line.trim_end_matches('\r');
        self.patterns.iter().find_map(|re| {
            let caps = re.captures(line)?;
            let group = |i| caps.get(i).map_or("", |m| m.as_str());
            Some(Footer::new(group(1), group(2), group(3)))
        })
    }

    /// All footers in `body`, keeping only the first occurrence of each label.
    pub fn parse(&self, body: &str) -> Vec<Footer> {
        let mut footers: Vec<Footer> = Vec::new();
        for footer in body.lines().filter_map(|line| self.parse_line(line)) {
            if footers
                .iter()
                .any(|seen| seen.footer.eq_ignore_ascii_case(&footer.footer))
            {
                debug!(label = %footer.footer, "ignoring repeated footer");
                continue;
            }
            footers.push(footer);
        }
        footers
    }
}

fn compile_footer(pattern: &str, index: usize) -> ConfigResult<Regex> {
    let re = Regex::new(&format!("(?i)^(?:{pattern})")).map_err(|source| {
        ConfigError::InvalidRegex {
            field: format!("footer_parsers[{index}]"),
            source,
        }
    })?;
    let found = re.captures_len() - 1;
    if found != 3 {
        return Err(ConfigError::FooterGroups {
            pattern: pattern.to_string(),
            found,
        });
    }
    Ok(re)
}

// ──────────────────────────────────────────────
// Extraction
// ──────────────────────────────────────────────

/// A compiled `{footer, pattern}` rule.
#[derive(Debug, Clone)]
pub struct Extractor {
    labels: Vec<String>,
    pattern: Regex,
}

impl Extractor {
    /// Compile a single rule. `index` names the rule in error messages.
    pub fn compile(rule: &ExtractorRule, index: usize) -> ConfigResult<Self> {
        let pattern = Regex::new(&rule.pattern).map_err(|source| ConfigError::InvalidRegex {
            field: format!("extractors[{index}]"),
            source,
        })?;
        Ok(Self {
            labels: rule.footer.labels().into_iter().map(str::to_string).collect(),
            pattern,
        })
    }

    /// Compile every rule in order.
    pub fn compile_all(rules: &[ExtractorRule]) -> ConfigResult<Vec<Self>> {
        rules
            .iter()
            .enumerate()
            .map(|(i, rule)| Self::compile(rule, i))
            .collect()
    }

    fn selects(&self, footer: &Footer) -> bool {
        self.labels
            .iter()
            .any(|label| label.eq_ignore_ascii_case(&footer.footer))
    }

    /// Append every named capture from matching footers to `out`.
    pub fn apply(&self, footers: &[Footer], out: &mut IndexMap<String, Vec<String>>) {
        for footer in footers.iter().filter(|f| self.selects(f)) {
            for caps in self.pattern.captures_iter(&footer.value) {
                for name in self.pattern.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        out.entry(name.to_string())
                            .or_default()
                            .push(m.as_str().to_string());
                    }
                }
            }
        }
    }
}

/// Run every extractor over `footers`, in rule order.
pub fn extract(extractors: &[Extractor], footers: &[Footer]) -> IndexMap<String, Vec<String>> {
    let mut out = IndexMap::new();
    for extractor in extractors {
        extractor.apply(footers, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FooterSelector;

    fn default_parser() -> FooterParser {
        FooterParser::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn matches_case_insensitively() {
        let footer = default_parser().parse_line("refs: #12").unwrap();
        assert_eq!(footer, Footer::new("refs", ": ", "#12"));
    }

    #[test]
    fn non_footer_line_is_none() {
        assert!(default_parser().parse_line("Just some prose").is_none());
        assert!(default_parser().parse_line("  Refs: #1").is_none());
    }

    #[test]
    fn first_label_occurrence_wins() {
        let body = "\nRefs: #1\nAuthors: @a\nrefs: #2\n";
        let footers = default_parser().parse(body);
        assert_eq!(
            footers,
            vec![Footer::new("Refs", ": ", "#1"), Footer::new("Authors", ": ", "@a")]
        );
    }

    #[test]
    fn first_pattern_wins_per_line() {
        let parser = FooterParser::new(&[r"(Refs)(: )(#\d+)", r"(Refs)(: )(.*)"]).unwrap();
        let footer = parser.parse_line("Refs: #4 extra").unwrap();
        assert_eq!(footer.value, "#4");
    }

    #[test]
    fn common_footers_only_when_enabled() {
        assert!(default_parser().parse_line("closes #7").is_none());

        let mut config = Config::default();
        config.github.extract_common_footers = true;
        let parser = FooterParser::from_config(&config).unwrap();
        assert_eq!(
            parser.parse_line("Resolved #7").unwrap(),
            Footer::new("Resolved", " ", "#7")
        );
    }

    #[test]
    fn rejects_wrong_group_count() {
        let err = FooterParser::new(&[r"(Refs): (.*)"]).unwrap_err();
        assert!(matches!(err, ConfigError::FooterGroups { found: 2, .. }));
    }

    #[test]
    fn rejects_bad_regex() {
        let err = FooterParser::new(&[r"(Refs"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
    }

    #[test]
    fn extractor_collects_named_groups_in_match_order() {
        let rules = vec![ExtractorRule {
            footer: FooterSelector::One("refs".into()),
            pattern: r"#(?P<issue_ref>\d+)".into(),
        }];
        let extractors = Extractor::compile_all(&rules).unwrap();
        let footers = vec![Footer::new("Refs", ": ", "#1, #2")];

        let out = extract(&extractors, &footers);
        assert_eq!(out["issue_ref"], vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn extractor_with_several_footers() {
        let rules = vec![
            ExtractorRule {
                footer: FooterSelector::Many(vec!["Refs".into(), "closes".into()]),
                pattern: r"#(?P<issue_ref>\d+)".into(),
            },
            ExtractorRule {
                footer: FooterSelector::One("Authors".into()),
                pattern: r"@(?P<author>\w+)".into(),
            },
        ];
        let extractors = Extractor::compile_all(&rules).unwrap();
        let footers = vec![
            Footer::new("Authors", ": ", "@ann @bob"),
            Footer::new("Refs", ": ", "#3"),
            Footer::new("closes", " ", "#4"),
        ];

        let out = extract(&extractors, &footers);
        let keys: Vec<_> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["issue_ref", "author"]);
        assert_eq!(out["issue_ref"], vec!["3".to_string(), "4".to_string()]);
        assert_eq!(out["author"], vec!["ann".to_string(), "bob".to_string()]);
    }

    #[test]
    fn extractor_for_missing_footer_contributes_nothing() {
        let rules = vec![ExtractorRule {
            footer: FooterSelector::One("Jira".into()),
            pattern: r"(?P<ticket>[A-Z]+-\d+)".into(),
        }];
        let extractors = Extractor::compile_all(&rules).unwrap();
        let out = extract(&extractors, &[Footer::new("Refs", ": ", "#1")]);
        assert!(out.is_empty());
    }
}
