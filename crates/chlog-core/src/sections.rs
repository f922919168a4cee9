//! Grouping changes into sections and deriving the version bump.

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::change::{Change, sort_for_display};
use crate::config::{Config, TypeHeaders};
use crate::error::{ConfigError, ConfigResult};
use crate::version::BumpLevel;

/// Changes listed under one header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Section header.
    pub header: String,
    /// Changes in display order.
    pub changes: Vec<Change>,
}

/// Group changes by header, in the mapping's declared order.
///
/// Within a section changes keep their arrival order and are then sorted for
/// display. Headers without changes are left out.
pub fn group(changes: &[Change], headers: &TypeHeaders) -> Vec<Section> {
    headers
        .headers()
        .into_iter()
        .filter_map(|header| {
            let mut members: Vec<Change> = changes
                .iter()
                .filter(|c| c.header == header)
                .cloned()
                .collect();
            if members.is_empty() {
                return None;
            }
            sort_for_display(&mut members);
            Some(Section {
                header: header.to_string(),
                changes: members,
            })
        })
        .collect()
}

/// Maps a commit type to the bump it implies.
#[derive(Debug, Clone)]
pub struct SemverRule {
    minor: Regex,
    overrides: IndexMap<String, BumpLevel>,
}

impl SemverRule {
    /// Types matching `minor_regex` at their start are minor, others patch.
    pub fn new(minor_regex: &str) -> ConfigResult<Self> {
        let minor = Regex::new(&format!("^(?:{minor_regex})")).map_err(|source| {
            ConfigError::InvalidRegex {
                field: "minor_regex".to_string(),
                source,
            }
        })?;
        Ok(Self {
            minor,
            overrides: IndexMap::new(),
        })
    }

    /// The rule from `minor_regex` plus explicit per-type `semver` settings.
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        let mut rule = Self::new(&config.minor_regex)?;
        rule.overrides = config
            .resolved_commit_types()?
            .into_iter()
            .filter_map(|ct| ct.semver.map(|level| (ct.name, level)))
            .collect();
        Ok(rule)
    }

    /// Bump level for a commit type, ignoring breaking flags.
    pub fn level_for(&self, commit_type: &str) -> BumpLevel {
        if let Some(level) = self.overrides.get(commit_type) {
            return *level;
        }
        if self.minor.is_match(commit_type) {
            BumpLevel::Minor
        } else {
            BumpLevel::Patch
        }
    }
}

/// The bump a set of changes calls for.
///
/// The highest level across all changes, major if any change is breaking,
/// then one rank lower while `current_version` is still `0.x`.
pub fn bump(changes: &[Change], rule: &SemverRule, current_version: &str) -> BumpLevel {
    let mut level = BumpLevel::Patch;
    for change in changes {
        level = level.max(rule.level_for(&change.commit_type));
        if change.breaking {
            level = BumpLevel::Major;
        }
    }
    if current_version.starts_with("0.") {
        let downgraded = level.downgrade();
        debug!(from = %level, to = %downgraded, "pre-1.0 version, downgrading bump");
        level = downgraded;
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(commit_type: &str, header: &str, description: &str) -> Change {
        Change::new(header, description, commit_type, "a", "b")
    }

    fn headers() -> TypeHeaders {
        TypeHeaders::from_pairs([("feat", "Features"), ("fix", "Bug fixes")])
    }

    #[test]
    fn sections_follow_declared_order() {
        let changes = vec![change("fix", "Bug fixes", "A"), change("feat", "Features", "B")];
        let sections = group(&changes, &headers());

        let names: Vec<_> = sections.iter().map(|s| s.header.as_str()).collect();
        assert_eq!(names, vec!["Features", "Bug fixes"]);
        assert_eq!(sections[0].changes[0].description, "B");
    }

    #[test]
    fn empty_sections_are_omitted() {
        let sections = group(&[change("fix", "Bug fixes", "A")], &headers());
        assert_eq!(sections.len(), 1);
        assert!(group(&[], &headers()).is_empty());
    }

    #[test]
    fn shared_header_makes_one_section() {
        let headers = TypeHeaders::from_pairs([
            ("fix", "Bug fixes"),
            ("bug", "Bug fixes"),
            ("feat", "Features"),
        ]);
        let changes = vec![
            change("bug", "Bug fixes", "one"),
            change("feat", "Features", "two"),
            change("fix", "Bug fixes", "three"),
        ];
        let sections = group(&changes, &headers);
        assert_eq!(sections.len(), 2);
        let fixes: Vec<_> = sections[0]
            .changes
            .iter()
            .map(|c| c.description.as_str())
            .collect();
        assert_eq!(fixes, vec!["one", "three"]);
    }

    #[test]
    fn regrouping_is_stable() {
        let changes = vec![
            change("fix", "Bug fixes", "A"),
            change("feat", "Features", "B"),
            change("fix", "Bug fixes", "C"),
        ];
        let first = group(&changes, &headers());
        let flat: Vec<Change> = first.iter().flat_map(|s| s.changes.clone()).collect();
        assert_eq!(group(&flat, &headers()), first);
    }

    #[test]
    fn highest_level_wins() {
        let rule = SemverRule::new("feat").unwrap();
        let changes = vec![change("fix", "", "A"), change("feat", "", "B")];
        assert_eq!(bump(&changes, &rule, "1.0.0"), BumpLevel::Minor);
        assert_eq!(bump(&changes[..1], &rule, "1.0.0"), BumpLevel::Patch);
        assert_eq!(bump(&[], &rule, "1.0.0"), BumpLevel::Patch);
    }

    #[test]
    fn breaking_forces_major() {
        let rule = SemverRule::new("feat").unwrap();
        let mut breaking = change("fix", "", "A");
        breaking.breaking = true;
        let changes = vec![breaking, change("feat", "", "B")];
        assert_eq!(bump(&changes, &rule, "1.0.0"), BumpLevel::Major);
    }

    #[test]
    fn zero_major_downgrades_one_rank() {
        let rule = SemverRule::new("feat").unwrap();
        let mut breaking = change("fix", "", "A");
        breaking.breaking = true;
        assert_eq!(bump(&[breaking], &rule, "0.1.0"), BumpLevel::Minor);
        assert_eq!(
            bump(&[change("feat", "", "B")], &rule, "0.1.0"),
            BumpLevel::Patch
        );
        assert_eq!(
            bump(&[change("fix", "", "C")], &rule, "0.1.0"),
            BumpLevel::Patch
        );
    }

    #[test]
    fn minor_regex_anchors_at_start() {
        let rule = SemverRule::new("feat|perf").unwrap();
        assert_eq!(rule.level_for("perf"), BumpLevel::Minor);
        assert_eq!(rule.level_for("feature"), BumpLevel::Minor);
        assert_eq!(rule.level_for("xfeat"), BumpLevel::Patch);
    }

    #[test]
    fn explicit_semver_overrides_regex() {
        let mut config = Config::default();
        config.commit_types.push(crate::config::CommitType {
            name: "feat".into(),
            header: "Features and Improvements".into(),
            semver: Some(BumpLevel::Patch),
        });
        config.commit_types.push(crate::config::CommitType {
            name: "remove".into(),
            header: "Removals".into(),
            semver: Some(BumpLevel::Major),
        });
        let rule = SemverRule::from_config(&config).unwrap();
        assert_eq!(rule.level_for("feat"), BumpLevel::Patch);
        assert_eq!(rule.level_for("remove"), BumpLevel::Major);
        assert_eq!(rule.level_for("fix"), BumpLevel::Patch);
    }

    #[test]
    fn end_to_end_grouping_and_bump() {
        let mut config = Config::default();
        for (name, header) in [("feat", "Features"), ("fix", "Bug fixes")] {
            config.commit_types.push(crate::config::CommitType {
                name: name.into(),
                header: header.into(),
                semver: None,
            });
        }
        let mut classifier = crate::classify::CommitClassifier::new(&config, false).unwrap();
        let changes: Vec<Change> = ["fix: A\n\nRefs: #1", "feat: B\n\nRefs: #2"]
            .iter()
            .filter_map(|m| classifier.classify(m, "a", "b"))
            .collect();

        let sections = group(&changes, classifier.type_headers());
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].header, "Features");
        assert_eq!(sections[0].changes[0].description, "B");
        assert_eq!(sections[1].header, "Bug fixes");
        assert_eq!(sections[1].changes[0].description, "A");

        let rule = SemverRule::from_config(&config).unwrap();
        assert_eq!(bump(&changes, &rule, "1.0.0"), BumpLevel::Minor);
    }
}
