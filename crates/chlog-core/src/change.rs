//! Classified commit records and their display order.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Footer keys that identify the issue a change refers to.
const ISSUE_REF_KEYS: &[&str] = &["refs", "closes", "fixes"];

/// A recognized metadata line from a commit body, e.g. `Refs: #12`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footer {
    /// Label as written in the commit (`Refs`, `closes`, ...).
    pub footer: String,
    /// The literal separator text that was matched (`": "` or `" "`).
    pub separator: String,
    /// Everything after the separator.
    pub value: String,
}

impl Footer {
    /// Build a footer from its three parts.
    pub fn new(
        footer: impl Into<String>,
        separator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            footer: footer.into(),
            separator: separator.into(),
            value: value.into(),
        }
    }
}

/// A rendered hyperlink attached to a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Display text.
    pub text: String,
    /// Target URL.
    pub link: String,
}

impl Link {
    /// Build a link from display text and target.
    pub fn new(text: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: link.into(),
        }
    }
}

/// One classified commit.
///
/// Built once by the classifier. Only [`Change::rendered`] is filled in
/// afterwards, by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Section header this change is listed under.
    pub header: String,
    /// Subject line of the commit.
    pub description: String,
    /// Lower-cased commit type, or `_misc` for include-all fallbacks.
    pub commit_type: String,
    /// Abbreviated commit hash.
    pub short_hash: String,
    /// Full commit hash.
    pub commit_hash: String,
    /// Scope without parentheses; empty when absent.
    pub scope: String,
    /// Whether the commit is flagged as a breaking change.
    pub breaking: bool,
    /// Recognized footers, first occurrence per label.
    pub footers: Vec<Footer>,
    /// Values pulled out of footers, keyed by named capture group.
    pub extractions: IndexMap<String, Vec<String>>,
    /// Links generated from extractions.
    pub links: Vec<Link>,
    /// Output of the change template, once rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
}

impl Change {
    /// Create a bare change with no scope, footers, or links.
    pub fn new(
        header: impl Into<String>,
        description: impl Into<String>,
        commit_type: impl Into<String>,
        short_hash: impl Into<String>,
        commit_hash: impl Into<String>,
    ) -> Self {
        Self {
            header: header.into(),
            description: description.into(),
            commit_type: commit_type.into(),
            short_hash: short_hash.into(),
            commit_hash: commit_hash.into(),
            scope: String::new(),
            breaking: false,
            footers: Vec::new(),
            extractions: IndexMap::new(),
            links: Vec::new(),
            rendered: None,
        }
    }

    /// Value of the first `Refs`/`Closes`/`Fixes` footer, or `""`.
    pub fn issue_ref(&self) -> &str {
        self.footers
            .iter()
            .find(|f| {
                ISSUE_REF_KEYS
                    .iter()
                    .any(|key| f.footer.eq_ignore_ascii_case(key))
            })
            .map_or("", |f| f.value.as_str())
    }

    /// Compare two changes for display within a section.
    ///
    /// Breaking changes first, then scoped changes by scope (unscoped last),
    /// then by issue reference. All string comparisons ignore case.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }

    fn sort_key(&self) -> (bool, (bool, String), String) {
        let scope = if self.scope.is_empty() {
            (true, String::new())
        } else {
            (false, self.scope.to_lowercase())
        };
        (!self.breaking, scope, self.issue_ref().to_lowercase())
    }
}

/// Stable in-place sort by [`Change::display_cmp`]. Ties keep arrival order.
pub fn sort_for_display(changes: &mut [Change]) {
    changes.sort_by(Change::display_cmp);
}
