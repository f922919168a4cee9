//! Version determination and formatting.
//!
//! The current version comes from configuration, then the latest `v*` tag,
//! then `0.0.0`. The next version applies the bump derived from the changes
//! (or one forced by the caller) and is formatted through `version_string`.

use std::str::FromStr;

use chrono::format::Item;
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Placeholder replaced in `version_string`.
const NEW_VERSION_TOKEN: &str = "{new_version}";

/// Errors from version operations.
#[derive(Error, Debug)]
pub enum VersionError {
    /// Failed to parse a semver string.
    #[error("invalid semver: {0}")]
    InvalidSemver(#[from] semver::Error),

    /// Not a recognized bump level.
    #[error("unknown bump level '{0}' (expected patch, minor or major)")]
    InvalidLevel(String),

    /// A git operation failed.
    #[error("git error: {0}")]
    Git(#[from] crate::git::GitError),
}

/// Result alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// Semver bump level, ordered `Patch < Minor < Major`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BumpLevel {
    /// Patch release (x.y.Z).
    Patch,
    /// Minor release (x.Y.0).
    Minor,
    /// Major release (X.0.0).
    Major,
}

impl BumpLevel {
    /// One rank lower; patch stays patch.
    pub const fn downgrade(self) -> Self {
        match self {
            Self::Major => Self::Minor,
            Self::Minor | Self::Patch => Self::Patch,
        }
    }

    /// The level as a lowercase keyword.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }
}

impl std::fmt::Display for BumpLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BumpLevel {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "patch" => Ok(Self::Patch),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            _ => Err(VersionError::InvalidLevel(s.to_string())),
        }
    }
}

/// Compute the next version by applying a bump level.
pub const fn next_version(current: &Version, level: BumpLevel) -> Version {
    match level {
        BumpLevel::Patch => Version::new(current.major, current.minor, current.patch + 1),
        BumpLevel::Minor => Version::new(current.major, current.minor + 1, 0),
        BumpLevel::Major => Version::new(current.major + 1, 0, 0),
    }
}

/// Parse a version string, stripping an optional `v` prefix.
pub fn parse_version(s: &str) -> VersionResult<Version> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);
    Ok(Version::parse(s)?)
}

/// Get the current version from git tags.
///
/// Returns `None` if no version tags exist (first release).
pub fn current_version_from_tags() -> VersionResult<Option<Version>> {
    let tag = crate::git::latest_version_tag()?;
    match tag {
        Some(t) => Ok(Some(parse_version(&t)?)),
        None => Ok(None),
    }
}

/// The version a release is computed from.
///
/// `configured` wins; otherwise the latest tag; otherwise `0.0.0`.
#[instrument]
pub fn resolve_current_version(configured: Option<&str>) -> VersionResult<Version> {
    if let Some(configured) = configured {
        return parse_version(configured);
    }
    let version = current_version_from_tags()?.unwrap_or_else(|| Version::new(0, 0, 0));
    debug!(%version, "current version from tags");
    Ok(version)
}

/// Substitute `version` into a `version_string` template such as `v{new_version}`.
pub fn format_version_string(template: &str, version: &Version) -> String {
    template.replace(NEW_VERSION_TOKEN, &version.to_string())
}

/// Release heading: the version string, then the date when a format is set.
pub fn release_heading(
    version_string: &str,
    date: Option<&[Item<'_>]>,
    now: DateTime<Utc>,
) -> String {
    match date {
        Some(items) => format!("{version_string} {}", now.format_with_items(items.iter())),
        None => version_string.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::format::StrftimeItems;

    #[test]
    fn bump_patch() {
        let v = Version::new(1, 2, 3);
        assert_eq!(next_version(&v, BumpLevel::Patch), Version::new(1, 2, 4));
    }

    #[test]
    fn bump_minor() {
        let v = Version::new(1, 2, 3);
        assert_eq!(next_version(&v, BumpLevel::Minor), Version::new(1, 3, 0));
    }

    #[test]
    fn bump_major() {
        let v = Version::new(1, 2, 3);
        assert_eq!(next_version(&v, BumpLevel::Major), Version::new(2, 0, 0));
    }

    #[test]
    fn parse_with_and_without_prefix() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("1.2.3\n").unwrap(), Version::new(1, 2, 3));
        assert!(parse_version("not-a-version").is_err());
    }

    #[test]
    fn levels_are_ordered() {
        assert!(BumpLevel::Patch < BumpLevel::Minor);
        assert!(BumpLevel::Minor < BumpLevel::Major);
        assert_eq!(BumpLevel::Patch.max(BumpLevel::Major), BumpLevel::Major);
    }

    #[test]
    fn downgrade_steps_one_rank() {
        assert_eq!(BumpLevel::Major.downgrade(), BumpLevel::Minor);
        assert_eq!(BumpLevel::Minor.downgrade(), BumpLevel::Patch);
        assert_eq!(BumpLevel::Patch.downgrade(), BumpLevel::Patch);
    }

    #[test]
    fn level_from_str() {
        assert_eq!("Minor".parse::<BumpLevel>().unwrap(), BumpLevel::Minor);
        assert!(matches!(
            "huge".parse::<BumpLevel>(),
            Err(VersionError::InvalidLevel(_))
        ));
    }

    #[test]
    fn configured_version_wins() {
        let v = resolve_current_version(Some("0.4.1")).unwrap();
        assert_eq!(v, Version::new(0, 4, 1));
    }

    #[test]
    fn version_string_template() {
        let v = Version::new(1, 4, 0);
        assert_eq!(format_version_string("v{new_version}", &v), "v1.4.0");
        assert_eq!(format_version_string("release-{new_version}", &v), "release-1.4.0");
    }

    #[test]
    fn heading_with_date() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let items: Vec<Item<'_>> = StrftimeItems::new("%Y-%m-%d").collect();
        assert_eq!(release_heading("v1.0.0", Some(&items), now), "v1.0.0 2024-03-09");
        assert_eq!(release_heading("v1.0.0", None, now), "v1.0.0");
    }
}
