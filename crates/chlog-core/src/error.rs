//! Error types for chlog-core

use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
///
/// Every variant is fatal: validation runs before any commit is parsed, so a
/// bad pattern or template never produces a partially generated changelog.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] Box<figment::Error>),

    /// Configuration file not found after searching all locations.
    #[error("no configuration file found")]
    NotFound,

    /// A `::token::` replacement that nothing knows how to fill in.
    #[error("Replace string(s) ('{}') not supported.", .tokens.join("', '"))]
    UnsupportedReplace {
        /// The offending tokens, sorted.
        tokens: Vec<String>,
    },

    /// A configured pattern failed to compile.
    #[error("invalid regex in {field}: {source}")]
    InvalidRegex {
        /// Which setting held the pattern (e.g. `footer_parsers[1]`).
        field: String,
        /// The compile error.
        #[source]
        source: regex::Error,
    },

    /// A footer parser must capture label, separator and value.
    #[error("footer parser '{pattern}' must have exactly 3 capture groups, found {found}")]
    FooterGroups {
        /// The pattern as written in config.
        pattern: String,
        /// How many groups it actually has.
        found: usize,
    },

    /// A link generator template uses an unknown placeholder.
    #[error("invalid link template '{template}': {reason}")]
    InvalidLinkTemplate {
        /// The template as written in config.
        template: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The strftime pattern could not be parsed.
    #[error("invalid date_format '{0}'")]
    InvalidDateFormat(String),

    /// The same commit type was declared with two different headers.
    #[error("commit type '{commit_type}' declared with headers '{first}' and '{second}'")]
    ConflictingType {
        /// The duplicated type.
        commit_type: String,
        /// Header from the first declaration.
        first: String,
        /// Header from the second declaration.
        second: String,
    },
}

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;
