//! Core library for chlog.
//!
//! Turns conventional-commit history into changelog releases: commits are
//! classified into [`Change`]s, grouped into sections, assigned a semver bump
//! and rendered through Tera templates into `CHANGELOG.md` or `CHANGELOG.rst`.
//!
//! # Modules
//!
//! - [`change`] - The change record and its display ordering
//! - [`classify`] - Commit message parsing
//! - [`config`] - Configuration loading and management
//! - [`error`] - Configuration error types and result aliases
//! - [`footer`] - Footer parsing and value extraction
//! - [`generate`] - The plan/execute generate workflow
//! - [`git`] - Git operations
//! - [`hooks`] - Post-write shell hooks
//! - [`link`] - Link generation from extracted values
//! - [`post_process`] - Per-issue webhook notifications
//! - [`preflight`] - Repository checks
//! - [`render`] - Templates and changelog persistence
//! - [`sections`] - Grouping and semver derivation
//! - [`version`] - Version determination and formatting
//!
//! # Quick Start
//!
//! ```no_run
//! use chlog_core::{CommitClassifier, ConfigLoader, sections};
//!
//! let config = ConfigLoader::new()
//!     .with_user_config(true)
//!     .load()
//!     .expect("Failed to load configuration");
//!
//! let mut classifier = CommitClassifier::new(&config, false).expect("valid config");
//! let change = classifier.classify("feat(api): Add endpoint\n\nRefs: #12", "abc1234", "abc1234def");
//! let grouped = sections::group(change.as_slice(), classifier.type_headers());
//! println!("{} section(s)", grouped.len());
//! ```
#![deny(unsafe_code)]

pub mod change;

pub mod classify;

pub mod config;

pub mod error;

pub mod footer;

pub mod generate;

pub mod git;

pub mod hooks;

pub mod link;

pub mod post_process;

pub mod preflight;

pub mod render;

pub mod sections;

pub mod version;

pub use change::{Change, Footer, Link};

pub use classify::{CommitClassifier, ParseStats};

pub use config::{Config, ConfigLoader, LogLevel};

pub use error::{ConfigError, ConfigResult};

pub use render::OutputFormat;

pub use version::BumpLevel;

// Re-export semver so downstream crates don't need a direct dependency.
pub use semver;
