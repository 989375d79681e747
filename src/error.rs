// src/error.rs

//! Error types for debslim
//!
//! Library code returns [`Result`]; per-package failures are turned into
//! outcome values by the caller before they ever reach the CLI.

use thiserror::Error;

/// Main error type for debslim operations
#[derive(Error, Debug)]
pub enum Error {
    /// Setup failure (missing inputs, unusable working directory)
    #[error("Initialization error: {0}")]
    InitError(String),

    /// I/O error with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// Raw I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Malformed input file
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration file is invalid or incomplete
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Package archive could not be unpacked
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// External tool is not installed
    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    /// External tool ran but reported failure
    #[error("Command '{tool}' failed: {reason}")]
    CommandFailed { tool: String, reason: String },

    /// External tool exceeded its time bound and was killed
    #[error("Command '{tool}' timed out after {seconds}s")]
    TimeoutError { tool: String, seconds: u64 },

    /// A source package build stage failed
    #[error("Build of '{package}' failed: {reason}")]
    BuildFailed { package: String, reason: String },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Result type alias using debslim's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a build failure of `package`
    pub fn build(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::BuildFailed {
            package: package.into(),
            reason: reason.into(),
        }
    }
}
