//! Error types for the `bwr` binary
//!
//! Every variant renders as a user-facing message with a hint on how to fix
//! the problem.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Input file could not be parsed or is inconsistent
    #[error("{0}. Check the input file format.")]
    Format(#[from] bwr_common::BwrError),

    /// Download or remote request failed
    #[error("{0}. Check your internet connection, or rerun to resume.")]
    Fetch(#[from] bwr_fetch::FetchError),

    /// Required file is missing
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or bwr.toml.")]
    Config(String),

    /// TOML parsing failed
    #[error("Failed to parse config file: {0}. Check the file syntax.")]
    TomlParse(#[from] toml::de::Error),

    /// Argument combination that clap cannot express
    #[error("Invalid argument: {0}. See 'bwr help' for usage.")]
    InvalidArgument(String),

    /// Some items of a batch failed
    #[error("{failed} of {total} {what} failed. Rerun the same command to retry the missing ones.")]
    Incomplete {
        what: String,
        failed: usize,
        total: usize,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Fail with [`CliError::Incomplete`] when a summary reports failures
    pub fn check_summary(what: &str, summary: bwr_fetch::FetchSummary) -> Result<()> {
        if summary.failed == 0 {
            Ok(())
        } else {
            Err(Self::Incomplete {
                what: what.to_string(),
                failed: summary.failed,
                total: summary.total,
            })
        }
    }
}

/// Fail with [`CliError::FileNotFound`] unless `path` exists
pub fn require_exists(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::FileNotFound(path.display().to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_summary() {
        let ok = bwr_fetch::FetchSummary {
            total: 3,
            succeeded: 3,
            failed: 0,
        };
        assert!(CliError::check_summary("files", ok).is_ok());
        let err = CliError::check_summary(
            "files",
            bwr_fetch::FetchSummary {
                total: 3,
                succeeded: 1,
                failed: 2,
            },
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("2 of 3 files failed"));
    }

    #[test]
    fn test_missing_file_hint() {
        let err = require_exists(std::path::Path::new("/no/such/file.gtf")).unwrap_err();
        assert!(err.to_string().contains("Verify the file path"));
    }
}
