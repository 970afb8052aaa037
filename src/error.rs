//! Error handling for OpenJLC
//!
//! Domain failures are typed with `thiserror` so callers can tell them apart;
//! everything is carried through `anyhow` for context chains.

use anyhow::Context;
use std::path::Path;

pub type Result<T> = anyhow::Result<T>;

/// Extension trait for Results to add context with file paths
pub trait ResultExt<T> {
    /// Add context with file path information
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T>;

    /// Add context naming the design tool being handled
    fn with_tool_context(self, tool: &str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error> + Send + Sync + 'static,
{
    fn with_path_context<P: AsRef<Path>>(self, operation: &str, path: P) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Failed to {}: {}", operation, path.as_ref().display()))
    }

    fn with_tool_context(self, tool: &str) -> Result<T> {
        self.map_err(|e| e.into())
            .with_context(|| format!("Error processing {} output", tool))
    }
}

/// Specific error types for OpenJLC operations
#[derive(Debug, thiserror::Error)]
pub enum OpenJlcError {
    #[error("No outline file found under {dir}")]
    NoOutlineFileFound { dir: String },

    #[error("Unsupported design tool: {tool}")]
    UnsupportedTool { tool: String },

    #[error("Rule set for {tool} has no outline entry for edge convention {edge}")]
    UnsupportedEdgeConvention { tool: String, edge: String },

    #[error("{role} multiple matches found: {}", candidates.join(", "))]
    AmbiguousMatch {
        role: String,
        candidates: Vec<String>,
    },

    #[error("No canonical output name configured for role {role}")]
    MissingCanonicalName { role: String },

    #[error("Invalid pattern for {role}: {reason}")]
    InvalidPattern { role: String, reason: String },

    #[error("Unrecognized {field} value: {value}")]
    InvalidChoice { field: String, value: String },

    #[error("ZIP extraction failed: {reason}")]
    ZipExtractionFailed { reason: String },

    #[error("Submission is not a readable .zip file: {path}")]
    SubmissionNotFound { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_match_lists_every_candidate() {
        let err = OpenJlcError::AmbiguousMatch {
            role: "Top_Cu".to_string(),
            candidates: vec!["a.GTL".to_string(), "b.GTL".to_string()],
        };

        assert_eq!(
            err.to_string(),
            "Top_Cu multiple matches found: a.GTL, b.GTL"
        );
    }

    #[test]
    fn path_context_is_prepended() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));

        let err = result
            .with_path_context("read rule file", "rule/rule_kicad.yaml")
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Failed to read rule file: rule/rule_kicad.yaml"
        );
        assert!(format!("{:#}", err).ends_with("gone"));
    }
}
