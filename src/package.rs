//! Delivery package naming
//!
//! The package name tells the fab house which tool the design came from and
//! how many copper layers it has. Combinations we cannot label are marked
//! `Err` rather than refused, so the package is still produced.

use crate::classify::ClassificationReport;
use crate::target::EdaTool;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Extension of the delivery archive
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Label written for anything we cannot classify
const ERROR_LABEL: &str = "Err";

/// Two-letter code for the originating tool, or `Err`
pub fn tool_abbreviation(source: EdaTool) -> &'static str {
    match source {
        EdaTool::Lceda => "LC",
        EdaTool::AltiumDesigner => "AD",
        EdaTool::KiCad => "Ki",
        EdaTool::Unknown => ERROR_LABEL,
    }
}

/// Coarse copper layer count used in the package name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerBucket {
    L1,
    L2,
    L4,
    L6,
    /// Any count that is not 1, 2, 4 or 6
    Err,
}

impl LayerBucket {
    pub fn from_count(count: usize) -> Self {
        match count {
            1 => LayerBucket::L1,
            2 => LayerBucket::L2,
            4 => LayerBucket::L4,
            6 => LayerBucket::L6,
            _ => LayerBucket::Err,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerBucket::L1 => "L1",
            LayerBucket::L2 => "L2",
            LayerBucket::L4 => "L4",
            LayerBucket::L6 => "L6",
            LayerBucket::Err => ERROR_LABEL,
        }
    }
}

impl fmt::Display for LayerBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parts of a delivery archive name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageName {
    pub base: String,
    pub tool: &'static str,
    pub layers: LayerBucket,
}

impl PackageName {
    /// Derive the package name from the report and the submission filename
    pub fn derive(report: &ClassificationReport, submission_name: &str) -> Self {
        let base = Path::new(submission_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(submission_name)
            .to_string();

        let tool = tool_abbreviation(report.source);
        if tool == ERROR_LABEL {
            warn!(
                "Unrecognized source tool {}, labelling package {}",
                report.source, ERROR_LABEL
            );
        }

        let count = report.copper_layer_count();
        let layers = LayerBucket::from_count(count);
        if layers == LayerBucket::Err {
            warn!(
                "Non-standard copper layer count {}, labelling package {}",
                count, ERROR_LABEL
            );
        }

        Self { base, tool, layers }
    }

    /// Whether either label fell back to `Err`
    pub fn is_flagged(&self) -> bool {
        self.tool == ERROR_LABEL || self.layers == LayerBucket::Err
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.{}",
            self.base, self.tool, self.layers, ARCHIVE_EXTENSION
        )
    }
}
