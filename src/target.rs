//! Design tool and outline convention detection
//!
//! Every fabrication bundle is assumed to carry a board outline file, so the
//! outline is what we look for: its filename tells us the edge convention and
//! its comment header tells us which tool wrote it.

use crate::error::{OpenJlcError, Result, ResultExt};
use anyhow::Context;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Default pattern used to pick the outline file out of an intake tree
pub const DEFAULT_IDENTIFICATION_PATTERN: &str = r"(\.gm1|\.gko|\.gm13|Edge_Cuts|-Edge_Cuts)";

/// How many leading lines of the outline file are searched for a tool signature
const SIGNATURE_SCAN_LINES: usize = 21;

/// Design tools whose exports we understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdaTool {
    #[serde(rename = "Unknown")]
    Unknown,
    #[serde(rename = "Altium_Designer")]
    AltiumDesigner,
    #[serde(rename = "KiCAD")]
    KiCad,
    /// Already in the canonical LCEDA layout
    #[serde(rename = "LCEDA")]
    Lceda,
}

impl EdaTool {
    /// Name used in config and target files
    pub fn as_str(&self) -> &'static str {
        match self {
            EdaTool::Unknown => "Unknown",
            EdaTool::AltiumDesigner => "Altium_Designer",
            EdaTool::KiCad => "KiCAD",
            EdaTool::Lceda => "LCEDA",
        }
    }

    /// Name recorded as `Source` in the classification report
    pub fn report_name(&self) -> &'static str {
        match self {
            EdaTool::Unknown => "Unknown",
            EdaTool::AltiumDesigner => "AD",
            EdaTool::KiCad => "KiCAD",
            EdaTool::Lceda => "LCEDA",
        }
    }

    pub fn from_report_name(name: &str) -> Self {
        match name {
            "AD" => EdaTool::AltiumDesigner,
            "KiCAD" => EdaTool::KiCad,
            "LCEDA" => EdaTool::Lceda,
            _ => EdaTool::Unknown,
        }
    }

    /// Whether the bundle is already in canonical form and needs no renaming
    pub fn is_canonical(&self) -> bool {
        matches!(self, EdaTool::Lceda)
    }

    /// Substring each tool writes into its Gerber comment header.
    /// Order matters: the first signature found wins.
    const SIGNATURES: [(&'static str, EdaTool); 3] = [
        ("Altium", EdaTool::AltiumDesigner),
        ("KiCad", EdaTool::KiCad),
        ("EasyEDA", EdaTool::Lceda),
    ];
}

impl fmt::Display for EdaTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdaTool {
    type Err = OpenJlcError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "altium_designer" | "altium" | "ad" | "protel" => Ok(EdaTool::AltiumDesigner),
            "kicad" | "ki" => Ok(EdaTool::KiCad),
            "lceda" | "easyeda" | "jlc" | "lc" => Ok(EdaTool::Lceda),
            _ => Err(OpenJlcError::InvalidChoice {
                field: "SourceTool".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Naming scheme used for the board outline file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeConvention {
    #[serde(rename = "GKO")]
    Gko,
    #[serde(rename = "GM1")]
    Gm1,
    #[serde(rename = "GM13")]
    Gm13,
    #[serde(rename = "Edge_Cuts")]
    EdgeCuts,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl EdgeConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeConvention::Gko => "GKO",
            EdgeConvention::Gm1 => "GM1",
            EdgeConvention::Gm13 => "GM13",
            EdgeConvention::EdgeCuts => "Edge_Cuts",
            EdgeConvention::Unknown => "Unknown",
        }
    }

    /// Resolve the convention from an outline filename.
    ///
    /// Markers are checked in a fixed priority order and the first hit wins.
    /// Extension markers must end the name, so `.gm13` is not read as `.gm1`.
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_lowercase();

        if lower.ends_with(".gm1") {
            EdgeConvention::Gm1
        } else if lower.ends_with(".gko") {
            EdgeConvention::Gko
        } else if lower.contains("edge_cuts") {
            EdgeConvention::EdgeCuts
        } else if lower.ends_with(".gm13") {
            EdgeConvention::Gm13
        } else {
            EdgeConvention::Unknown
        }
    }
}

impl fmt::Display for EdgeConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeConvention {
    type Err = OpenJlcError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gko" => Ok(EdgeConvention::Gko),
            "gm1" => Ok(EdgeConvention::Gm1),
            "gm13" => Ok(EdgeConvention::Gm13),
            "edge_cuts" | "edgecuts" => Ok(EdgeConvention::EdgeCuts),
            _ => Err(OpenJlcError::InvalidChoice {
                field: "EdgeConvention".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Explicit choices that bypass auto-detection. `None` means "Auto".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetOverride {
    pub tool: Option<EdaTool>,
    pub edge: Option<EdgeConvention>,
}

/// Resolved tool and outline convention for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    #[serde(rename = "EDA")]
    pub tool: EdaTool,
    #[serde(rename = "TargetEdge")]
    pub edge: EdgeConvention,
}

impl TargetDescriptor {
    /// Persist the descriptor for inspection after a run
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml =
            serde_yaml::to_string(self).context("Failed to serialize target descriptor")?;
        fs::write(path, yaml).with_path_context("write target file", path)?;
        debug!("Saved target descriptor to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_path_context("read target file", path)?;
        serde_yaml::from_str(&text).with_path_context("parse target file", path)
    }
}

/// Detects the producing tool and edge convention of an intake tree
pub struct Identifier {
    outline_pattern: Regex,
}

impl Identifier {
    /// Create an identifier using the given outline identification pattern
    pub fn new(pattern: &str) -> Result<Self> {
        let outline_pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| OpenJlcError::InvalidPattern {
                role: "IdentificationFile".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { outline_pattern })
    }

    /// Resolve the target descriptor for `dir`.
    ///
    /// An edge override skips the scan entirely; a tool override replaces
    /// whatever the scan found.
    pub fn identify(&self, dir: &Path, overrides: TargetOverride) -> Result<TargetDescriptor> {
        let mut descriptor = match overrides.edge {
            Some(edge) => {
                info!("Using configured edge convention: {}", edge);
                TargetDescriptor {
                    tool: EdaTool::Unknown,
                    edge,
                }
            }
            None => self.detect(dir)?,
        };

        if let Some(tool) = overrides.tool {
            info!("Using configured design tool: {}", tool);
            descriptor.tool = tool;
        }

        info!(
            tool = descriptor.tool.as_str(),
            edge = descriptor.edge.as_str(),
            "Target resolved"
        );
        Ok(descriptor)
    }

    fn detect(&self, dir: &Path) -> Result<TargetDescriptor> {
        let outline = self
            .find_outline_file(dir)?
            .ok_or_else(|| OpenJlcError::NoOutlineFileFound {
                dir: dir.display().to_string(),
            })?;

        info!("Found edge file: {}", outline.display());

        let filename = outline
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let edge = EdgeConvention::from_filename(filename);
        if edge == EdgeConvention::Unknown {
            warn!("Outline file {} matches no known edge convention", filename);
        }

        let tool = Self::detect_tool(&outline)?;
        if tool == EdaTool::Unknown {
            warn!("Could not identify design tool from {}", filename);
        }

        Ok(TargetDescriptor { tool, edge })
    }

    /// Walk `dir` depth-first (files before subdirectories, names sorted) and
    /// return the first file matching the outline pattern
    pub fn find_outline_file(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let mut entries = fs::read_dir(dir)
            .with_path_context("read directory", dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect::<Vec<_>>();
        entries.sort();

        let (files, dirs): (Vec<_>, Vec<_>) = entries.into_iter().partition(|p| p.is_file());

        for file in files {
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if self.outline_pattern.is_match(name) {
                return Ok(Some(file));
            }
        }

        for sub in dirs {
            if let Some(found) = self.find_outline_file(&sub)? {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }

    /// Look for a tool signature in the first lines of `outline`
    pub fn detect_tool(outline: &Path) -> Result<EdaTool> {
        let file = fs::File::open(outline).with_path_context("open outline file", outline)?;

        let mut head = String::new();
        for line in BufReader::new(file).split(b'\n').take(SIGNATURE_SCAN_LINES) {
            let line = line.with_path_context("read outline file", outline)?;
            head.push_str(&String::from_utf8_lossy(&line));
            head.push('\n');
        }

        let tool = EdaTool::SIGNATURES
            .iter()
            .find(|(signature, _)| head.contains(signature))
            .map(|(_, tool)| *tool)
            .unwrap_or(EdaTool::Unknown);

        debug!("Signature scan of {} -> {}", outline.display(), tool);
        Ok(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identifier() -> Identifier {
        Identifier::new(DEFAULT_IDENTIFICATION_PATTERN).expect("default pattern compiles")
    }

    #[test]
    fn test_edge_convention_priority() {
        let edge = EdgeConvention::from_filename;

        assert_eq!(edge("board.GM1"), EdgeConvention::Gm1);
        assert_eq!(edge("board.gko"), EdgeConvention::Gko);
        assert_eq!(edge("board-Edge_Cuts.gbr"), EdgeConvention::EdgeCuts);
        assert_eq!(edge("board.GM13"), EdgeConvention::Gm13);
        // An Edge_Cuts file exported with protel extensions ends in .gm1
        assert_eq!(edge("board-Edge_Cuts.gm1"), EdgeConvention::Gm1);
        assert_eq!(edge("board.gbr"), EdgeConvention::Unknown);
    }

    #[test]
    fn test_tool_parsing() {
        assert_eq!(
            "Altium_Designer".parse::<EdaTool>().unwrap(),
            EdaTool::AltiumDesigner
        );
        assert_eq!("kicad".parse::<EdaTool>().unwrap(), EdaTool::KiCad);
        assert_eq!("LCEDA".parse::<EdaTool>().unwrap(), EdaTool::Lceda);
        assert!("eagle".parse::<EdaTool>().is_err());
    }

    #[test]
    fn test_detect_altium_outline() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("board.GTL"), "G04*\n").unwrap();
        fs::write(
            dir.path().join("board.GKO"),
            "G04 Layer: Keep-Out*\nG04 Altium Designer 23.1*\nM02*\n",
        )
        .unwrap();

        let target = identifier()
            .identify(dir.path(), TargetOverride::default())
            .unwrap();

        assert_eq!(target.tool, EdaTool::AltiumDesigner);
        assert_eq!(target.edge, EdgeConvention::Gko);
    }

    #[test]
    fn test_signature_beyond_scan_window_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut body = "G04 filler*\n".repeat(SIGNATURE_SCAN_LINES);
        body.push_str("G04 KiCad*\n");
        fs::write(dir.path().join("board-Edge_Cuts.gbr"), body).unwrap();

        let target = identifier()
            .identify(dir.path(), TargetOverride::default())
            .unwrap();

        assert_eq!(target.tool, EdaTool::Unknown);
        assert_eq!(target.edge, EdgeConvention::EdgeCuts);
    }

    #[test]
    fn test_outline_found_in_subdirectory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("gerber");
        fs::create_dir_all(&nested).unwrap();
        let body = "G04 Created by KiCad*\n";
        fs::write(nested.join("board-Edge_Cuts.gbr"), body).unwrap();

        let target = identifier()
            .identify(dir.path(), TargetOverride::default())
            .unwrap();

        assert_eq!(target.tool, EdaTool::KiCad);
    }

    #[test]
    fn test_no_outline_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("board.GTL"), "G04*\n").unwrap();

        let err = identifier()
            .identify(dir.path(), TargetOverride::default())
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<OpenJlcError>(),
            Some(OpenJlcError::NoOutlineFileFound { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("board.GKO"), "G04 EasyEDA Pro*\n").unwrap();

        let tool_only = identifier()
            .identify(
                dir.path(),
                TargetOverride {
                    tool: Some(EdaTool::AltiumDesigner),
                    edge: None,
                },
            )
            .unwrap();
        assert_eq!(tool_only.tool, EdaTool::AltiumDesigner);
        assert_eq!(tool_only.edge, EdgeConvention::Gko);

        // An edge override never scans, so an empty directory is fine
        let empty = TempDir::new().unwrap();
        let edge_only = identifier()
            .identify(
                empty.path(),
                TargetOverride {
                    tool: None,
                    edge: Some(EdgeConvention::Gm1),
                },
            )
            .unwrap();
        assert_eq!(edge_only.tool, EdaTool::Unknown);
        assert_eq!(edge_only.edge, EdgeConvention::Gm1);
    }

    #[test]
    fn test_descriptor_round_trips_through_target_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("target.yaml");
        let descriptor = TargetDescriptor {
            tool: EdaTool::KiCad,
            edge: EdgeConvention::EdgeCuts,
        };

        descriptor.save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("EDA: KiCAD"));
        assert!(text.contains("TargetEdge: Edge_Cuts"));
        assert_eq!(TargetDescriptor::load(&path).unwrap(), descriptor);
    }
}
