//! Matching intake filenames to canonical roles
//!
//! Strict classification is used for tool exports: every role may match at
//! most one file and ambiguity aborts the job. Bundles that are already
//! canonical are only surveyed, file by file.

use crate::error::{OpenJlcError, Result, ResultExt};
use crate::rules::{RuleSet, COPPER_ROLES, OUTLINE_ROLE};
use crate::target::EdaTool;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Presence of one role in the intake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMatch {
    pub matched: bool,
    pub filename: Option<String>,
}

impl RoleMatch {
    pub fn unmatched() -> Self {
        Self::default()
    }

    pub fn found(filename: &str) -> Self {
        Self {
            matched: true,
            filename: Some(filename.to_string()),
        }
    }
}

/// Per-role presence for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationReport {
    pub source: EdaTool,
    pub date: String,
    pub time: String,
    pub roles: BTreeMap<String, RoleMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum YesNo {
    Yes,
    No,
}

impl From<bool> for YesNo {
    fn from(value: bool) -> Self {
        if value {
            YesNo::Yes
        } else {
            YesNo::No
        }
    }
}

/// On-disk shape of `report.yaml`
#[derive(Debug, Serialize, Deserialize)]
struct ReportDocument {
    #[serde(rename = "Source")]
    source: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Edge")]
    edge: YesNo,
    #[serde(flatten)]
    roles: BTreeMap<String, YesNo>,
}

impl ClassificationReport {
    /// Empty report stamped with the current local date and time
    pub fn new(source: EdaTool) -> Self {
        let now = chrono::Local::now();
        Self {
            source,
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M:%S").to_string(),
            roles: BTreeMap::new(),
        }
    }

    pub fn is_matched(&self, role: &str) -> bool {
        self.roles.get(role).is_some_and(|m| m.matched)
    }

    /// Roles that matched a file, with the file they matched
    pub fn matched_files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.roles.iter().filter_map(|(role, m)| {
            m.filename
                .as_deref()
                .filter(|_| m.matched)
                .map(|file| (role.as_str(), file))
        })
    }

    /// How many of the top, bottom and inner copper roles are present
    pub fn copper_layer_count(&self) -> usize {
        COPPER_ROLES
            .iter()
            .filter(|role| self.is_matched(role))
            .count()
    }

    pub fn to_yaml(&self) -> Result<String> {
        let document = ReportDocument {
            source: self.source.report_name().to_string(),
            date: self.date.clone(),
            time: self.time.clone(),
            edge: self.is_matched(OUTLINE_ROLE).into(),
            roles: self
                .roles
                .iter()
                .map(|(role, m)| (role.clone(), m.matched.into()))
                .collect(),
        };

        serde_yaml::to_string(&document).context("Failed to serialize classification report")
    }

    /// Parse a report file. Filenames are not persisted, so matched roles
    /// come back without one.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let document: ReportDocument =
            serde_yaml::from_str(text).context("Failed to parse classification report")?;

        Ok(Self {
            source: EdaTool::from_report_name(&document.source),
            date: document.date,
            time: document.time,
            roles: document
                .roles
                .into_iter()
                .map(|(role, present)| {
                    let entry = RoleMatch {
                        matched: present == YesNo::Yes,
                        filename: None,
                    };
                    (role, entry)
                })
                .collect(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_yaml()?).with_path_context("write report file", path)?;
        info!("Report generated successfully at {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_path_context("read report file", path)?;
        Self::from_yaml(&text).with_path_context("load report file", path)
    }
}

/// Applies a rule set to a directory listing
pub struct Classifier<'a> {
    rules: &'a RuleSet,
}

impl<'a> Classifier<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    /// Match every role against `filenames`.
    ///
    /// A role with no match is recorded as unmatched. A role with more than
    /// one match fails the whole classification with every candidate named.
    pub fn classify(&self, source: EdaTool, filenames: &[String]) -> Result<ClassificationReport> {
        let mut report = ClassificationReport::new(source);

        for (role, pattern) in self.rules.iter() {
            debug!("Searching for files matching rule '{}'...", role);

            let candidates: Vec<&String> = filenames
                .iter()
                .filter(|name| pattern.is_match(name))
                .collect();

            let entry = match candidates.as_slice() {
                [] => {
                    info!("{} match failed, skipping this file.", role);
                    RoleMatch::unmatched()
                }
                [single] => {
                    info!("{} -> {}", role, single);
                    RoleMatch::found(single)
                }
                _ => {
                    return Err(OpenJlcError::AmbiguousMatch {
                        role: role.to_string(),
                        candidates: candidates.into_iter().cloned().collect(),
                    }
                    .into());
                }
            };
            report.roles.insert(role.to_string(), entry);
        }

        Ok(report)
    }

    /// Mark each role present if some file matches it. Every file is
    /// assigned to the first role it matches and duplicates are not errors.
    pub fn survey(&self, source: EdaTool, filenames: &[String]) -> ClassificationReport {
        let mut report = ClassificationReport::new(source);
        for role in self.rules.roles() {
            report.roles.insert(role.to_string(), RoleMatch::unmatched());
        }

        for name in filenames {
            let first = self.rules.iter().find(|(_, p)| p.is_match(name));
            match first {
                Some((role, _)) => {
                    info!("Matched {} with file {}", role, name);
                    let entry = report.roles.entry(role.to_string()).or_default();
                    if entry.matched {
                        warn!("{} already matched, also seen in {}", role, name);
                    } else {
                        *entry = RoleMatch::found(name);
                    }
                }
                None => debug!("No role for {}", name),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::EdgeConvention;
    use crate::workspace::default_rule_text;

    fn altium_rules() -> RuleSet {
        let text = default_rule_text(EdaTool::AltiumDesigner).unwrap();
        RuleSet::from_yaml(EdaTool::AltiumDesigner, &text, EdgeConvention::Gko).unwrap()
    }

    fn names(files: &[&str]) -> Vec<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_two_layer_altium_bundle() {
        let rules = altium_rules();
        let report = Classifier::new(&rules)
            .classify(
                EdaTool::AltiumDesigner,
                &names(&["board.GTL", "board.GBL", "board.TXT"]),
            )
            .unwrap();

        assert!(report.is_matched("Top_Cu"));
        assert!(report.is_matched("Bottom_Cu"));
        assert!(report.is_matched("PTH"));
        for role in [
            "InnerLayer1_Cu",
            "InnerLayer2_Cu",
            "InnerLayer3_Cu",
            "InnerLayer4_Cu",
            "Top_SilkScreen",
            "Bottom_SilkScreen",
            "Top_SolderMask",
            "Bottom_SolderMask",
            "Top_SolderPaste",
            "Bottom_SolderPaste",
            "NPTH",
            "PTH_Via",
            "Outline",
        ] {
            assert!(!report.is_matched(role), "{} should be unmatched", role);
        }
        assert_eq!(report.copper_layer_count(), 2);
    }

    #[test]
    fn test_ambiguous_match_names_all_candidates() {
        let rules = altium_rules();
        let err = Classifier::new(&rules)
            .classify(
                EdaTool::AltiumDesigner,
                &names(&["a.GTL", "b.gtl", "board.GBL"]),
            )
            .unwrap_err();

        match err.downcast_ref::<OpenJlcError>() {
            Some(OpenJlcError::AmbiguousMatch { role, candidates }) => {
                assert_eq!(role, "Top_Cu");
                assert_eq!(candidates, &vec!["a.GTL".to_string(), "b.gtl".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plated_and_non_plated_drills_do_not_collide() {
        let rules = altium_rules();
        let report = Classifier::new(&rules)
            .classify(
                EdaTool::AltiumDesigner,
                &names(&["board-Plated.TXT", "board-NonPlated.TXT"]),
            )
            .unwrap();

        assert_eq!(report.roles["PTH"], RoleMatch::found("board-Plated.TXT"));
        assert_eq!(
            report.roles["NPTH"],
            RoleMatch::found("board-NonPlated.TXT")
        );
    }

    #[test]
    fn test_altium_status_report_is_not_a_drill_file() {
        let rules = altium_rules();
        let report = Classifier::new(&rules)
            .classify(
                EdaTool::AltiumDesigner,
                &names(&["Status Report.Txt", "a.GBL", "a.GTL", "a.TXT"]),
            )
            .unwrap();

        assert_eq!(report.roles["PTH"], RoleMatch::found("a.TXT"));
        assert!(!report.is_matched("NPTH"));
        assert!(!report.is_matched("PTH_Via"));
    }

    #[test]
    fn test_survey_is_lenient() {
        let rules = RuleSet::canonical().unwrap();
        let report = Classifier::new(&rules).survey(
            EdaTool::Lceda,
            &names(&[
                "Gerber_TopLayer.GTL",
                "Gerber_BottomLayer.GBL",
                "Gerber_InnerLayer1.G1",
                "Gerber_InnerLayer2.G2",
                "Gerber_BoardOutlineLayer.GKO",
                "Drill_PTH_Through.DRL",
                "Drill_NPTH_Through.DRL",
                "PCB下单必读.txt",
            ]),
        );

        assert_eq!(report.copper_layer_count(), 4);
        assert!(report.is_matched("Outline"));
        assert!(report.is_matched("PTH"));
        assert!(report.is_matched("NPTH"));
        assert!(!report.is_matched("PTH_Via"));
        assert!(!report.is_matched("Top_SilkScreen"));
    }

    #[test]
    fn test_report_yaml_round_trip() {
        let mut report = ClassificationReport::new(EdaTool::KiCad);
        report
            .roles
            .insert("Top_Cu".to_string(), RoleMatch::found("b-F_Cu.gbr"));
        report
            .roles
            .insert("Bottom_Cu".to_string(), RoleMatch::unmatched());

        let yaml = report.to_yaml().unwrap();
        assert!(yaml.contains("Source: KiCAD"));
        assert!(yaml.contains("Top_Cu"));

        let loaded = ClassificationReport::from_yaml(&yaml).unwrap();
        assert_eq!(loaded.source, EdaTool::KiCad);
        assert_eq!(loaded.date, report.date);
        assert!(loaded.is_matched("Top_Cu"));
        assert!(!loaded.is_matched("Bottom_Cu"));
        assert!(!loaded.roles.contains_key("Edge"));
    }
}
