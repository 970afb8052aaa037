//! Per-tool rule sets mapping canonical roles to filename patterns
//!
//! Rule files are YAML mappings from role name to a regular expression. An
//! entry may also be written as `{ pattern, exclude }` when a role can only be
//! told apart from a sibling by what its name does *not* contain (plated vs.
//! non-plated drill files share an extension in most tools).

use crate::error::{OpenJlcError, Result, ResultExt};
use crate::target::{EdaTool, EdgeConvention};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Role holding the board outline once a variant has been selected
pub const OUTLINE_ROLE: &str = "Outline";

/// Copper roles counted when bucketing the layer count
pub const COPPER_ROLES: [&str; 6] = [
    "Top_Cu",
    "Bottom_Cu",
    "InnerLayer1_Cu",
    "InnerLayer2_Cu",
    "InnerLayer3_Cu",
    "InnerLayer4_Cu",
];

/// Every role a canonical bundle can carry
pub const CANONICAL_ROLES: [&str; 16] = [
    "Outline",
    "Top_Cu",
    "Bottom_Cu",
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
    "PTH",
    "NPTH",
    "PTH_Via",
];

/// Suffix vocabulary of the canonical LCEDA layout, used for bundles that
/// need no conversion
const CANONICAL_VOCABULARY: [(&str, &str); 16] = [
    ("Outline", r"\.GKO$|\.GM1$|\.GM13$|Edge_Cuts"),
    ("Top_Cu", r"\.GTL$"),
    ("Bottom_Cu", r"\.GBL$"),
    ("InnerLayer1_Cu", r"\.G1$"),
    ("InnerLayer2_Cu", r"\.G2$"),
    ("InnerLayer3_Cu", r"\.G3$"),
    ("InnerLayer4_Cu", r"\.G4$"),
    ("Top_SilkScreen", r"\.GTO$"),
    ("Bottom_SilkScreen", r"\.GBO$"),
    ("Top_SolderMask", r"\.GTS$"),
    ("Bottom_SolderMask", r"\.GBS$"),
    ("Top_SolderPaste", r"\.GTP$"),
    ("Bottom_SolderPaste", r"\.GBP$"),
    ("PTH", r"_PTH_Through\.DRL$"),
    ("NPTH", r"NPTH_Through\.DRL$"),
    ("PTH_Via", r"PTH_Through_Via\.DRL$"),
];

/// A rule entry as written in a rule file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    Pattern(String),
    Filtered {
        pattern: String,
        #[serde(default)]
        exclude: Option<String>,
    },
}

/// Compiled, case-insensitive filename matcher for one role
#[derive(Debug, Clone)]
pub struct RolePattern {
    pattern: Regex,
    exclude: Option<Regex>,
}

impl RolePattern {
    pub fn new(role: &str, pattern: &str, exclude: Option<&str>) -> Result<Self> {
        Ok(Self {
            pattern: compile(role, pattern)?,
            exclude: exclude.map(|ex| compile(role, ex)).transpose()?,
        })
    }

    fn from_entry(role: &str, entry: &RuleEntry) -> Result<Self> {
        match entry {
            RuleEntry::Pattern(pattern) => Self::new(role, pattern, None),
            RuleEntry::Filtered { pattern, exclude } => {
                Self::new(role, pattern, exclude.as_deref())
            }
        }
    }

    /// Whether `filename` belongs to this role
    pub fn is_match(&self, filename: &str) -> bool {
        self.pattern.is_match(filename)
            && !self
                .exclude
                .as_ref()
                .is_some_and(|exclude| exclude.is_match(filename))
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

fn compile(role: &str, pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            OpenJlcError::InvalidPattern {
                role: role.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
}

/// Role → pattern mapping for one design tool, with exactly one outline entry
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub name: String,
    rules: BTreeMap<String, RolePattern>,
}

impl RuleSet {
    /// Rule file backing each tool. The canonical form has none: it is
    /// matched against [`RuleSet::canonical`] instead.
    pub fn rule_file_name(tool: EdaTool) -> Option<&'static str> {
        match tool {
            EdaTool::AltiumDesigner => Some("rule_altium_designer.yaml"),
            EdaTool::KiCad => Some("rule_kicad.yaml"),
            EdaTool::Lceda | EdaTool::Unknown => None,
        }
    }

    /// Load the rule file for `tool` from `rule_dir` and resolve `edge`
    pub fn load(rule_dir: &Path, tool: EdaTool, edge: EdgeConvention) -> Result<Self> {
        let file_name =
            Self::rule_file_name(tool).ok_or_else(|| OpenJlcError::UnsupportedTool {
                tool: tool.to_string(),
            })?;
        let path = rule_dir.join(file_name);

        info!("Loading rule file: {}", path.display());
        let text = fs::read_to_string(&path).with_path_context("read rule file", &path)?;

        Self::from_yaml(tool, &text, edge)
            .with_tool_context(tool.as_str())
            .with_path_context("load rule file", &path)
    }

    /// Parse rule file text and resolve the outline variant for `edge`
    pub fn from_yaml(tool: EdaTool, text: &str, edge: EdgeConvention) -> Result<Self> {
        let entries: BTreeMap<String, RuleEntry> =
            serde_yaml::from_str(text).map_err(|e| anyhow::anyhow!("Invalid rule file: {}", e))?;

        Self::resolve(tool, entries, edge)
    }

    /// Select the `Outline<edge>` variant as `Outline` and drop every other
    /// outline variant
    pub fn resolve(
        tool: EdaTool,
        mut entries: BTreeMap<String, RuleEntry>,
        edge: EdgeConvention,
    ) -> Result<Self> {
        let variant = format!("{}{}", OUTLINE_ROLE, edge.as_str());
        let outline = entries.remove(&variant).ok_or_else(|| {
            OpenJlcError::UnsupportedEdgeConvention {
                tool: tool.to_string(),
                edge: edge.to_string(),
            }
        })?;
        info!("Using Outline rule: {}", variant);

        entries.retain(|key, _| !key.starts_with(OUTLINE_ROLE));
        entries.insert(OUTLINE_ROLE.to_string(), outline);

        let rules = entries
            .iter()
            .map(|(role, entry)| -> Result<(String, RolePattern)> {
                Ok((role.clone(), RolePattern::from_entry(role, entry)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        debug!("Resolved {} rules for {}", rules.len(), tool);
        Ok(Self {
            name: tool.as_str().to_string(),
            rules,
        })
    }

    /// The built-in suffix vocabulary of an already canonical bundle
    pub fn canonical() -> Result<Self> {
        let rules = CANONICAL_VOCABULARY
            .iter()
            .map(|(role, pattern)| -> Result<(String, RolePattern)> {
                Ok((role.to_string(), RolePattern::new(role, pattern, None)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            name: EdaTool::Lceda.as_str().to_string(),
            rules,
        })
    }

    pub fn get(&self, role: &str) -> Option<&RolePattern> {
        self.rules.get(role)
    }

    /// Roles and their patterns, ordered by role name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RolePattern)> {
        self.rules.iter().map(|(role, p)| (role.as_str(), p))
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
