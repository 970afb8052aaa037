//! Configuration management for OpenJLC
//!
//! Command line arguments come from clap; per-root settings come from
//! `config/config.yaml`. Command line choices win over the file, and the file
//! wins over auto-detection.

use crate::error::{Result, ResultExt};
use crate::target::{EdaTool, EdgeConvention, TargetOverride, DEFAULT_IDENTIFICATION_PATTERN};
use anyhow::{anyhow, Context};
use clap::builder::styling;
use clap::{value_parser, Arg, ArgMatches, ColorChoice, Command};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Value meaning "detect it from the files"
const AUTO: &str = "Auto";

/// Build the CLI command
pub fn build_cli() -> Command {
    let styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Blue.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default());

    Command::new("openjlc")
        .about("OpenJLC - Rename Gerber bundles into the LCEDA layout and repackage them")
        .author("HalfSweet <HalfSweet@HalfSweet.cn>")
        .color(ColorChoice::Auto)
        .styles(styles)
        .args_conflicts_with_subcommands(true)
        .subcommand_negates_reqs(true)
        .arg(
            Arg::new("submission")
                .help("Gerber bundle (.zip) to convert")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(root_arg())
        .arg(
            Arg::new("tool")
                .short('t')
                .long("tool")
                .help("Design tool that produced the bundle")
                .value_parser(["auto", "ad", "kicad", "lceda"]),
        )
        .arg(
            Arg::new("edge")
                .short('e')
                .long("edge")
                .help("Board outline naming convention")
                .value_parser(["auto", "gko", "gm1", "gm13", "edge_cuts"]),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no_progress")
                .long("no-progress")
                .help("Disable progress indicators")
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("init")
                .about("Lay out a working root and write missing defaults")
                .arg(root_arg()),
        )
}

fn root_arg() -> Arg {
    Arg::new("root")
        .short('r')
        .long("root")
        .help("Working root holding config, rules and workspace directories")
        .value_parser(value_parser!(PathBuf))
        .default_value(".")
}

/// What the invocation asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Only prepare the working root
    Init,
    /// Convert and repackage one submission
    Convert { submission: PathBuf },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,

    /// Working root
    pub root: PathBuf,

    /// Tool and edge chosen on the command line
    pub overrides: TargetOverride,

    /// Enable verbose logging
    pub verbose: bool,

    /// Disable progress bars
    pub no_progress: bool,
}

impl Config {
    /// Parse the process arguments
    pub fn from_args() -> Result<Self> {
        Self::from_matches(&build_cli().get_matches())
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let verbose = matches.get_flag("verbose");

        if let Some(("init", sub)) = matches.subcommand() {
            let root = sub
                .get_one::<PathBuf>("root")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("."));
            return Ok(Config {
                mode: Mode::Init,
                root,
                overrides: TargetOverride::default(),
                verbose,
                no_progress: true,
            });
        }

        let submission = matches
            .get_one::<PathBuf>("submission")
            .cloned()
            .ok_or_else(|| anyhow!("A submission .zip is required"))?;
        let root = matches
            .get_one::<PathBuf>("root")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));

        let overrides = TargetOverride {
            tool: parse_choice::<EdaTool>(matches.get_one::<String>("tool"))?,
            edge: parse_choice::<EdgeConvention>(matches.get_one::<String>("edge"))?,
        };

        Ok(Config {
            mode: Mode::Convert { submission },
            root,
            overrides,
            verbose,
            no_progress: matches.get_flag("no_progress"),
        })
    }
}

/// `None` for a missing or `auto` value, otherwise the parsed choice
fn parse_choice<T>(value: Option<&String>) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case(AUTO) => Ok(None),
        Some(v) => Ok(Some(v.parse::<T>()?)),
    }
}

fn default_auto() -> String {
    AUTO.to_string()
}

/// Contents of `config/config.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    #[serde(default = "default_auto")]
    pub source_tool: String,

    #[serde(default = "default_auto")]
    pub edge_convention: String,

    /// Overrides the pattern used to find the outline file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification_file: Option<String>,

    /// Canonical output filename per role
    pub file_name: BTreeMap<String, String>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_path_context("read config file", path)?;
        Self::from_yaml(&text).with_path_context("parse config file", path)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Invalid configuration")
    }

    /// Tool and edge choices recorded in the file
    pub fn overrides(&self) -> Result<TargetOverride> {
        Ok(TargetOverride {
            tool: parse_choice::<EdaTool>(Some(&self.source_tool))?,
            edge: parse_choice::<EdgeConvention>(Some(&self.edge_convention))?,
        })
    }

    /// Layer command line choices over the file's
    pub fn resolve_overrides(&self, cli: TargetOverride) -> Result<TargetOverride> {
        let file = self.overrides()?;
        Ok(TargetOverride {
            tool: cli.tool.or(file.tool),
            edge: cli.edge.or(file.edge),
        })
    }

    pub fn identification_pattern(&self) -> &str {
        self.identification_file
            .as_deref()
            .unwrap_or(DEFAULT_IDENTIFICATION_PATTERN)
    }
}

/// Name of the log file for a run starting now
pub fn log_file_path(logs_dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M");
    logs_dir.join(format!("{}.log", stamp))
}

/// Set up tracing. `RUST_LOG` takes precedence over the verbose flag.
///
/// With a log file, every event goes both to stderr and to the file.
pub fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_path_context("open log file", path)?;
            builder
                .with_ansi(false)
                .with_writer(std::io::stderr.and(Mutex::new(file)))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
