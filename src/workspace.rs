//! Fixed on-disk layout of an OpenJLC root directory
//!
//! One job at a time runs against a root. Running two jobs against the same
//! root concurrently is not supported: they share the intake and output
//! directories.

use crate::error::{Result, ResultExt};
use crate::rules::RuleSet;
use crate::target::EdaTool;
use anyhow::Context;
use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Ordering note shipped inside every delivery package
pub const MUST_READ_NAME: &str = "PCB下单必读.txt";

const CONFIG_NAME: &str = "config.yaml";

#[derive(RustEmbed)]
#[folder = "Assets/"]
struct Asset;

/// Bundled text of the rule file for `tool`, if it has one
pub fn default_rule_text(tool: EdaTool) -> Option<String> {
    let name = RuleSet::rule_file_name(tool)?;
    Asset::get(name).map(|file| String::from_utf8_lossy(&file.data).into_owned())
}

/// Bundled default configuration
pub fn default_config_text() -> Result<String> {
    let file =
        Asset::get(CONFIG_NAME).context("Default configuration not found in embedded files")?;
    Ok(String::from_utf8_lossy(&file.data).into_owned())
}

/// Paths of one OpenJLC root
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config").join(CONFIG_NAME)
    }

    pub fn header_file(&self) -> PathBuf {
        self.root.join("config").join("Header.yaml")
    }

    pub fn rule_dir(&self) -> PathBuf {
        self.root.join("rule")
    }

    /// Where the submission is unpacked
    pub fn intake_dir(&self) -> PathBuf {
        self.root.join("workspace").join("Gerber")
    }

    /// Where the canonical output set is assembled
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("workspace").join("workflow")
    }

    pub fn report_file(&self) -> PathBuf {
        self.root.join("workspace").join("report.yaml")
    }

    pub fn target_file(&self) -> PathBuf {
        self.root.join("workspace").join("target.yaml")
    }

    pub fn job_file(&self) -> PathBuf {
        self.root.join("workspace").join("package.yaml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create the directory layout and write every bundled default that is
    /// missing. Existing files are left alone.
    pub fn init(&self) -> Result<()> {
        for dir in [
            self.root.join("config"),
            self.rule_dir(),
            self.intake_dir(),
            self.output_dir(),
            self.logs_dir(),
        ] {
            fs::create_dir_all(&dir).with_path_context("create directory", &dir)?;
        }

        self.write_default(&self.config_file(), CONFIG_NAME)?;
        for tool in [EdaTool::AltiumDesigner, EdaTool::KiCad] {
            if let Some(name) = RuleSet::rule_file_name(tool) {
                self.write_default(&self.rule_dir().join(name), name)?;
            }
        }

        info!("Workspace ready at {}", self.root.display());
        Ok(())
    }

    fn write_default(&self, path: &Path, asset: &str) -> Result<()> {
        if path.exists() {
            debug!("Keeping existing {}", path.display());
            return Ok(());
        }

        let content = Asset::get(asset)
            .with_context(|| format!("Asset {} not found in embedded files", asset))?;
        fs::write(path, content.data.as_ref()).with_path_context("write default file", path)?;
        info!("Wrote default {}", path.display());
        Ok(())
    }

    /// Contents of the ordering note
    pub fn must_read_note(&self) -> Result<Cow<'static, [u8]>> {
        let content =
            Asset::get(MUST_READ_NAME).context("Required asset not found in embedded files")?;
        Ok(content.data)
    }
}

/// Remove everything inside `dir`, keeping (or creating) the directory itself
pub fn clear_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).with_path_context("create directory", dir)?;
        return Ok(());
    }

    for entry in fs::read_dir(dir).with_path_context("read directory", dir)? {
        let path = entry.with_path_context("read directory entry", dir)?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path).with_path_context("remove directory", &path)?;
        } else {
            fs::remove_file(&path).with_path_context("remove file", &path)?;
        }
    }

    debug!("Cleared contents of directory: {}", dir.display());
    Ok(())
}

/// Delete `dir` outright and create it again empty
pub fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_path_context("remove directory", dir)?;
    }
    fs::create_dir_all(dir).with_path_context("create directory", dir)?;
    debug!("Recreated directory: {}", dir.display());
    Ok(())
}

/// Names of the regular files directly inside `dir`, sorted
pub fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(dir)
        .with_path_context("read directory", dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter_map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
        })
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Copy the tree under `src` into `dest`, syncing each copied file
pub fn copy_dir_contents(src: &Path, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest).with_path_context("create directory", dest)?;

    let mut copied = 0;
    for entry in fs::read_dir(src).with_path_context("read directory", src)? {
        let path = entry.with_path_context("read directory entry", src)?.path();
        let Some(name) = path.file_name() else {
            continue;
        };
        let target = dest.join(name);

        if path.is_dir() {
            copied += copy_dir_contents(&path, &target)?;
        } else {
            fs::copy(&path, &target).with_path_context("copy file", &path)?;
            fs::File::open(&target)
                .and_then(|file| file.sync_all())
                .with_path_context("flush copied file", &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Directory the bundle actually lives in: descends through a lone wrapping
/// directory, as produced by zipping a folder
pub fn working_root(dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(dir)
        .with_path_context("read directory", dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();

    match entries.as_slice() {
        [only] if only.is_dir() => {
            debug!("Descending into wrapping directory {}", only.display());
            working_root(only)
        }
        _ => Ok(dir.to_path_buf()),
    }
}
