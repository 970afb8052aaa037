//! Gerber comment header prepended to every converted file
//!
//! The header imitates what EasyEDA Pro writes at the top of its own exports.

use crate::error::{Result, ResultExt};
use anyhow::Context;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
struct HeaderDocument {
    #[serde(rename = "Header")]
    header: String,
}

/// Produces the header text block
pub struct HeaderGenerator {
    version: Option<String>,
}

impl Default for HeaderGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderGenerator {
    /// Generator that draws a fresh version string on every call
    pub fn new() -> Self {
        Self { version: None }
    }

    /// Pin the version string
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Pick a plausible EasyEDA Pro version
    fn random_version() -> String {
        let mut rng = rand::thread_rng();
        if rng.gen_range(1..=2) == 1 {
            "v1.9.28".to_string()
        } else {
            format!(
                "v2.{}.22.{}",
                rng.gen_range(0..=2),
                rng.gen_range(0..=5)
            )
        }
    }

    /// Header text, each line terminated with a newline
    pub fn generate(&self) -> String {
        let now = chrono::Local::now();
        let version = self.version.clone().unwrap_or_else(Self::random_version);

        format!(
            "G04 EasyEDA Pro {}, {}*\nG04 Gerber Generator version 0.3*\n",
            version,
            now.format("%Y-%m-%d %H:%M:%S")
        )
    }

    /// Generate a header and store it in `path`
    pub fn write(&self, path: &Path) -> Result<String> {
        let header = self.generate();
        let document = HeaderDocument {
            header: header.clone(),
        };
        let yaml = serde_yaml::to_string(&document).context("Failed to serialize header")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_path_context("create header directory", parent)?;
        }
        fs::write(path, yaml).with_path_context("write header file", path)?;

        info!("Header written to {}", path.display());
        Ok(header)
    }
}

/// Read the header text stored in a header file
pub fn load_header(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path).with_path_context("read header file", path)?;
    let document: HeaderDocument =
        serde_yaml::from_str(&text).with_path_context("parse header file", path)?;

    debug!("Loaded {} byte header", document.header.len());
    Ok(document.header)
}
