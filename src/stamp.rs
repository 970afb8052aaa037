//! Writing the canonical output set
//!
//! Each matched source file is copied under its canonical name with the
//! header prepended byte for byte. The destination is rebuilt from empty on
//! every run.

use crate::classify::ClassificationReport;
use crate::error::{OpenJlcError, Result, ResultExt};
use crate::progress::ProgressTracker;
use crate::workspace::recreate_dir;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Renames matched files and prepends the header
pub struct HeaderStamper<'a> {
    header: &'a str,
    canonical_names: &'a BTreeMap<String, String>,
}

impl<'a> HeaderStamper<'a> {
    pub fn new(header: &'a str, canonical_names: &'a BTreeMap<String, String>) -> Self {
        Self {
            header,
            canonical_names,
        }
    }

    /// Output name for every matched role. Fails before anything is written
    /// if a matched role has no canonical name.
    pub fn plan(&self, report: &ClassificationReport) -> Result<Vec<(String, String)>> {
        report
            .matched_files()
            .map(|(role, source)| -> Result<(String, String)> {
                let target = self.canonical_names.get(role).ok_or_else(|| {
                    OpenJlcError::MissingCanonicalName {
                        role: role.to_string(),
                    }
                })?;
                Ok((source.to_string(), target.clone()))
            })
            .collect()
    }

    /// Rebuild `dest_dir` from the matched files in `source_dir`
    pub fn stamp(
        &self,
        report: &ClassificationReport,
        source_dir: &Path,
        dest_dir: &Path,
        progress: &ProgressTracker,
    ) -> Result<Vec<PathBuf>> {
        let plan = self.plan(report)?;

        recreate_dir(dest_dir)?;
        info!("Created destination directory: {}", dest_dir.display());

        let pb = progress.create_file_progress(plan.len(), "Stamping files");
        let mut written = Vec::with_capacity(plan.len());

        for (source, target) in plan {
            let source_path = source_dir.join(&source);
            let dest_path = dest_dir.join(&target);

            let content =
                fs::read(&source_path).with_path_context("read source file", &source_path)?;
            self.write_stamped(&dest_path, &content)
                .with_path_context("write stamped file", &dest_path)?;

            info!(
                "Processed file '{}' and saved to '{}'",
                source,
                dest_path.display()
            );
            ProgressTracker::update_progress(&pb, 1, Some(target.as_str()));
            written.push(dest_path);
        }

        ProgressTracker::finish_progress(pb, "Stamping completed");
        Ok(written)
    }

    /// Write `header` then `content` and wait for the data to reach disk
    fn write_stamped(&self, path: &Path, content: &[u8]) -> Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(self.header.as_bytes())?;
        file.write_all(content)?;
        file.sync_all()?;

        debug!(
            "Wrote {} bytes to {}",
            self.header.len() + content.len(),
            path.display()
        );
        Ok(())
    }
}
