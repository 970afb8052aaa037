//! State of the job in flight
//!
//! Written at intake, read by packaging, deleted once the package has been
//! delivered so the next run never sees a stale job.

use crate::archive::is_zip_file;
use crate::error::{OpenJlcError, Result, ResultExt};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Directory the submission came from; the package is delivered here
    pub original: PathBuf,
    /// Filename of the submission archive
    pub name: String,
    /// Log file collecting this job's events
    pub logs: PathBuf,
}

impl JobState {
    /// Describe a new job for `submission`
    pub fn intake(submission: &Path, logs: &Path) -> Result<Self> {
        if !submission.is_file() || !is_zip_file(submission) {
            return Err(OpenJlcError::SubmissionNotFound {
                path: submission.display().to_string(),
            }
            .into());
        }

        let name = submission
            .file_name()
            .and_then(|name| name.to_str())
            .context("Submission filename is not valid UTF-8")?
            .to_string();
        let original = submission
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();

        Ok(Self {
            original,
            name,
            logs: logs.to_path_buf(),
        })
    }

    /// Full path of the submission archive
    pub fn submission(&self) -> PathBuf {
        self.original.join(&self.name)
    }

    /// Where a package called `package_name` is delivered
    pub fn delivery_path(&self, package_name: &str) -> PathBuf {
        self.original.join(package_name)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize job state")?;
        fs::write(path, yaml).with_path_context("write job file", path)?;
        info!("Job for {} recorded at {}", self.name, path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_path_context("read job file", path)?;
        serde_yaml::from_str(&text).with_path_context("parse job file", path)
    }

    /// Remove the persisted job. Missing files are fine.
    pub fn discard(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).with_path_context("delete job file", path)?;
            debug!(
                "Deleted {} to ensure it is recreated next time",
                path.display()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_intake_requires_zip() {
        let dir = TempDir::new().unwrap();
        let not_zip = dir.path().join("design.rar");
        fs::write(&not_zip, "x").unwrap();

        for path in [not_zip, dir.path().join("missing.zip")] {
            let err = JobState::intake(&path, Path::new("log")).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<OpenJlcError>(),
                Some(OpenJlcError::SubmissionNotFound { .. })
            ));
        }
    }

    #[test]
    fn test_save_load_discard() {
        let dir = TempDir::new().unwrap();
        let submission = dir.path().join("design-v1.zip");
        fs::write(&submission, "zip").unwrap();

        let job = JobState::intake(&submission, Path::new("logs/run.log")).unwrap();
        assert_eq!(job.name, "design-v1.zip");
        assert_eq!(job.submission(), submission);
        assert_eq!(
            job.delivery_path("design-v1-AD-L2.zip"),
            dir.path().join("design-v1-AD-L2.zip")
        );

        let path = dir.path().join("package.yaml");
        job.save(&path).unwrap();
        assert_eq!(JobState::load(&path).unwrap(), job);

        JobState::discard(&path).unwrap();
        assert!(!path.exists());
        JobState::discard(&path).unwrap();
    }
}
