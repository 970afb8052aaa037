//! Job orchestration
//!
//! One run moves a submission through intake, identification, conversion,
//! packaging and cleanup. Each stage returns only after its writes are on
//! disk. A failing stage stops the run where it is; the next intake starts
//! from scratch.

use crate::archive::{create_zip_from_dir, extract_zip};
use crate::classify::{ClassificationReport, Classifier};
use crate::config::Settings;
use crate::error::{OpenJlcError, Result, ResultExt};
use crate::header::HeaderGenerator;
use crate::job::JobState;
use crate::package::PackageName;
use crate::progress::ProgressTracker;
use crate::rules::RuleSet;
use crate::stamp::HeaderStamper;
use crate::target::{Identifier, TargetDescriptor, TargetOverride};
use crate::workspace::{
    clear_dir, copy_dir_contents, list_file_names, recreate_dir, working_root, Workspace,
    MUST_READ_NAME,
};
use anyhow::Context;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Stages of a run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Intake,
    Identify,
    Convert,
    Package,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Intake => "intake",
            Stage::Identify => "identification",
            Stage::Convert => "conversion",
            Stage::Package => "packaging",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// How a run ended, when it did not fail
#[derive(Debug)]
pub enum RunOutcome {
    /// The package was delivered next to the submission
    Packaged {
        archive: PathBuf,
        name: PackageName,
        target: TargetDescriptor,
        report: ClassificationReport,
    },
    /// Nothing looked like a board outline, so nothing was packaged
    NoOutline { dir: PathBuf },
}

/// Runs jobs against one working root
pub struct Pipeline {
    workspace: Workspace,
    overrides: TargetOverride,
    progress: ProgressTracker,
    log_file: PathBuf,
}

impl Pipeline {
    pub fn new(workspace: Workspace, progress: ProgressTracker) -> Self {
        let log_file = workspace.logs_dir().join("openjlc.log");
        Self {
            workspace,
            overrides: TargetOverride::default(),
            progress,
            log_file,
        }
    }

    /// Tool and edge choices that beat the configuration file
    pub fn with_overrides(mut self, overrides: TargetOverride) -> Self {
        self.overrides = overrides;
        self
    }

    /// Log file recorded in the job state
    pub fn with_log_file(mut self, log_file: PathBuf) -> Self {
        self.log_file = log_file;
        self
    }

    /// Convert `submission` and deliver the package next to it
    pub fn run(&self, submission: &Path) -> Result<RunOutcome> {
        let start = Instant::now();
        info!("Starting job for {}", submission.display());

        self.workspace.init()?;
        let settings = Settings::load(&self.workspace.config_file())?;
        let overrides = settings.resolve_overrides(self.overrides)?;

        let job = self
            .intake(submission)
            .with_context(|| format!("Job halted during {}", Stage::Intake))?;

        let target = match self
            .identify(&settings, overrides)
            .with_context(|| format!("Job halted during {}", Stage::Identify))?
        {
            Some(target) => target,
            None => {
                let dir = self.workspace.intake_dir();
                warn!(
                    "No outline file found under {}, nothing to package",
                    dir.display()
                );
                return Ok(RunOutcome::NoOutline { dir });
            }
        };

        let report = self
            .convert(&settings, target)
            .with_context(|| format!("Job halted during {}", Stage::Convert))?;

        let (archive, name) = self
            .package(&job, &report)
            .with_context(|| format!("Job halted during {}", Stage::Package))?;

        self.cleanup()
            .with_context(|| format!("Job halted during {}", Stage::Cleanup))?;

        info!(
            "Job finished in {} ms, package at {}",
            start.elapsed().as_millis(),
            archive.display()
        );
        Ok(RunOutcome::Packaged {
            archive,
            name,
            target,
            report,
        })
    }

    /// Record the job and unpack the submission into a clean intake directory
    fn intake(&self, submission: &Path) -> Result<JobState> {
        let job = JobState::intake(submission, &self.log_file)?;
        job.save(&self.workspace.job_file())?;

        let intake_dir = self.workspace.intake_dir();
        clear_dir(&intake_dir)?;
        let extracted = extract_zip(&job.submission(), &intake_dir, &self.progress)?;
        info!(
            "Extracted {} files into {}",
            extracted.len(),
            intake_dir.display()
        );

        Ok(job)
    }

    /// Resolve tool and edge. `None` when no outline file exists.
    fn identify(
        &self,
        settings: &Settings,
        overrides: TargetOverride,
    ) -> Result<Option<TargetDescriptor>> {
        let spinner = self.progress.create_spinner("Identifying design tool...");
        let identifier = Identifier::new(settings.identification_pattern())?;

        let target = match identifier.identify(&self.workspace.intake_dir(), overrides) {
            Ok(target) => target,
            Err(e)
                if matches!(
                    e.downcast_ref::<OpenJlcError>(),
                    Some(OpenJlcError::NoOutlineFileFound { .. })
                ) =>
            {
                ProgressTracker::finish_with_error(spinner, "No outline file found");
                return Ok(None);
            }
            Err(e) => {
                ProgressTracker::finish_with_error(spinner, "Identification failed");
                return Err(e);
            }
        };

        target.save(&self.workspace.target_file())?;
        ProgressTracker::finish_progress(spinner, "Identification completed");
        Ok(Some(target))
    }

    /// Build the output set and the classification report
    fn convert(
        &self,
        settings: &Settings,
        target: TargetDescriptor,
    ) -> Result<ClassificationReport> {
        let source_dir = working_root(&self.workspace.intake_dir())?;
        let output_dir = self.workspace.output_dir();
        let header = HeaderGenerator::new().write(&self.workspace.header_file())?;

        let report = if target.tool.is_canonical() {
            info!(
                "Bundle is already in {} layout, copying it through",
                target.tool
            );
            recreate_dir(&output_dir)?;
            let copied = copy_dir_contents(&source_dir, &output_dir)?;
            info!("Copied {} files into {}", copied, output_dir.display());

            let rules = RuleSet::canonical()?;
            Classifier::new(&rules).survey(target.tool, &list_file_names(&output_dir)?)
        } else {
            let rules = RuleSet::load(&self.workspace.rule_dir(), target.tool, target.edge)?;
            let report = Classifier::new(&rules)
                .classify(target.tool, &list_file_names(&source_dir)?)
                .with_tool_context(target.tool.as_str())?;

            HeaderStamper::new(&header, &settings.file_name).stamp(
                &report,
                &source_dir,
                &output_dir,
                &self.progress,
            )?;
            report
        };

        report.save(&self.workspace.report_file())?;

        let note_path = output_dir.join(MUST_READ_NAME);
        let note = self.workspace.must_read_note()?;
        fs::write(&note_path, note.as_ref()).with_path_context("write ordering note", &note_path)?;

        Ok(report)
    }

    /// Zip the output set and deliver it next to the submission
    fn package(
        &self,
        job: &JobState,
        report: &ClassificationReport,
    ) -> Result<(PathBuf, PackageName)> {
        let name = PackageName::derive(report, &job.name);
        let delivery = job.delivery_path(&name.to_string());

        // Built beside the destination so the final rename stays on one filesystem
        let staging = tempfile::Builder::new()
            .prefix(".openjlc-")
            .suffix(".zip")
            .tempfile_in(&job.original)
            .with_path_context("create staging file", &job.original)?;

        create_zip_from_dir(&self.workspace.output_dir(), staging.path(), &self.progress)?;
        staging
            .persist(&delivery)
            .map_err(|e| e.error)
            .with_path_context("deliver package", &delivery)?;

        info!("Package delivered: {}", delivery.display());
        Ok((delivery, name))
    }

    /// Forget the job and empty the working directories
    fn cleanup(&self) -> Result<()> {
        JobState::discard(&self.workspace.job_file())?;
        clear_dir(&self.workspace.intake_dir())?;
        clear_dir(&self.workspace.output_dir())?;
        info!("Workspace cleaned up");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{EdaTool, EdgeConvention};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn pipeline(root: &Path) -> Pipeline {
        Pipeline::new(Workspace::new(root), ProgressTracker::new(false))
    }

    #[test]
    fn test_no_outline_halts_without_package() {
        let root = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let submission = inbox.path().join("bare.zip");
        write_zip(&submission, &[("board.GTL", "G04 Altium*\n")]);

        let outcome = pipeline(root.path()).run(&submission).unwrap();

        assert!(matches!(outcome, RunOutcome::NoOutline { .. }));
        assert_eq!(fs::read_dir(inbox.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_ambiguous_bundle_fails_in_conversion() {
        let root = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let submission = inbox.path().join("twice.zip");
        write_zip(
            &submission,
            &[
                ("board.GKO", "G04 Altium Designer*\n"),
                ("a.GTL", "top a"),
                ("b.GTL", "top b"),
            ],
        );

        let err = pipeline(root.path()).run(&submission).unwrap_err();

        assert!(format!("{:#}", err).contains("conversion"));
        match err.downcast_ref::<OpenJlcError>() {
            Some(OpenJlcError::AmbiguousMatch { role, candidates }) => {
                assert_eq!(role, "Top_Cu");
                assert_eq!(candidates, &vec!["a.GTL".to_string(), "b.GTL".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(Workspace::new(root.path()).job_file().exists());
    }

    #[test]
    fn test_overrides_skip_detection() {
        let root = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let submission = inbox.path().join("kicad.zip");
        write_zip(
            &submission,
            &[
                ("board-Edge_Cuts.gm1", "no signature here\n"),
                ("board-F_Cu.gtl", "top"),
            ],
        );

        let outcome = pipeline(root.path())
            .with_overrides(TargetOverride {
                tool: Some(EdaTool::KiCad),
                edge: Some(EdgeConvention::Gm1),
            })
            .run(&submission)
            .unwrap();

        match outcome {
            RunOutcome::Packaged { name, target, .. } => {
                assert_eq!(target.tool, EdaTool::KiCad);
                assert_eq!(name.to_string(), "kicad-Ki-L1.zip");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
