//! OpenJLC - Repackage Gerber bundles for LCEDA ordering

#![allow(non_snake_case)]

use std::fs;
use tracing::{error, info};
use OpenJLC::{
    config::{init_tracing, log_file_path, Config, Mode},
    error::{Result, ResultExt},
    pipeline::{Pipeline, RunOutcome},
    progress::ProgressTracker,
    workspace::Workspace,
};

fn main() -> Result<()> {
    let config = Config::from_args().unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    let workspace = Workspace::new(&config.root);

    match run(&config, workspace) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(config: &Config, workspace: Workspace) -> Result<()> {
    let logs_dir = workspace.logs_dir();
    fs::create_dir_all(&logs_dir).with_path_context("create logs directory", &logs_dir)?;
    let log_file = log_file_path(&logs_dir);
    init_tracing(config.verbose, Some(&log_file))?;

    let submission = match &config.mode {
        Mode::Init => {
            workspace.init()?;
            println!("Working root ready at {}", workspace.root().display());
            return Ok(());
        }
        Mode::Convert { submission } => submission,
    };

    if config.verbose {
        info!("Configuration: {:?}", config);
    }

    let pipeline = Pipeline::new(workspace, ProgressTracker::new(!config.no_progress))
        .with_overrides(config.overrides)
        .with_log_file(log_file);

    match pipeline.run(submission)? {
        RunOutcome::Packaged { archive, name, .. } => {
            if name.is_flagged() {
                println!("Packaged with unrecognized labels: {}", archive.display());
            } else {
                println!("Packaged: {}", archive.display());
            }
        }
        RunOutcome::NoOutline { dir } => {
            println!(
                "No board outline file found in {}, nothing packaged",
                dir.display()
            );
        }
    }

    Ok(())
}
