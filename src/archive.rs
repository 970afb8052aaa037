//! ZIP handling for the intake submission and the delivery package

use crate::error::{OpenJlcError, Result, ResultExt};
use crate::progress::ProgressTracker;
use anyhow::Context;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Whether `path` names a `.zip` file, by extension
pub fn is_zip_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Finder metadata that rides along in archives made on macOS
pub fn is_macos_metadata(path: &Path) -> bool {
    path.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name == "__MACOSX" || name == ".DS_Store" || name.starts_with("._")
    })
}

/// Unpack `zip_path` into `target_dir`, returning the extracted file paths
pub fn extract_zip(
    zip_path: &Path,
    target_dir: &Path,
    progress: &ProgressTracker,
) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(zip_path).with_path_context("open ZIP file", zip_path)?;

    let mut archive = ZipArchive::new(file).map_err(|e| OpenJlcError::ZipExtractionFailed {
        reason: format!("Invalid ZIP file: {}", e),
    })?;

    info!(
        "Extracting {} entries from {}",
        archive.len(),
        zip_path.display()
    );
    let pb = progress.create_file_progress(archive.len(), "Extracting files");
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| OpenJlcError::ZipExtractionFailed {
                reason: format!("Failed to read file at index {}: {}", i, e),
            })?;

        // Entries with absolute paths or `..` components are refused
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| OpenJlcError::ZipExtractionFailed {
                reason: format!("Unsafe path in archive: {}", entry.name()),
            })?;
        if is_macos_metadata(&relative) {
            debug!("Skipping macOS metadata {}", relative.display());
            ProgressTracker::update_progress(&pb, 1, None);
            continue;
        }
        let outpath = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath).with_path_context("create directory", &outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).with_path_context("create parent directory", parent)?;
            }

            let mut outfile =
                fs::File::create(&outpath).with_path_context("create output file", &outpath)?;
            io::copy(&mut entry, &mut outfile)
                .with_path_context("write extracted file", &outpath)?;
            outfile
                .sync_all()
                .with_path_context("flush extracted file", &outpath)?;

            debug!("Extracted {}", outpath.display());
            extracted.push(outpath);
        }

        ProgressTracker::update_progress(&pb, 1, None);
    }

    ProgressTracker::finish_progress(pb, "Extraction completed");
    Ok(extracted)
}

/// Pack every file under `source_dir` into `output_path`, keeping paths
/// relative to `source_dir`
pub fn create_zip_from_dir(
    source_dir: &Path,
    output_path: &Path,
    progress: &ProgressTracker,
) -> Result<()> {
    let mut files = Vec::new();
    collect_files(source_dir, &mut files)?;
    files.sort();

    info!("Creating ZIP file: {}", output_path.display());

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).with_path_context("create output directory", parent)?;
    }

    let file = fs::File::create(output_path).with_path_context("create ZIP file", output_path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let pb = progress.create_file_progress(files.len(), "Creating ZIP file");

    for file_path in &files {
        let relative = file_path
            .strip_prefix(source_dir)
            .context("File outside of packaging directory")?;
        let entry_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(entry_name.as_str(), options)
            .context("Failed to start ZIP file entry")?;

        let content = fs::read(file_path).with_path_context("read file for ZIP", file_path)?;
        zip.write_all(&content)
            .context("Failed to write file content to ZIP")?;

        ProgressTracker::update_progress(&pb, 1, Some(entry_name.as_str()));
    }

    let file = zip.finish().context("Failed to finalize ZIP file")?;
    file.sync_all()
        .with_path_context("flush ZIP file", output_path)?;

    ProgressTracker::finish_progress(pb, "ZIP file created successfully");
    info!("ZIP file created successfully: {}", output_path.display());
    Ok(())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_path_context("read directory", dir)? {
        let path = entry.with_path_context("read directory entry", dir)?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}
