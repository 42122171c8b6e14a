use crate::config::Config;
use crate::pipeline::{DocumentPipeline, RunOutcome};
use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Process every PDF waiting in the input directory. One document completes
/// (or fails, or is skipped) before the next starts; a failing document is
/// logged and never halts the batch. Returns how many were fully processed.
pub async fn run_batch(config: &Config, pipeline: &DocumentPipeline) -> Result<usize> {
    let pdfs = find_pdfs(&config.raw_dir);

    if pdfs.is_empty() {
        tracing::info!("Nothing to process in {:?}", config.raw_dir);
        return Ok(0);
    }

    tracing::info!("Found {} files to process", pdfs.len());

    let mut processed = 0;
    for path in pdfs {
        match pipeline.run(&path).await {
            Ok(RunOutcome::Processed) => {
                processed += 1;
                move_to_processed(&path, &config.processed_dir);
            }
            Ok(RunOutcome::Skipped) => {
                tracing::warn!("Skipped {:?}: no relevant content", path);
            }
            Err(e) => {
                tracing::error!("Error processing {:?}: {:#}", path, e);
            }
        }
    }

    Ok(processed)
}

/// PDFs directly inside the input directory, sorted for a stable batch order.
fn find_pdfs(dir: &Path) -> Vec<PathBuf> {
    let mut pdfs: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    pdfs
}

/// Successfully processed source files leave the input directory so a rerun
/// never bills the same document twice.
fn move_to_processed(path: &Path, processed_dir: &Path) {
    let dest = processed_dir.join(path.file_name().unwrap_or_default());
    match std::fs::rename(path, &dest) {
        Ok(()) => tracing::info!("Moved to {:?}", dest),
        Err(e) => tracing::warn!("Could not move {:?} to {:?}: {}", path, dest, e),
    }
}
