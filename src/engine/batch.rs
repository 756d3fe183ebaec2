// src/engine/batch.rs
//
// Batch coordinator: run up to MAX_BATCH_FILES inputs through the same
// options in chunks of BATCH_CONCURRENCY, isolate per-file failures and
// pack the successful outputs into a zip archive.

use crate::engine::common::run_with_panic_policy;
use crate::engine::io::InputFile;
use crate::engine::policy::PipelineConfig;
use crate::engine::pool::{self, BATCH_CONCURRENCY};
use crate::engine::tasks::{write_atomic, ProcessTask, TaskOutput};
use crate::error::PixelPressError;
use crate::ops::{OutputFormat, TransformOptions};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

type BatchResult<T> = std::result::Result<T, PixelPressError>;

/// Inputs beyond this count are dropped and reported in `truncated`.
pub const MAX_BATCH_FILES: usize = 30;

#[derive(Clone, Debug)]
pub enum BatchItem {
    Succeeded {
        name: String,
        /// Entry name inside the archive.
        archive_name: String,
        size: usize,
        width: u32,
        height: u32,
    },
    Failed {
        name: String,
        error: PixelPressError,
    },
}

impl BatchItem {
    pub fn name(&self) -> &str {
        match self {
            BatchItem::Succeeded { name, .. } | BatchItem::Failed { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchItem::Succeeded { .. })
    }
}

#[derive(Clone, Debug)]
pub struct BatchReport {
    /// Zip archive with one stored entry per successful item.
    pub archive: Vec<u8>,
    /// One entry per processed input, in input order.
    pub items: Vec<BatchItem>,
    pub succeeded: usize,
    pub failed: usize,
    /// Inputs dropped by the MAX_BATCH_FILES cap.
    pub truncated: usize,
}

impl BatchReport {
    pub fn write_archive(&self, path: impl AsRef<Path>) -> BatchResult<()> {
        write_atomic(path.as_ref(), &self.archive)
    }
}

/// Archive entry names, unique within one archive: "name.ext",
/// then "name (1).ext", "name (2).ext", ...
#[derive(Debug, Default)]
struct ArchiveNames {
    used: HashSet<String>,
}

impl ArchiveNames {
    fn assign(&mut self, stem: &str, format: OutputFormat) -> String {
        let ext = format.extension();
        let mut candidate = format!("{stem}.{ext}");
        let mut n = 1;
        while self.used.contains(&candidate) {
            candidate = format!("{stem} ({n}).{ext}");
            n += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

/// Run one chunk into its slots. A panic anywhere in `run_one` is caught
/// per item and recorded as that item's failure.
fn run_chunk<F>(
    chunk: &[(usize, InputFile)],
    slots: &Mutex<Vec<Option<BatchResult<TaskOutput>>>>,
    run_one: &F,
) where
    F: Fn(&InputFile) -> BatchResult<TaskOutput> + Sync,
{
    let isolated = |input: &InputFile| run_with_panic_policy("batch:item", || run_one(input));
    let work = || {
        chunk.par_iter().for_each(|(index, input)| {
            let result = isolated(input);
            slots.lock()[*index] = Some(result);
        })
    };
    match pool::batch_pool() {
        Some(pool) => pool.install(work),
        None => {
            for (index, input) in chunk {
                slots.lock()[*index] = Some(isolated(input));
            }
        }
    }
}

/// Process `inputs` with shared `options`. Only an archive failure fails
/// the whole batch; individual files fail into `BatchItem::Failed`.
pub fn process_batch(
    mut inputs: Vec<InputFile>,
    options: &TransformOptions,
    config: &PipelineConfig,
) -> BatchResult<BatchReport> {
    let truncated = inputs.len().saturating_sub(MAX_BATCH_FILES);
    inputs.truncate(MAX_BATCH_FILES);
    if truncated > 0 {
        warn!(
            target: "pixel_press::batch",
            dropped = truncated,
            max = MAX_BATCH_FILES,
            "batch exceeds file cap; extra inputs dropped"
        );
    }

    let indexed: Vec<(usize, InputFile)> = inputs.into_iter().enumerate().collect();
    let slots: Mutex<Vec<Option<BatchResult<TaskOutput>>>> =
        Mutex::new((0..indexed.len()).map(|_| None).collect());

    // Chunks run one after another; files inside a chunk run together.
    let run_one =
        |input: &InputFile| ProcessTask::new(input.clone(), options.clone(), *config).run();
    for chunk in indexed.chunks(BATCH_CONCURRENCY) {
        run_chunk(chunk, &slots, &run_one);
    }

    let results = slots.into_inner();
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let entry_options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut names = ArchiveNames::default();
    let mut items = Vec::with_capacity(results.len());

    for ((_, input), slot) in indexed.iter().zip(results) {
        let result = slot.unwrap_or_else(|| {
            Err(PixelPressError::internal_panic("batch slot was never filled"))
        });
        match result {
            Ok(output) => {
                let archive_name = names.assign(input.stem(), output.format);
                writer
                    .start_file(archive_name.as_str(), entry_options)
                    .map_err(|e| PixelPressError::archive_failed(format!("start entry: {e}")))?;
                writer
                    .write_all(&output.data)
                    .map_err(|e| PixelPressError::archive_failed(format!("write entry: {e}")))?;
                items.push(BatchItem::Succeeded {
                    name: input.name.clone(),
                    archive_name,
                    size: output.data.len(),
                    width: output.width,
                    height: output.height,
                });
            }
            Err(error) => {
                warn!(
                    target: "pixel_press::batch",
                    file = %input.name,
                    category = error.category().as_str(),
                    %error,
                    "batch item failed"
                );
                items.push(BatchItem::Failed {
                    name: input.name.clone(),
                    error,
                });
            }
        }
    }

    let archive = writer
        .finish()
        .map_err(|e| PixelPressError::archive_failed(format!("finish archive: {e}")))?
        .into_inner();

    let succeeded = items.iter().filter(|i| i.is_success()).count();
    let failed = items.len() - succeeded;
    info!(
        target: "pixel_press::batch",
        succeeded,
        failed,
        truncated,
        archive_bytes = archive.len(),
        "batch finished"
    );

    Ok(BatchReport {
        archive,
        items,
        succeeded,
        failed,
        truncated,
    })
}
