//! Batch driver: discovery, per-file pipeline and summary.
//!
//! Every input path ends up as exactly one [`FileRecord`]. Failures are values,
//! so one bad file never stops the others.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::ImageReader;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::control::CancellationToken;
use crate::date::{DateResolver, Provenance};
use crate::media::{self, SupportedFormat};
use crate::render::WatermarkRenderer;
use crate::writer;
use crate::{BatchOptions, ProgressCallback};

/// Last stage a file reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileStage {
    Discovered,
    Opened,
    DateResolved,
    Rendered,
    Written,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedFormat,
    TooLarge,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::UnsupportedFormat => "unsupported format",
            SkipReason::TooLarge => "file too large",
            SkipReason::Cancelled => "cancelled",
        })
    }
}

/// Per-file failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    UnsupportedFormat,
    DecodeError,
    RenderError,
    WriteError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::NotFound => "not found",
            FailureKind::UnsupportedFormat => "unsupported format",
            FailureKind::DecodeError => "decode error",
            FailureKind::RenderError => "render error",
            FailureKind::WriteError => "write error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Success(PathBuf),
    Skipped(SkipReason),
    Failed { kind: FailureKind, message: String },
}

/// What happened to one input path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub input: PathBuf,
    pub outcome: FileOutcome,
    pub stage: FileStage,
    pub provenance: Option<Provenance>,
}

impl FileRecord {
    fn skipped(input: &Path, reason: SkipReason) -> Self {
        Self {
            input: input.to_path_buf(),
            outcome: FileOutcome::Skipped(reason),
            stage: FileStage::Discovered,
            provenance: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FileOutcome::Success(_))
    }
}

/// Aggregate result of one run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub records: Vec<FileRecord>,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cancelled: bool,
    pub output_dir: Option<PathBuf>,
}

impl BatchSummary {
    fn from_records(records: Vec<FileRecord>, output_dir: Option<PathBuf>) -> Self {
        let mut summary = BatchSummary {
            output_dir,
            ..Default::default()
        };
        for record in &records {
            match record.outcome {
                FileOutcome::Success(_) => summary.succeeded += 1,
                FileOutcome::Skipped(reason) => {
                    summary.skipped += 1;
                    if reason == SkipReason::Cancelled {
                        summary.cancelled = true;
                    }
                }
                FileOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary.records = records;
        summary
    }

    pub fn total(&self) -> u64 {
        self.records.len() as u64
    }

    /// Failed records with their kind and message.
    pub fn failures(&self) -> impl Iterator<Item = (&Path, FailureKind, &str)> {
        self.records.iter().filter_map(|r| match &r.outcome {
            FileOutcome::Failed { kind, message } => Some((r.input.as_path(), *kind, message.as_str())),
            _ => None,
        })
    }
}

/// A discovered input and the directory its output goes to.
#[derive(Debug, Clone)]
struct WorkItem {
    input: PathBuf,
    output_dir: PathBuf,
}

/// Collect regular files under `dir` in lexical order.
fn list_dir(dir: &Path, recursive: bool, exclude: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if recursive && !same_path(&path, exclude) {
                if let Err(e) = list_dir(&path, recursive, exclude, files) {
                    warn!("Cannot read directory {}: {}", path.display(), e);
                }
            }
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Drives the resolver and renderer over every discovered file.
pub struct BatchProcessor<'a> {
    options: &'a BatchOptions,
    renderer: &'a WatermarkRenderer,
    resolver: DateResolver,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(options: &'a BatchOptions, renderer: &'a WatermarkRenderer, resolver: DateResolver) -> Self {
        Self {
            options,
            renderer,
            resolver,
        }
    }

    /// Resolve inputs into work items; returns the output root when one applies.
    fn discover(&self, early: &mut Vec<FileRecord>) -> (Vec<WorkItem>, Option<PathBuf>) {
        let input = &self.options.input;

        if !input.exists() {
            error!("Input not found: {}", input.display());
            early.push(FileRecord {
                input: input.clone(),
                outcome: FileOutcome::Failed {
                    kind: FailureKind::NotFound,
                    message: format!("{} does not exist", input.display()),
                },
                stage: FileStage::Discovered,
                provenance: None,
            });
            return (Vec::new(), None);
        }

        if input.is_dir() {
            let output_root = self
                .options
                .output
                .clone()
                .unwrap_or_else(|| media::derive_output_dir(input));

            let mut files = Vec::new();
            if let Err(e) = list_dir(input, self.options.recursive, &output_root, &mut files) {
                error!("Cannot read directory {}: {}", input.display(), e);
                early.push(FileRecord {
                    input: input.clone(),
                    outcome: FileOutcome::Failed {
                        kind: FailureKind::NotFound,
                        message: format!("cannot read directory: {}", e),
                    },
                    stage: FileStage::Discovered,
                    provenance: None,
                });
            }

            let items = files
                .into_iter()
                .map(|file| {
                    // Mirror subdirectories under the output root
                    let rel_dir = file
                        .parent()
                        .and_then(|p| p.strip_prefix(input).ok())
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    WorkItem {
                        output_dir: output_root.join(rel_dir),
                        input: file,
                    }
                })
                .collect();
            return (items, Some(output_root));
        }

        let containing = match input.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let output_root = self
            .options
            .output
            .clone()
            .unwrap_or_else(|| media::derive_output_dir(&containing));
        let item = WorkItem {
            input: input.clone(),
            output_dir: output_root.clone(),
        };
        (vec![item], Some(output_root))
    }

    /// Process every discovered file and aggregate the outcomes.
    pub fn run(&self, cancel: Option<&CancellationToken>, progress: &ProgressCallback<'_>) -> BatchSummary {
        let mut records = Vec::new();
        let (items, output_root) = self.discover(&mut records);

        let total = items.len() as u64;
        if total > 0 {
            info!("Processing {} file(s) with {}", total, self.renderer.font_source());
        }
        let done = AtomicU64::new(0);

        let process = |item: &WorkItem| -> FileRecord {
            let record = match cancel {
                Some(token) if token.is_cancelled() => FileRecord::skipped(&item.input, SkipReason::Cancelled),
                _ => self.process_file(item),
            };
            log_outcome(&record);
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            progress(&record, current, total);
            record
        };

        let results: Vec<FileRecord> = match self.thread_pool() {
            Some(pool) => pool.install(|| items.par_iter().map(process).collect()),
            None => items.iter().map(process).collect(),
        };
        records.extend(results);

        BatchSummary::from_records(records, output_root)
    }

    /// Worker pool for `jobs != 1`; `None` means run inline.
    fn thread_pool(&self) -> Option<rayon::ThreadPool> {
        if self.options.jobs == 1 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new().num_threads(self.options.jobs).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("Cannot start worker pool ({}), processing sequentially", e);
                None
            }
        }
    }

    fn process_file(&self, item: &WorkItem) -> FileRecord {
        let mut record = FileRecord {
            input: item.input.clone(),
            outcome: FileOutcome::Skipped(SkipReason::UnsupportedFormat),
            stage: FileStage::Discovered,
            provenance: None,
        };
        record.outcome = match self.run_stages(item, &mut record) {
            Ok(outcome) => outcome,
            Err((kind, message)) => FileOutcome::Failed { kind, message },
        };
        record
    }

    fn run_stages(
        &self,
        item: &WorkItem,
        record: &mut FileRecord,
    ) -> Result<FileOutcome, (FailureKind, String)> {
        let path = item.input.as_path();

        // Discovered
        if SupportedFormat::from_path(path).is_none() {
            return Ok(FileOutcome::Skipped(SkipReason::UnsupportedFormat));
        }
        let size = fs::metadata(path).map_err(|e| open_failure(&e))?.len();
        if size > self.options.max_file_size {
            return Ok(FileOutcome::Skipped(SkipReason::TooLarge));
        }

        // Opened
        let reader = ImageReader::open(path)
            .map_err(|e| open_failure(&e))?
            .with_guessed_format()
            .map_err(|e| open_failure(&e))?;
        let format = reader
            .format()
            .and_then(SupportedFormat::from_image_format)
            .ok_or_else(|| {
                (
                    FailureKind::UnsupportedFormat,
                    match reader.format() {
                        Some(f) => format!("content is {:?}, which is not supported", f),
                        None => "unrecognized image content".to_string(),
                    },
                )
            })?;
        let image = reader
            .decode()
            .map_err(|e| (FailureKind::DecodeError, e.to_string()))?;
        record.stage = FileStage::Opened;

        // DateResolved
        let date = self.resolver.resolve(path);
        record.provenance = Some(date.provenance);
        record.stage = FileStage::DateResolved;

        // Rendered
        let stamped = self
            .renderer
            .render(&image, &date.text())
            .map_err(|e| (FailureKind::RenderError, e.to_string()))?;
        drop(image);
        record.stage = FileStage::Rendered;

        // Written
        let file_name = media::output_file_name(path)
            .ok_or_else(|| (FailureKind::WriteError, "input has no file name".to_string()))?;
        let dest = item.output_dir.join(file_name);
        writer::write_image(&stamped, &dest, format)
            .map_err(|e| (FailureKind::WriteError, format!("{}: {:#}", dest.display(), e)))?;
        record.stage = FileStage::Written;

        debug!("{} stamped with {} ({})", path.display(), date.text(), date.provenance);
        Ok(FileOutcome::Success(dest))
    }
}

fn open_failure(e: &io::Error) -> (FailureKind, String) {
    let kind = match e.kind() {
        io::ErrorKind::NotFound => FailureKind::NotFound,
        _ => FailureKind::DecodeError,
    };
    (kind, e.to_string())
}

fn log_outcome(record: &FileRecord) {
    match &record.outcome {
        FileOutcome::Success(dest) => {
            info!("Processed {} -> {}", record.input.display(), dest.display())
        }
        FileOutcome::Skipped(reason) => warn!("Skipped {}: {}", record.input.display(), reason),
        FileOutcome::Failed { kind, message } => error!(
            "Failed {} ({}, after {:?}): {}",
            record.input.display(),
            kind,
            record.stage,
            message
        ),
    }
}
