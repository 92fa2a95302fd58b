pub mod batch;
pub mod config;
pub mod control;
pub mod date;
pub mod media;
pub mod render;
pub mod style;
pub mod writer;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use batch::{
    BatchProcessor, BatchSummary, FailureKind, FileOutcome, FileRecord, FileStage, SkipReason,
};
pub use config::{ConfigStore, StyleRecord, CONFIG_FILENAME};
pub use control::CancellationToken;
pub use date::{CaptureDate, DateResolver, MetadataError, Provenance};
pub use render::{FontSource, RenderError, TextFont, WatermarkRenderer};
pub use style::{Color, Position, StyleConfig, ValidationError};

/// Files above this size are skipped (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

fn default_jobs() -> usize {
    1
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOptions {
    /// A single image or a directory of images.
    pub input: PathBuf,
    /// Output directory; derived from the input when unset.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub recursive: bool,
    /// Worker threads: 1 runs inline, 0 uses one per CPU.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: None,
            recursive: false,
            jobs: default_jobs(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Control options for a run (cancellation, clock).
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    /// Checked before each file; set by the stop signal.
    pub cancel_token: Option<CancellationToken>,
    /// Date resolver, replaceable for a fixed "today".
    pub resolver: DateResolver,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn with_resolver(mut self, resolver: DateResolver) -> Self {
        self.resolver = resolver;
        self
    }
}

/// Called once per finished file with (record, done, total). May borrow
/// from the caller's stack.
pub type ProgressCallback<'a> = dyn Fn(&FileRecord, u64, u64) + Send + Sync + 'a;

/// Stamp every image under `input` with its capture date.
pub fn run(input: &Path, style: &StyleConfig, output: Option<&Path>) -> BatchSummary {
    let options = BatchOptions {
        input: input.to_path_buf(),
        output: output.map(Path::to_path_buf),
        ..Default::default()
    };
    process(&options, style, &|_, _, _| {})
}

/// Run a batch with progress reporting.
pub fn process(
    options: &BatchOptions,
    style: &StyleConfig,
    progress_callback: &ProgressCallback<'_>,
) -> BatchSummary {
    process_with_control(options, style, &ProcessControl::default(), progress_callback)
}

/// Run a batch with progress reporting and control options.
pub fn process_with_control(
    options: &BatchOptions,
    style: &StyleConfig,
    control: &ProcessControl,
    progress_callback: &ProgressCallback<'_>,
) -> BatchSummary {
    let renderer = WatermarkRenderer::new(style);
    BatchProcessor::new(options, &renderer, control.resolver)
        .run(control.cancel_token.as_ref(), progress_callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: BatchOptions = serde_json::from_str(r#"{"input": "/photos"}"#).unwrap();
        assert_eq!(options.input, PathBuf::from("/photos"));
        assert_eq!(options.jobs, 1);
        assert_eq!(options.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert!(!options.recursive);
    }

    #[test]
    fn test_run_with_output_override() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir(&input).unwrap();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 120, Rgb([0, 0, 0])))
            .save(input.join("p.bmp"))
            .unwrap();

        let out = dir.path().join("stamped");
        let summary = run(&input, &StyleConfig::default(), Some(&out));
        assert_eq!(summary.succeeded, 1);
        assert!(out.join("p_watermark.bmp").is_file());
        assert!(!dir.path().join("in_watermark").exists());
    }

    #[test]
    fn test_progress_callback_borrows_local_state() {
        let dir = tempdir().unwrap();
        for name in ["a.png", "b.png"] {
            DynamicImage::ImageRgb8(RgbImage::new(60, 40))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let seen = std::sync::Mutex::new(Vec::new());
        let options = BatchOptions {
            input: dir.path().to_path_buf(),
            output: Some(dir.path().join("out")),
            jobs: 2,
            ..Default::default()
        };
        let summary = process(&options, &StyleConfig::default(), &|record, done, total| {
            seen.lock().unwrap().push((record.input.clone(), done, total));
        });

        let mut seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(_, _, total)| *total == 3));
        seen.sort_by_key(|(_, done, _)| *done);
        assert_eq!(seen.iter().map(|(_, done, _)| *done).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn test_pre_cancelled_run_touches_nothing() {
        let dir = tempdir().unwrap();
        DynamicImage::ImageRgb8(RgbImage::new(50, 50))
            .save(dir.path().join("x.png"))
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let options = BatchOptions {
            input: dir.path().to_path_buf(),
            output: Some(dir.path().join("out")),
            ..Default::default()
        };
        let control = ProcessControl::new().with_cancel_token(token);
        let summary = process_with_control(&options, &StyleConfig::default(), &control, &|_, _, _| {});

        assert!(summary.cancelled);
        assert_eq!(summary.records[0].outcome, FileOutcome::Skipped(SkipReason::Cancelled));
        assert!(!dir.path().join("out").exists());
    }
}
