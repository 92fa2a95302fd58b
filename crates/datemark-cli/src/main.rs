use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use datemark_core::{
    BatchOptions, BatchSummary, CancellationToken, ConfigStore, FileOutcome, ProcessControl, StyleRecord,
    CONFIG_FILENAME,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "watermark.log";

#[derive(Parser)]
#[command(name = "datemark", version, about = "Stamp photos with their capture date as a text watermark")]
struct Cli {
    /// Image file or directory of images
    input: Option<PathBuf>,

    /// Image file or directory of images (alternative to the positional argument)
    #[arg(short = 'i', long = "input", conflicts_with = "input")]
    input_flag: Option<PathBuf>,

    /// Font size in pixels [default: 24]
    #[arg(short = 's', long)]
    font_size: Option<u32>,

    /// Color name, "R,G,B" or #RRGGBB [default: white]
    #[arg(short, long)]
    color: Option<String>,

    /// top-left, top-right, bottom-left, bottom-right or center [default: bottom-right]
    #[arg(short, long)]
    position: Option<String>,

    /// Opacity between 0 and 1 [default: 0.8]
    #[arg(short, long)]
    opacity: Option<f32>,

    /// Output directory (default: <dir>_watermark next to the input directory)
    #[arg(long)]
    output: Option<PathBuf>,

    /// TrueType/OpenType font file
    #[arg(long)]
    font_path: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Debug logging on the console
    #[arg(short, long)]
    verbose: bool,

    /// Saved configuration file
    #[arg(long, default_value = CONFIG_FILENAME)]
    config: PathBuf,

    /// Start from the saved configuration; flags still override it
    #[arg(long)]
    load_config: bool,

    /// Save the effective style to the configuration file
    #[arg(long)]
    save_config: bool,

    /// Append-only log of per-file outcomes
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,
}

impl Cli {
    fn style_flags(&self) -> StyleRecord {
        StyleRecord {
            font_size: self.font_size,
            color: self.color.clone(),
            position: self.position.clone(),
            opacity: self.opacity,
            font_path: self.font_path.clone(),
        }
    }
}

/// Console on stderr plus a plain-text log file. The guard flushes the file on drop.
fn init_logging(verbose: bool, log_file: &Path) -> WorkerGuard {
    let dir = match log_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| DEFAULT_LOG_FILE.into());
    let (file_writer, guard) = tracing_appender::non_blocking(rolling::never(dir, file_name));

    let default_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let console_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_level),
        )
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    guard
}

fn print_summary(summary: &BatchSummary, elapsed: f64) {
    if let Some(dir) = &summary.output_dir {
        eprintln!("Output: {}", dir.display());
    }
    for (path, kind, message) in summary.failures() {
        eprintln!("  FAILED {} [{}] {}", path.display(), kind, message);
    }
    eprintln!(
        "Done! {} processed, {} skipped, {} failed ({:.2}s){}",
        summary.succeeded,
        summary.skipped,
        summary.failed,
        elapsed,
        if summary.cancelled { " - cancelled" } else { "" }
    );
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, &cli.log_file);
    let t_total = std::time::Instant::now();

    let store = ConfigStore::new(&cli.config);
    let base = if cli.load_config {
        info!("Loading saved style from {}", store.path().display());
        store.load()
    } else {
        StyleRecord::default()
    };
    let record = base.overlay(cli.style_flags());

    // Reject a bad style before touching any file
    let style = match record.to_style() {
        Ok(style) => style,
        Err(e) => {
            eprintln!("Invalid style: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    if cli.save_config {
        store.save(&record)?;
        eprintln!("Saved style to {}", store.path().display());
    }

    let Some(input) = cli.input.clone().or_else(|| cli.input_flag.clone()) else {
        if cli.save_config {
            return Ok(ExitCode::SUCCESS);
        }
        eprintln!("No input given. Pass an image file or a directory (see --help).");
        return Ok(ExitCode::from(2));
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nStopping after files in progress...");
        handler_token.cancel();
    }) {
        warn!("Cannot install Ctrl-C handler: {}", e);
    }

    let options = BatchOptions {
        input,
        output: cli.output.clone(),
        recursive: cli.recursive,
        jobs: cli.jobs,
        ..Default::default()
    };
    info!(
        "Stamping {} (size {}, color {:?}, {}, opacity {})",
        options.input.display(),
        style.font_size(),
        style.color().to_array(),
        style.position(),
        style.opacity()
    );

    let pb = if cli.verbose { ProgressBar::hidden() } else { ProgressBar::new(0) };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} {msg}")
            .unwrap(),
    );

    let control = ProcessControl::new().with_cancel_token(token);
    let summary = datemark_core::process_with_control(&options, &style, &control, &|record, done, total| {
        pb.set_length(total);
        pb.set_position(done);
        if let FileOutcome::Success(_) = record.outcome {
            if let Some(name) = record.input.file_name() {
                pb.set_message(name.to_string_lossy().into_owned());
            }
        }
    });
    pb.finish_and_clear();

    print_summary(&summary, t_total.elapsed().as_secs_f64());

    if summary.failed > 0 || summary.cancelled {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "datemark", "-i", "photos", "-s", "30", "-c", "255,0,0", "-p", "tl", "-o", "0.5", "-j", "4",
        ])
        .unwrap();
        assert_eq!(cli.input_flag, Some(PathBuf::from("photos")));
        assert_eq!(cli.jobs, 4);
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILENAME));

        let style = cli.style_flags().to_style().unwrap();
        assert_eq!(style.font_size(), 30);
        assert_eq!(style.position(), datemark_core::Position::TopLeft);
        assert_eq!(style.opacity(), 0.5);
    }

    #[test]
    fn test_oversized_font_is_rejected_up_front() {
        let cli = Cli::try_parse_from(["datemark", "photos", "-s", "100000"]).unwrap();
        assert_eq!(
            cli.style_flags().to_style(),
            Err(datemark_core::ValidationError::FontSize(100000))
        );
    }

    #[test]
    fn test_positional_and_flag_input_conflict() {
        assert!(Cli::try_parse_from(["datemark", "a", "-i", "b"]).is_err());
    }

    #[test]
    fn test_flags_override_saved_style() {
        let saved = StyleRecord {
            font_size: Some(40),
            color: Some("blue".into()),
            ..Default::default()
        };
        let cli = Cli::try_parse_from(["datemark", "x.jpg", "--color", "red"]).unwrap();
        let style = saved.overlay(cli.style_flags()).to_style().unwrap();
        assert_eq!(style.font_size(), 40);
        assert_eq!(style.color(), "red".parse::<datemark_core::Color>().unwrap());
    }
}
