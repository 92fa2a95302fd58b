pub mod exif;

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fixed, locale-independent watermark date format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Where a [`CaptureDate`] came from, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Exif,
    FileMtime,
    Now,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provenance::Exif => "exif",
            Provenance::FileMtime => "file-mtime",
            Provenance::Now => "now",
        })
    }
}

/// Resolved date + provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureDate {
    pub date: NaiveDate,
    pub provenance: Provenance,
}

impl CaptureDate {
    /// The date as watermark text, e.g. `2023-06-01`.
    pub fn text(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

/// Why embedded metadata could not supply a date. Always recovered.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("no readable EXIF block: {0}")]
    Exif(#[from] ::exif::Error),

    #[error("no capture date tag present")]
    Missing,

    #[error("unparsable capture date '{0}'")]
    Unparsable(String),
}

/// Resolves capture dates with the fallback chain exif -> file mtime -> today.
#[derive(Clone, Copy)]
pub struct DateResolver {
    today: fn() -> NaiveDate,
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DateResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DateResolver").finish_non_exhaustive()
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl DateResolver {
    pub fn new() -> Self {
        Self { today: local_today }
    }

    /// Use a custom clock for the final fallback.
    pub fn with_clock(today: fn() -> NaiveDate) -> Self {
        Self { today }
    }

    /// Resolve a date for `path`. Never fails.
    pub fn resolve(&self, path: &Path) -> CaptureDate {
        match exif::read_exif_date(path) {
            Ok(date) => {
                debug!("{}: capture date {} from EXIF", path.display(), date);
                return CaptureDate {
                    date,
                    provenance: Provenance::Exif,
                };
            }
            Err(e) => debug!("{}: no EXIF date ({})", path.display(), e),
        }

        match modified_date(path) {
            Ok(date) => {
                info!("{}: no EXIF date, using modification date {}", path.display(), date);
                CaptureDate {
                    date,
                    provenance: Provenance::FileMtime,
                }
            }
            Err(e) => {
                let date = (self.today)();
                warn!(
                    "{}: modification time unavailable ({}), using today {}",
                    path.display(),
                    e,
                    date
                );
                CaptureDate {
                    date,
                    provenance: Provenance::Now,
                }
            }
        }
    }
}

/// Last-modified timestamp as a local calendar date.
fn modified_date(path: &Path) -> std::io::Result<NaiveDate> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).date_naive())
}

/// Resolve with the default clock.
pub fn resolve(path: &Path) -> CaptureDate {
    DateResolver::new().resolve(path)
}
