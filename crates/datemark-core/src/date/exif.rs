use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use exif::{In, Reader, Tag, Value};

use super::MetadataError;

/// Capture-time tags in order of authority.
const DATE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// Read the capture date from a file's embedded EXIF block.
/// EXIF datetimes have no timezone info - the calendar date is taken as-is.
pub fn read_exif_date(path: &Path) -> Result<NaiveDate, MetadataError> {
    let file = File::open(path)?;
    let exif = Reader::new().read_from_container(&mut BufReader::new(file))?;

    let mut last_bad = None;
    for tag in DATE_TAGS {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        let Value::Ascii(ref parts) = field.value else {
            continue;
        };
        let Some(raw) = parts.first() else {
            continue;
        };
        let text = String::from_utf8_lossy(raw);
        match parse_exif_date(&text) {
            Some(date) => return Ok(date),
            None => last_bad = Some(text.into_owned()),
        }
    }

    Err(match last_bad {
        Some(text) => MetadataError::Unparsable(text),
        None => MetadataError::Missing,
    })
}

/// Parse the date part of an EXIF datetime ("2023:06:01 14:30:15").
/// Tolerates '-', '/' and '.' separators and date-only values.
pub(crate) fn parse_exif_date(s: &str) -> Option<NaiveDate> {
    let date_part = s.trim().trim_end_matches('\0').split([' ', 'T']).next()?;
    let cleaned = date_part.replace(['-', '/', '.'], ":");

    NaiveDate::parse_from_str(&cleaned, "%Y:%m:%d").ok()
}
