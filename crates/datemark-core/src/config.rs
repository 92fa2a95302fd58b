//! Persisted style record.
//!
//! The record is a flat JSON object whose fields are all optional so that a
//! saved file can be overlaid by command-line flags. Loading never fails: a
//! missing or corrupt file yields an empty record and the built-in defaults.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::style::{
    Color, Position, StyleConfig, ValidationError, DEFAULT_COLOR, DEFAULT_FONT_SIZE,
    DEFAULT_OPACITY,
};

/// Default config filename, relative to the working directory.
pub const CONFIG_FILENAME: &str = "watermark_config.json";

/// Raw style values as stored on disk or given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleRecord {
    pub font_size: Option<u32>,
    pub color: Option<String>,
    pub position: Option<String>,
    pub opacity: Option<f32>,
    pub font_path: Option<PathBuf>,
}

impl StyleRecord {
    /// Layer `top` over `self`; fields set in `top` win.
    pub fn overlay(self, top: StyleRecord) -> StyleRecord {
        StyleRecord {
            font_size: top.font_size.or(self.font_size),
            color: top.color.or(self.color),
            position: top.position.or(self.position),
            opacity: top.opacity.or(self.opacity),
            font_path: top.font_path.or(self.font_path),
        }
    }

    /// Validate into a [`StyleConfig`], filling unset fields with defaults.
    pub fn to_style(&self) -> Result<StyleConfig, ValidationError> {
        let color: Color = self.color.as_deref().unwrap_or(DEFAULT_COLOR).parse()?;
        let position = match self.position.as_deref() {
            Some(p) => p.parse()?,
            None => Position::default(),
        };
        StyleConfig::new(
            self.font_size.unwrap_or(DEFAULT_FONT_SIZE),
            color,
            position,
            self.opacity.unwrap_or(DEFAULT_OPACITY),
            self.font_path.clone(),
        )
    }
}

/// Loads and saves a [`StyleRecord`] at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(CONFIG_FILENAME)
    }
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved record. Missing or unreadable files give an empty record.
    pub fn load(&self) -> StyleRecord {
        if !self.path.exists() {
            debug!("No saved config at {}", self.path.display());
            return StyleRecord::default();
        }

        let parsed = File::open(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|f| Ok(serde_json::from_reader::<_, StyleRecord>(BufReader::new(f))?));

        match parsed {
            Ok(record) => {
                debug!("Loaded config from {}", self.path.display());
                record
            }
            Err(e) => {
                warn!(
                    "Ignoring unreadable config {}: {}; using defaults",
                    self.path.display(),
                    e
                );
                StyleRecord::default()
            }
        }
    }

    /// Save the record as pretty JSON.
    pub fn save(&self, record: &StyleRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        if let Err(e) = write_record(&temp_path, record) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn write_record(path: &Path, record: &StyleRecord) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("cfg.json"));

        let record = StyleRecord {
            font_size: Some(36),
            color: Some("255,0,0".to_string()),
            position: Some("center".to_string()),
            opacity: Some(0.5),
            font_path: None,
        };
        store.save(&record).unwrap();

        assert_eq!(store.load(), record);
    }

    #[test]
    fn test_failed_save_keeps_previous_record() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("cfg.json"));
        let first = StyleRecord {
            font_size: Some(18),
            ..Default::default()
        };
        store.save(&first).unwrap();
        assert!(!dir.path().join("cfg.json.tmp").exists());

        // A directory in the temp file's place makes the write fail
        fs::create_dir(dir.path().join("cfg.json.tmp")).unwrap();
        let second = StyleRecord {
            font_size: Some(99),
            ..Default::default()
        };
        assert!(store.save(&second).is_err());
        assert_eq!(store.load(), first);
    }

    #[test]
    fn test_missing_and_corrupt_files_fall_back() {
        let dir = tempdir().unwrap();
        let missing = ConfigStore::new(dir.path().join("nope.json"));
        assert_eq!(missing.load(), StyleRecord::default());

        let corrupt_path = dir.path().join("corrupt.json");
        File::create(&corrupt_path).unwrap().write_all(b"{ not json").unwrap();
        let corrupt = ConfigStore::new(&corrupt_path);
        assert_eq!(corrupt.load(), StyleRecord::default());

        let style = corrupt.load().to_style().unwrap();
        assert_eq!(style, StyleConfig::default());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        File::create(&path)
            .unwrap()
            .write_all(br#"{"font_size": 30, "theme": "dark", "font_path": null}"#)
            .unwrap();

        let record = ConfigStore::new(&path).load();
        assert_eq!(record.font_size, Some(30));
        assert_eq!(record.font_path, None);
    }

    #[test]
    fn test_overlay_prefers_top() {
        let saved = StyleRecord {
            font_size: Some(20),
            color: Some("blue".to_string()),
            ..Default::default()
        };
        let flags = StyleRecord {
            color: Some("red".to_string()),
            ..Default::default()
        };

        let merged = saved.overlay(flags);
        assert_eq!(merged.font_size, Some(20));
        assert_eq!(merged.color.as_deref(), Some("red"));

        let style = merged.to_style().unwrap();
        assert_eq!(style.color(), Color::new(255, 0, 0));
        assert_eq!(style.position(), Position::BottomRight);
    }

    #[test]
    fn test_invalid_record_is_validation_error() {
        let record = StyleRecord {
            position: Some("somewhere".to_string()),
            ..Default::default()
        };
        assert!(matches!(record.to_style(), Err(ValidationError::Position(_))));
    }
}
