//! Watermark style: font size, color, position and opacity.
//!
//! A [`StyleConfig`] is built once per run and shared read-only by every
//! per-file operation. All parsing happens here so that bad values surface as
//! a [`ValidationError`] before any file is touched.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_FONT_SIZE: u32 = 24;
pub const MAX_FONT_SIZE: u32 = 4096;
pub const DEFAULT_COLOR: &str = "white";
pub const DEFAULT_OPACITY: f32 = 0.8;

/// Invalid style value. Raised before any file is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("font size must be between 1 and {max}, got {0}", max = MAX_FONT_SIZE)]
    FontSize(u32),

    #[error("opacity must be within 0.0..=1.0, got {0}")]
    Opacity(f32),

    #[error("unknown color '{0}' (use a color name, \"R,G,B\" or #RRGGBB)")]
    Color(String),

    #[error("unknown position '{0}' (expected top-left, top-right, bottom-left, bottom-right or center)")]
    Position(String),
}

/// An RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Named colors accepted on the command line and in config files.
const COLOR_TABLE: &[(&str, Color)] = &[
    ("red", Color::new(255, 0, 0)),
    ("green", Color::new(0, 255, 0)),
    ("blue", Color::new(0, 0, 255)),
    ("white", Color::new(255, 255, 255)),
    ("black", Color::new(0, 0, 0)),
    ("yellow", Color::new(255, 255, 0)),
    ("cyan", Color::new(0, 255, 255)),
    ("magenta", Color::new(255, 0, 255)),
    ("orange", Color::new(255, 165, 0)),
    ("purple", Color::new(128, 0, 128)),
    ("pink", Color::new(255, 192, 203)),
    ("gray", Color::new(128, 128, 128)),
    ("grey", Color::new(128, 128, 128)),
    ("brown", Color::new(165, 42, 42)),
];

static RGB_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*$").unwrap());

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255)
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl FromStr for Color {
    type Err = ValidationError;

    /// Accepts a color name, an `R,G,B` literal or `#RGB` / `#RRGGBB`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        if let Some((_, color)) = COLOR_TABLE.iter().find(|(name, _)| *name == key) {
            return Ok(*color);
        }

        if let Some(caps) = RGB_LITERAL_RE.captures(&key) {
            let mut channels = [0u8; 3];
            for (i, channel) in channels.iter_mut().enumerate() {
                *channel = caps[i + 1]
                    .parse::<u8>()
                    .map_err(|_| ValidationError::Color(s.to_string()))?;
            }
            return Ok(Color::new(channels[0], channels[1], channels[2]));
        }

        if let Some(hex) = key.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| ValidationError::Color(s.to_string()));
        }

        Err(ValidationError::Color(s.to_string()))
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|d| d * 17);
            Some(Color::new(digit(0)?, digit(1)?, digit(2)?))
        }
        6 => {
            let pair = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
            Some(Color::new(pair(0)?, pair(2)?, pair(4)?))
        }
        _ => None,
    }
}

/// Where the text is anchored on the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl Position {
    pub const ALL: [Position; 5] = [
        Position::TopLeft,
        Position::TopRight,
        Position::BottomLeft,
        Position::BottomRight,
        Position::Center,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Position::TopLeft => "top-left",
            Position::TopRight => "top-right",
            Position::BottomLeft => "bottom-left",
            Position::BottomRight => "bottom-right",
            Position::Center => "center",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        let position = match key.as_str() {
            "top-left" | "tl" | "左上" => Position::TopLeft,
            "top-right" | "tr" | "右上" => Position::TopRight,
            "bottom-left" | "bl" | "左下" => Position::BottomLeft,
            "bottom-right" | "br" | "右下" => Position::BottomRight,
            "center" | "c" | "居中" | "中心" => Position::Center,
            _ => return Err(ValidationError::Position(s.to_string())),
        };
        Ok(position)
    }
}

/// Immutable watermark style for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleConfig {
    font_size: u32,
    color: Color,
    position: Position,
    opacity: f32,
    font_path: Option<PathBuf>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            color: Color::white(),
            position: Position::default(),
            opacity: DEFAULT_OPACITY,
            font_path: None,
        }
    }
}

impl StyleConfig {
    pub fn new(
        font_size: u32,
        color: Color,
        position: Position,
        opacity: f32,
        font_path: Option<PathBuf>,
    ) -> Result<Self, ValidationError> {
        if font_size == 0 || font_size > MAX_FONT_SIZE {
            return Err(ValidationError::FontSize(font_size));
        }
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ValidationError::Opacity(opacity));
        }
        Ok(Self {
            font_size,
            color,
            position,
            opacity,
            font_path,
        })
    }

    /// Build a style from raw textual values, as they come from flags or a config file.
    pub fn parse(
        font_size: u32,
        color: &str,
        position: &str,
        opacity: f32,
        font_path: Option<PathBuf>,
    ) -> Result<Self, ValidationError> {
        Self::new(font_size, color.parse()?, position.parse()?, opacity, font_path)
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn font_path(&self) -> Option<&std::path::Path> {
        self.font_path.as_deref()
    }
}
