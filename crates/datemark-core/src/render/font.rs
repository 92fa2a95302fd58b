//! Font loading and text rasterization.
//!
//! Fonts are tried in a fixed order: the configured font file, then the usual
//! system fonts for the platform, then a builtin bitmap face that covers the
//! characters a date can contain. Every attempt is tagged with its
//! [`FontSource`] so callers can see which one won.

use std::fmt;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use super::RenderError;

#[cfg(target_os = "windows")]
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "C:/Windows/Fonts/arial.ttf",
    "C:/Windows/Fonts/calibri.ttf",
    "C:/Windows/Fonts/tahoma.ttf",
];

#[cfg(target_os = "macos")]
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/System/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/arial.ttf",
];

/// Which font a [`TextFont`] was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    Custom(PathBuf),
    System(PathBuf),
    Builtin,
}

impl fmt::Display for FontSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontSource::Custom(p) => write!(f, "custom font {}", p.display()),
            FontSource::System(p) => write!(f, "system font {}", p.display()),
            FontSource::Builtin => f.write_str("builtin bitmap font"),
        }
    }
}

enum Face {
    Outline(FontVec),
    Bitmap,
}

/// A loaded font that can rasterize text into a coverage mask.
pub struct TextFont {
    face: Face,
    source: FontSource,
}

impl fmt::Debug for TextFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextFont").field("source", &self.source).finish()
    }
}

fn load_outline(path: &Path) -> Result<FontVec, String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    FontVec::try_from_vec_and_index(data, 0).map_err(|e| e.to_string())
}

impl TextFont {
    /// Walk the fallback chain. Always succeeds thanks to the builtin face.
    pub fn load(custom: Option<&Path>) -> Self {
        if let Some(path) = custom {
            match load_outline(path) {
                Ok(font) => {
                    debug!("Using font {}", path.display());
                    return Self {
                        face: Face::Outline(font),
                        source: FontSource::Custom(path.to_path_buf()),
                    };
                }
                Err(e) => warn!("Cannot load font {}: {}; falling back", path.display(), e),
            }
        }

        for candidate in SYSTEM_FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.exists() {
                continue;
            }
            match load_outline(path) {
                Ok(font) => {
                    debug!("Using system font {}", path.display());
                    return Self {
                        face: Face::Outline(font),
                        source: FontSource::System(path.to_path_buf()),
                    };
                }
                Err(e) => debug!("Skipping system font {}: {}", path.display(), e),
            }
        }

        info!("No usable font file found, using the builtin bitmap font");
        Self::builtin()
    }

    pub fn builtin() -> Self {
        Self {
            face: Face::Bitmap,
            source: FontSource::Builtin,
        }
    }

    pub fn source(&self) -> &FontSource {
        &self.source
    }

    /// Rasterize `text` at `font_size` pixels into a coverage mask cropped to
    /// the drawn pixels (0 = untouched, 255 = fully covered).
    pub fn rasterize(&self, text: &str, font_size: u32) -> Result<GrayImage, RenderError> {
        if text.trim().is_empty() {
            return Err(RenderError::EmptyText);
        }

        let canvas = match &self.face {
            Face::Outline(font) => rasterize_outline(font, text, font_size)?,
            Face::Bitmap => rasterize_bitmap(text, font_size)?,
        };

        trim(&canvas).ok_or_else(|| RenderError::NothingDrawn(text.to_string()))
    }
}

fn rasterize_outline(font: &FontVec, text: &str, font_size: u32) -> Result<GrayImage, RenderError> {
    let scale = PxScale::from(font_size as f32);
    let (width, height) = text_size(scale, font, text);

    // Side bearings can reach past the advance box
    let pad = font_size / 2 + 2;
    let mut canvas = mask_canvas(
        pad.checked_mul(2).and_then(|p| width.checked_add(p)),
        pad.checked_mul(2).and_then(|p| height.checked_add(p)),
        font_size,
    )?;
    draw_text_mut(&mut canvas, Luma([255]), pad as i32, pad as i32, scale, font, text);
    Ok(canvas)
}

/// Largest coverage mask we allocate, in pixels.
const MAX_MASK_PIXELS: u64 = 256 * 1024 * 1024;

/// Allocate a blank mask; `None` dimensions mean the size computation overflowed.
fn mask_canvas(width: Option<u32>, height: Option<u32>, font_size: u32) -> Result<GrayImage, RenderError> {
    match (width, height) {
        (Some(w), Some(h)) if (w as u64) * (h as u64) <= MAX_MASK_PIXELS => {
            Ok(GrayImage::new(w.max(1), h.max(1)))
        }
        _ => Err(RenderError::TextTooLarge(font_size)),
    }
}

const GLYPH_COLS: u32 = 5;
const GLYPH_ROWS: u32 = 7;

/// 5x7 bitmap rows, most significant of the low five bits is the leftmost column.
fn bitmap_glyph(c: char) -> Option<[u8; GLYPH_ROWS as usize]> {
    Some(match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '/' => [0b00001, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b10000],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        ' ' => [0; GLYPH_ROWS as usize],
        _ => return None,
    })
}

fn rasterize_bitmap(text: &str, font_size: u32) -> Result<GrayImage, RenderError> {
    let glyphs = text
        .chars()
        .map(|c| bitmap_glyph(c).ok_or(RenderError::MissingGlyph(c)))
        .collect::<Result<Vec<_>, _>>()?;

    // Glyph height is 7 cells; size cells so the text is close to font_size tall
    let cell = (font_size.saturating_add(4) / 8).max(1);
    let advance = (GLYPH_COLS + 1).saturating_mul(cell);
    let width = u32::try_from(glyphs.len())
        .ok()
        .and_then(|n| advance.checked_mul(n));
    let mut canvas = mask_canvas(width, GLYPH_ROWS.checked_mul(cell), font_size)?;

    for (i, rows) in glyphs.iter().enumerate() {
        let x0 = i as u32 * advance;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if bits & (1 << (GLYPH_COLS - 1 - col)) == 0 {
                    continue;
                }
                let rect = Rect::at((x0 + col * cell) as i32, (row as u32 * cell) as i32)
                    .of_size(cell, cell);
                draw_filled_rect_mut(&mut canvas, rect, Luma([255]));
            }
        }
    }

    Ok(canvas)
}

/// Crop a mask to the bounding box of its non-zero pixels.
fn trim(mask: &GrayImage) -> Option<GrayImage> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, px) in mask.enumerate_pixels() {
        if px[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    let (x0, y0, x1, y1) = bounds?;
    Some(image::imageops::crop_imm(mask, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image())
}
