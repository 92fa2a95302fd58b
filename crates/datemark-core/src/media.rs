use std::path::{Path, PathBuf};

use image::ImageFormat;

/// Suffix appended to output file stems and derived directory names.
pub const WATERMARK_SUFFIX: &str = "_watermark";

/// Image encodings the tool reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedFormat {
    Jpeg,
    Png,
    Tiff,
    Bmp,
}

impl SupportedFormat {
    /// Match a path's extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(SupportedFormat::Jpeg),
            "png" => Some(SupportedFormat::Png),
            "tif" | "tiff" => Some(SupportedFormat::Tiff),
            "bmp" => Some(SupportedFormat::Bmp),
            _ => None,
        }
    }

    /// Map a sniffed decoder format back into the supported set.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(SupportedFormat::Jpeg),
            ImageFormat::Png => Some(SupportedFormat::Png),
            ImageFormat::Tiff => Some(SupportedFormat::Tiff),
            ImageFormat::Bmp => Some(SupportedFormat::Bmp),
            _ => None,
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            SupportedFormat::Jpeg => ImageFormat::Jpeg,
            SupportedFormat::Png => ImageFormat::Png,
            SupportedFormat::Tiff => ImageFormat::Tiff,
            SupportedFormat::Bmp => ImageFormat::Bmp,
        }
    }
}

/// `<stem>_watermark.<ext>`, keeping the original extension as written.
pub fn output_file_name(input: &Path) -> Option<String> {
    let stem = input.file_stem()?.to_string_lossy();
    Some(match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, WATERMARK_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, WATERMARK_SUFFIX),
    })
}

/// Output directory for files living in `containing_dir`: a sibling named
/// `<dir>_watermark`, or a child of the same name when there is no parent.
pub fn derive_output_dir(containing_dir: &Path) -> PathBuf {
    let dir = containing_dir
        .canonicalize()
        .unwrap_or_else(|_| containing_dir.to_path_buf());
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let target = format!("{}{}", name, WATERMARK_SUFFIX);

    match dir.parent() {
        Some(parent) if dir.file_name().is_some() => parent.join(target),
        _ => dir.join(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_supported_extensions() {
        assert_eq!(SupportedFormat::from_path(Path::new("a.JPG")), Some(SupportedFormat::Jpeg));
        assert_eq!(SupportedFormat::from_path(Path::new("a.jpeg")), Some(SupportedFormat::Jpeg));
        assert_eq!(SupportedFormat::from_path(Path::new("a.Png")), Some(SupportedFormat::Png));
        assert_eq!(SupportedFormat::from_path(Path::new("a.tiff")), Some(SupportedFormat::Tiff));
        assert_eq!(SupportedFormat::from_path(Path::new("a.tif")), Some(SupportedFormat::Tiff));
        assert_eq!(SupportedFormat::from_path(Path::new("a.bmp")), Some(SupportedFormat::Bmp));
        assert_eq!(SupportedFormat::from_path(Path::new("c.txt")), None);
        assert_eq!(SupportedFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name(Path::new("/x/a.jpg")).as_deref(), Some("a_watermark.jpg"));
        assert_eq!(
            output_file_name(Path::new("IMG.0001.JPEG")).as_deref(),
            Some("IMG.0001_watermark.JPEG")
        );
    }

    #[test]
    fn test_derive_output_dir_is_sibling() {
        let root = tempdir().unwrap();
        let photos = root.path().join("Photos").join("2023");
        std::fs::create_dir_all(&photos).unwrap();

        let out = derive_output_dir(&photos);
        assert_eq!(
            out,
            root.path().canonicalize().unwrap().join("Photos").join("2023_watermark")
        );
    }
}
