//! Supported document containers

use std::fmt;
use std::path::Path;

/// The document containers billsort knows how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Portable Document Format
    Pdf,
    /// Open Fixed-layout Document (zip of XML parts)
    Ofd,
    /// Structured XML invoice
    Xml,
    /// Raster image (jpg, jpeg, png, bmp), read through a vision-capable backend
    Image,
}

/// Every extension accepted by [`FileKind::from_path`], lower-case, without the dot
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "ofd", "xml", "jpg", "jpeg", "png", "bmp"];

impl FileKind {
    /// Classify a path by its extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    /// Classify a bare extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "ofd" => Some(Self::Ofd),
            "xml" => Some(Self::Xml),
            "jpg" | "jpeg" | "png" | "bmp" => Some(Self::Image),
            _ => None,
        }
    }

    /// Images bypass text decoding
    pub fn is_image(self) -> bool {
        matches!(self, Self::Image)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "pdf",
            Self::Ofd => "ofd",
            Self::Xml => "xml",
            Self::Image => "image",
        };
        f.write_str(name)
    }
}
