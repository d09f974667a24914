//! Image payload encoding shared by the vision-capable providers

use crate::LlmError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

/// MIME type for an image path, defaulting to JPEG for unknown extensions
pub(crate) fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Read an image file and return it base64-encoded
pub(crate) fn encode_base64(path: &Path) -> Result<String, LlmError> {
    let bytes = std::fs::read(path)
        .map_err(|e| LlmError::Image(format!("{}: {}", path.display(), e)))?;
    Ok(STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_type(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_type(Path::new("a.bmp")), "image/bmp");
        assert_eq!(mime_type(Path::new("a")), "image/jpeg");
    }

    #[test]
    fn test_encode_base64() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        assert_eq!(encode_base64(file.path()).unwrap(), "aGVsbG8=");
    }

    #[test]
    fn test_encode_missing_file() {
        let err = encode_base64(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, LlmError::Image(_)));
    }
}
