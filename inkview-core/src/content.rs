// ABOUTME: Content-kind hints for resolved image bytes
// ABOUTME: Sniffs magic bytes first, then falls back to MIME type or file extension

use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Svg,
    Unknown,
}

impl ContentKind {
    pub fn sniff(data: &[u8]) -> Self {
        // PNG signature: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return ContentKind::Png;
        }

        // JPEG signature: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return ContentKind::Jpeg;
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return ContentKind::Gif;
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return ContentKind::Webp;
        }

        if data.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
            return ContentKind::Tiff;
        }

        if data.starts_with(b"BM") {
            return ContentKind::Bmp;
        }

        let head = String::from_utf8_lossy(&data[..data.len().min(256)]).to_lowercase();
        if head.contains("<svg") {
            return ContentKind::Svg;
        }

        ContentKind::Unknown
    }

    pub fn from_mime(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "image/png" => ContentKind::Png,
            "image/jpeg" | "image/jpg" => ContentKind::Jpeg,
            "image/gif" => ContentKind::Gif,
            "image/webp" => ContentKind::Webp,
            "image/bmp" => ContentKind::Bmp,
            "image/tiff" => ContentKind::Tiff,
            "image/svg+xml" => ContentKind::Svg,
            _ => ContentKind::Unknown,
        }
    }

    pub fn from_extension(path: &str) -> Self {
        // Strip query and fragment so URLs work too
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("png") => ContentKind::Png,
            Some("jpg") | Some("jpeg") => ContentKind::Jpeg,
            Some("gif") => ContentKind::Gif,
            Some("webp") => ContentKind::Webp,
            Some("bmp") => ContentKind::Bmp,
            Some("tif") | Some("tiff") => ContentKind::Tiff,
            Some("svg") => ContentKind::Svg,
            _ => ContentKind::Unknown,
        }
    }

    /// First non-unknown hint wins: bytes, then MIME type, then the name
    pub fn detect(data: &[u8], content_type: Option<&str>, name: &str) -> Self {
        let sniffed = Self::sniff(data);
        if sniffed != ContentKind::Unknown {
            return sniffed;
        }
        if let Some(kind) = content_type.map(Self::from_mime) {
            if kind != ContentKind::Unknown {
                return kind;
            }
        }
        Self::from_extension(name)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::Png => "png",
            ContentKind::Jpeg => "jpeg",
            ContentKind::Gif => "gif",
            ContentKind::Webp => "webp",
            ContentKind::Bmp => "bmp",
            ContentKind::Tiff => "tiff",
            ContentKind::Svg => "svg",
            ContentKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
