//! Signature- and extension-based media type detection.
//!
//! Magic numbers are checked first; an extension-only fallback applies
//! except for the *strict* set (formats detectable by magic number) where
//! falling back would produce a wrong answer more often than
//! `application/octet-stream` would.

pub const FOLDER: &str = "application/directory";
pub const OCTET_STREAM: &str = "application/octet-stream";

pub const IMAGE_GIF: &str = "image/gif";
pub const IMAGE_HEIC: &str = "image/heic";
pub const IMAGE_JPEG: &str = "image/jpeg";
pub const IMAGE_PNG: &str = "image/png";
pub const IMAGE_WEBP: &str = "image/webp";
pub const IMAGE_BMP: &str = "image/bmp";
pub const IMAGE_TIFF: &str = "image/tiff";
pub const APPLICATION_PDF: &str = "application/pdf";
pub const APPLICATION_ZIP: &str = "application/zip";

/// Extension → media type, for names the magic-number table above can't
/// cover (text/code formats) plus a few additions the original service
/// layered onto Rust's/Python's default `mimetypes` table.
const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("sql", "application/sql"),
    ("zsh", "application/x-zsh"),
    ("heif", "image/heif"),
    ("hif", "image/heif"),
    ("jsx", "text/jsx"),
    ("md", "text/markdown"),
    ("cfg", "text/plain"),
    ("ini", "text/plain"),
    ("coffee", "text/x-coffeescript"),
    ("go", "text/x-go"),
    ("nim", "text/x-nim"),
    ("yaml", "text/x-yml"),
    ("yml", "text/x-yml"),
    ("pyi", "text/x-python"),
    ("pyx", "text/x-python"),
    ("py", "text/x-python"),
    ("swift", "text/x-swift"),
    ("plist", "text/x-plist"),
    ("rst", "text/x-rst"),
    ("rs", "text/x-rust"),
    ("toml", "text/x-toml"),
    ("vim", "text/x-vim"),
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("csv", "text/csv"),
    ("pdf", APPLICATION_PDF),
    ("zip", APPLICATION_ZIP),
    ("gif", IMAGE_GIF),
    ("jpg", IMAGE_JPEG),
    ("jpeg", IMAGE_JPEG),
    ("png", IMAGE_PNG),
    ("webp", IMAGE_WEBP),
    ("bmp", IMAGE_BMP),
    ("tif", IMAGE_TIFF),
    ("tiff", IMAGE_TIFF),
    ("heic", IMAGE_HEIC),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
];

/// Magic-number signatures. Any media type detectable here is in the
/// "strict" set: if the bytes don't match but the extension says
/// otherwise, we don't trust the extension.
const MAGIC_TABLE: &[(&[u8], usize, &str)] = &[
    (b"\xFF\xD8\xFF", 0, IMAGE_JPEG),
    (b"\x89PNG\r\n\x1a\n", 0, IMAGE_PNG),
    (b"GIF87a", 0, IMAGE_GIF),
    (b"GIF89a", 0, IMAGE_GIF),
    (b"BM", 0, IMAGE_BMP),
    (b"RIFF", 0, IMAGE_WEBP), // refined below (needs "WEBP" at offset 8)
    (b"II*\x00", 0, IMAGE_TIFF),
    (b"MM\x00*", 0, IMAGE_TIFF),
    (b"%PDF-", 0, APPLICATION_PDF),
    (b"PK\x03\x04", 0, APPLICATION_ZIP),
    (b"PK\x05\x06", 0, APPLICATION_ZIP),
    (b"ftyp", 4, "video/mp4"),
];

fn strict_mediatypes() -> &'static [&'static str] {
    &[
        IMAGE_JPEG,
        IMAGE_PNG,
        IMAGE_GIF,
        IMAGE_BMP,
        IMAGE_WEBP,
        IMAGE_TIFF,
        APPLICATION_PDF,
        APPLICATION_ZIP,
        "video/mp4",
    ]
}

/// Guess by magic-number signature in `head`, the first bytes of a file.
fn guess_by_magic(head: &[u8]) -> Option<&'static str> {
    if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        return Some(IMAGE_WEBP);
    }
    for &(sig, offset, mime) in MAGIC_TABLE {
        if mime == IMAGE_WEBP {
            continue; // handled above, needs the second check
        }
        if head.len() >= offset + sig.len() && &head[offset..offset + sig.len()] == sig {
            return Some(mime);
        }
    }
    None
}

/// Guess by filename extension alone. Never returns a strict-set type
/// unless the true signature (not just the name) would say so — callers
/// that only have a name and no content should prefer [`guess_unsafe`]
/// directly and know its limits.
pub fn guess_unsafe(name: &str) -> String {
    let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
    if ext.is_empty() || ext == name.to_lowercase() {
        return OCTET_STREAM.to_string();
    }
    EXTENSION_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| mime.to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Guess by content signature, falling back to extension unless the
/// extension-guessed type belongs to the strict (magic-detectable) set.
pub fn guess(head: &[u8], name: Option<&str>) -> String {
    if let Some(mime) = guess_by_magic(head) {
        return mime.to_string();
    }
    if let Some(name) = name {
        let mime = guess_unsafe(name);
        if !strict_mediatypes().contains(&mime.as_str()) {
            return mime;
        }
    }
    OCTET_STREAM.to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn magic_wins_over_wrong_extension() {
        let jpeg_head = b"\xFF\xD8\xFF\xE0\x00\x10JFIF";
        assert_eq!(guess(jpeg_head, Some("photo.txt")), IMAGE_JPEG);
    }

    #[test]
    fn extension_fallback_for_non_strict_types() {
        assert_eq!(guess(b"plain text here", Some("notes.md")), "text/markdown");
    }

    #[test]
    fn strict_extension_without_matching_magic_falls_back_to_octet_stream() {
        // Claims to be a PNG by name, but the bytes say otherwise.
        assert_eq!(guess(b"not a png", Some("fake.png")), OCTET_STREAM);
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(guess_unsafe("weird.xyzzy"), OCTET_STREAM);
    }

    #[test]
    fn webp_requires_riff_and_webp_tag() {
        let mut head = b"RIFF\x00\x00\x00\x00WEBPVP8 ".to_vec();
        head.truncate(16);
        assert_eq!(guess(&head, None), IMAGE_WEBP);
    }
}
