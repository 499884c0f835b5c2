//! # Engine Primitives
//!
//! Fixed constants of the engine. Everything tunable per deployment lives
//! in [`crate::types::Settings`] instead.

/// Input format for date-valued answers.
pub const DATE_INPUT_FORMAT: &str = "%d.%m.%Y";

/// Canonical stored value of a checked boolean field.
pub const TRUE_VALUE: &str = "true";

/// Canonical stored value of an unchecked boolean field.
pub const FALSE_VALUE: &str = "false";

/// Menu keyboards with at most this many keys use one key per row;
/// larger keyboards pack two keys per row.
pub const MENU_SINGLE_COLUMN_MAX: usize = 3;

/// Mime type of PDF uploads.
pub const PDF_MIME: &str = "application/pdf";

/// Mime types accepted for ZIP uploads. Transports are sloppy about
/// archives, so the generic and legacy spellings are allowed too.
pub const ZIP_MIMES: &[&str] = &[
    "application/zip",
    "application/octet-stream",
    "application/x-zip-compressed",
    "multipart/x-zip",
];

/// Mime types accepted for image uploads sent as documents.
pub const IMAGE_MIMES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Marker inserted into blob names of images so a thumbnail is kept.
pub const THUMBNAIL_MARKER: &str = ".thumbnail";

/// Extension fallback for uploads with an unrecognized mime type.
pub const FALLBACK_EXTENSION: &str = "bin";

/// File extension for a recognized mime type.
#[must_use]
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        "application/zip" | "application/x-zip-compressed" | "multipart/x-zip" => "zip",
        _ => FALLBACK_EXTENSION,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_known_mimes() {
        assert_eq!(extension_for_mime("application/pdf"), "pdf");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("multipart/x-zip"), "zip");
    }

    #[test]
    fn test_extension_falls_back_to_bin() {
        assert_eq!(extension_for_mime("application/unknown"), "bin");
        assert_eq!(extension_for_mime(""), "bin");
    }
}
