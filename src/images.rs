//! Upload validation for submitted images.
//!
//! Files are identified by their leading magic numbers against a fixed
//! allow-list; the declared MIME type is advisory only. Oversized or
//! unrecognizable files are rejected before they reach the queue.

use tracing::warn;

use crate::models::task::ImageAttachment;
use crate::{AppError, Result};

/// Hard cap on a single uploaded image.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Longest accepted (sanitized) filename.
const MAX_FILENAME_LEN: usize = 255;

/// Detected file type from the magic-number check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedType {
    pub mime: &'static str,
    pub extension: &'static str,
}

/// Identify an image by its leading bytes. Only allow-listed formats are
/// recognized: PNG, JPEG, GIF, WebP, BMP, SVG.
#[must_use]
pub fn detect_image_type(data: &[u8]) -> Option<DetectedType> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

    if data.starts_with(PNG) {
        return Some(DetectedType {
            mime: "image/png",
            extension: ".png",
        });
    }
    // JPEG: SOI marker followed by any APPn/DQT segment byte.
    if data.len() >= 3 && data[0] == 0xff && data[1] == 0xd8 && data[2] == 0xff {
        return Some(DetectedType {
            mime: "image/jpeg",
            extension: ".jpg",
        });
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(DetectedType {
            mime: "image/gif",
            extension: ".gif",
        });
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some(DetectedType {
            mime: "image/webp",
            extension: ".webp",
        });
    }
    if data.starts_with(b"BM") {
        return Some(DetectedType {
            mime: "image/bmp",
            extension: ".bmp",
        });
    }
    if looks_like_svg(data) {
        return Some(DetectedType {
            mime: "image/svg+xml",
            extension: ".svg",
        });
    }
    None
}

/// SVG is text: either an XML prologue or an `<svg` tag within the first
/// kilobyte, case-insensitively.
fn looks_like_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(1024)];
    let Ok(text) = std::str::from_utf8(head) else {
        return false;
    };
    let lower = text.to_ascii_lowercase();
    (lower.starts_with("<?xml") && lower.contains("<svg"))
        || lower.trim_start().starts_with("<svg")
}

/// Reduce a client-supplied filename to a safe display name: final path
/// component only, dangerous characters stripped.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .trim_start_matches('.');
    let cleaned: String = base
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0'))
        .collect();
    if cleaned.is_empty() {
        "image".to_owned()
    } else {
        cleaned
    }
}

/// Validate one uploaded file and produce the internal attachment record.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` for empty, oversized, overlong-named,
/// or unrecognized files.
pub fn validate_image(
    data: Vec<u8>,
    filename: &str,
    declared_mime: Option<&str>,
) -> Result<ImageAttachment> {
    if data.is_empty() {
        return Err(AppError::InvalidInput(format!("file '{filename}' is empty")));
    }
    if data.len() > MAX_IMAGE_BYTES {
        return Err(AppError::InvalidInput(format!(
            "file '{filename}' exceeds the {MAX_IMAGE_BYTES} byte limit ({} bytes)",
            data.len()
        )));
    }
    if filename.len() > MAX_FILENAME_LEN {
        return Err(AppError::InvalidInput("filename too long".into()));
    }

    let detected = detect_image_type(&data).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "file '{filename}' is not a recognized image format"
        ))
    })?;

    if let Some(declared) = declared_mime {
        if !declared.eq_ignore_ascii_case(detected.mime) {
            warn!(
                filename,
                declared, detected = detected.mime,
                "declared MIME type disagrees with file content"
            );
        }
    }

    Ok(ImageAttachment {
        filename: sanitize_filename(filename),
        mime: detected.mime.to_owned(),
        bytes: data,
    })
}
