// src/workspace/naming.rs
//
// Download names and human readable sizes.

use crate::engine::SourceFile;
use crate::format::ImageFormat;

const FALLBACK_EXTENSION: &str = "jpg";
const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// `<stem>-opt.<ext>` for a single download.
///
/// ORIGINAL keeps the source's own extension even when the written container
/// differs; a source without an extension gets `jpg`.
pub fn download_file_name(file: &SourceFile, format: ImageFormat) -> String {
    let ext = match format {
        ImageFormat::Original => file.extension(),
        other => other.extension(),
    };
    format!("{}-opt.{}", file.stem(), ext.unwrap_or(FALLBACK_EXTENSION))
}

/// `opt-<original name>` for bulk export.
pub fn bulk_file_name(original: &str) -> String {
    format!("opt-{original}")
}

/// Byte count in the largest 1024-based unit that keeps the value >= 1, with at most
/// `decimals` fractional digits and trailing zeros dropped: 1536 -> "1.5 KB".
pub fn format_bytes(bytes: u64, decimals: usize) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let mut text = format!("{value:.decimals$}");
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    format!("{text} {}", SIZE_UNITS[unit])
}
