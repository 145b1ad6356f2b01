// src/engine/source.rs
//
// Immutable source files. The bytes are shared between the workspace entry and any
// in-flight jobs, so they live behind an Arc and are never mutated.

use crate::error::{OptiImageError, Result};
use crate::format::SVG_MIME;
use std::path::Path;
use std::sync::Arc;

/// An uploaded file: name, declared MIME type and raw bytes.
#[derive(Clone, Debug)]
pub struct SourceFile {
    name: String,
    mime_type: String,
    bytes: Arc<Vec<u8>>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into().trim().to_ascii_lowercase(),
            bytes: Arc::new(bytes),
        }
    }

    /// Read a file from disk. The MIME type is inferred from the extension;
    /// unknown extensions get `application/octet-stream` and rely on content sniffing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| OptiImageError::file_read_failed(path.display().to_string(), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_from_extension)
            .unwrap_or("application/octet-stream");
        Ok(Self::new(name, mime, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the payload without copying it.
    pub fn shared_bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_vector(&self) -> bool {
        self.mime_type == SVG_MIME
    }

    /// File name without its last extension. Dotfiles such as `.env` keep their full name.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }

    /// Last extension of the file name, if any.
    pub fn extension(&self) -> Option<&str> {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < self.name.len() => Some(&self.name[idx + 1..]),
            _ => None,
        }
    }
}

/// MIME type for a file extension (case-insensitive).
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "jxl" => "image/jxl",
        "qoi" => "image/qoi",
        "ico" => "image/x-icon",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => SVG_MIME,
        _ => return None,
    };
    Some(mime)
}
