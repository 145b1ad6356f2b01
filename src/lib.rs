// lib.rs
//
// optiimage: local image compression, resizing and format conversion
//
// - Every run is a pure function of (source bytes, settings)
// - Native decoders first, registered fallback decoders second
// - SVG sources rasterized directly at the requested size
// - Per-image state machine that only reprocesses when the output would change

pub mod codecs;
pub mod engine;
pub mod error;
pub mod format;
pub mod workspace;

pub use codecs::{CodecRegistry, Decoder, Encoder};
pub use engine::{EncodedImage, Pipeline, PipelineConfig, SourceFile};
pub use error::{ErrorCategory, OptiImageError, ProcessingFailed, Result};
pub use format::{CompressionSettings, Dimensions, ImageFormat, SettingsUpdate};
pub use workspace::{
    Download, EntryId, EntryStatus, ImageEntry, Workspace, WorkspaceDefaults,
};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// MIME types accepted as sources: everything the native path decodes plus the
/// formats with a fallback decoder in this build, and SVG.
pub fn supported_input_formats() -> Vec<&'static str> {
    let registry = CodecRegistry::standard();
    let mut mimes = vec!["image/jpeg", "image/png", "image/webp", "image/gif", "image/bmp"];
    for format in ImageFormat::ALL {
        if !registry.decoders(format).is_empty() && !mimes.contains(&format.mime_type()) {
            mimes.push(format.mime_type());
        }
    }
    mimes.push(format::SVG_MIME);
    mimes
}

/// Formats that can be selected as output in this build, ORIGINAL and ICO included.
pub fn supported_output_formats() -> Vec<ImageFormat> {
    let registry = CodecRegistry::standard();
    ImageFormat::ALL
        .into_iter()
        .filter(|f| match f {
            ImageFormat::Original => true,
            ImageFormat::Ico => registry.can_encode(ImageFormat::Png),
            other => registry.can_encode(*other),
        })
        .collect()
}
