// src/engine/loader.rs
//
// Raster source loader.
//
// Order of attempts:
// 1. vector sources (image/svg+xml) are parsed into a usvg tree
// 2. native decode (content sniffed, browser formats only)
// 3. registered fallback decoders for the declared MIME type, in registration order
//
// The native path yields a RasterHandle that the rasterizer draws at the target size.
// Fallback decoders yield a finished pixel buffer that bypasses the rasterizer and
// goes through the explicit resize stage instead.

use crate::codecs::CodecRegistry;
use crate::engine::decoder::{decode_native, header_dimensions};
use crate::engine::raster::{vector_dimensions, PixelBuffer, RasterHandle};
use crate::error::{OptiImageError, Result};
use crate::format::{Dimensions, ImageFormat, SVG_MIME};
use resvg::usvg;

/// What the loader produced.
#[derive(Debug)]
pub enum RasterSource {
    /// Native path result, still to be rasterized.
    Bitmap(RasterHandle),
    /// Fallback decoder result.
    Pixels(PixelBuffer),
}

impl RasterSource {
    pub fn dimensions(&self) -> Dimensions {
        match self {
            RasterSource::Bitmap(handle) => handle.dimensions(),
            RasterSource::Pixels(buffer) => buffer.dimensions().into(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RasterSource::Pixels(_))
    }
}

/// Load `bytes` declared as `mime`.
pub fn load(bytes: &[u8], mime: &str, registry: &CodecRegistry) -> Result<RasterSource> {
    if is_svg(mime) {
        return load_vector(bytes).map(RasterSource::Bitmap);
    }

    let native_err = match decode_native(bytes) {
        Ok(img) => {
            tracing::debug!(mime, "decoded on native path");
            return Ok(RasterSource::Bitmap(RasterHandle::Bitmap(img)));
        }
        Err(err) => err,
    };

    let fallbacks = ImageFormat::from_mime(mime)
        .map(|format| registry.decoders(format))
        .unwrap_or(&[]);
    if fallbacks.is_empty() {
        tracing::debug!(mime, error = %native_err, "native decode failed, no fallback decoder");
        return Err(surface(native_err));
    }
    tracing::warn!(mime, error = %native_err, "native decode failed, trying fallback decoders");

    let mut last_err = native_err;
    for decoder in fallbacks {
        match decoder.decode(bytes) {
            Ok(img) => {
                tracing::debug!(mime, decoder = decoder.name(), "decoded on fallback path");
                return Ok(RasterSource::Pixels(PixelBuffer::from_dynamic(img)));
            }
            Err(err) => {
                tracing::debug!(decoder = decoder.name(), error = %err, "fallback decoder failed");
                last_err = err;
            }
        }
    }
    Err(surface(last_err))
}

/// Parse an SVG document. Text is laid out without system fonts.
pub fn load_vector(bytes: &[u8]) -> Result<RasterHandle> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|e| OptiImageError::decode_failed(format!("svg: {e}")))?;
    let dims = vector_dimensions(&tree);
    if !dims.is_known() {
        return Err(OptiImageError::decode_failed("svg: empty viewport"));
    }
    Ok(RasterHandle::Vector(Box::new(tree)))
}

/// Best-effort natural size: SVG viewport, container header, then a full decode.
pub fn probe_dimensions(bytes: &[u8], mime: &str, registry: &CodecRegistry) -> Result<Dimensions> {
    if is_svg(mime) {
        return load_vector(bytes)
            .map(|handle| handle.dimensions())
            .map_err(|e| OptiImageError::dimension_probe_failed(e.to_string()));
    }
    if let Some((width, height)) = header_dimensions(bytes) {
        return Ok(Dimensions::new(width, height));
    }
    load(bytes, mime, registry)
        .map(|source| source.dimensions())
        .map_err(|e| OptiImageError::dimension_probe_failed(e.to_string()))
}

fn is_svg(mime: &str) -> bool {
    mime.trim().eq_ignore_ascii_case(SVG_MIME)
}

/// Limits and panics are reported as they are; anything else is a decode failure.
fn surface(err: OptiImageError) -> OptiImageError {
    match err {
        OptiImageError::DecodeFailed { .. }
        | OptiImageError::DimensionExceedsLimit { .. }
        | OptiImageError::PixelCountExceedsLimit { .. }
        | OptiImageError::InternalPanic { .. } => err,
        other => OptiImageError::decode_failed(other.to_string()),
    }
}
