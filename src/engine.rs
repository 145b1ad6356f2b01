// src/engine.rs
//
// The image pipeline. A run takes one immutable source file and one settings snapshot
// and produces encoded bytes, with no state shared between runs:
// 1. load (native decode, vector parse, or registered fallback decoders)
// 2. rasterize at the output size, or resize fallback pixels
// 3. encode to the effective format, wrapping ICO when requested
//
// This file is a facade over the stage modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub(crate) mod common;
pub mod decoder;
pub mod encoder;
pub mod ico;
pub mod loader;
pub mod pipeline;
pub mod pool;
pub mod raster;
pub mod resize;
pub mod source;

pub use common::run_with_panic_policy;
pub use decoder::{check_dimensions, decode_native, detect_format};
pub use encoder::{
    encode_avif, encode_jpeg, encode_png, encode_qoi, encode_webp, QualitySettings,
};
#[cfg(feature = "jxl")]
pub use encoder::encode_jxl;
pub use ico::{package_ico, ICO_HEADER_LEN};
pub use loader::{load, probe_dimensions, RasterSource};
pub use pipeline::{
    encode_target, resolve_effective_format, target_dimensions, EncodedImage, Pipeline,
    PipelineConfig,
};
pub use pool::get_pool;
pub use raster::{rasterize, PixelBuffer, RasterHandle};
pub use resize::resize;
pub use source::{mime_from_extension, SourceFile};
