// src/engine/pipeline.rs
//
// Pipeline coordinator: one source file + one settings snapshot in, encoded bytes out.
//
//   resolve effective format
//   -> load (native bitmap / vector tree, or fallback pixels)
//   -> rasterize at output size (native) | resize stage (fallback, when enabled)
//   -> encode
//   -> wrap in ICO when requested
//
// Any failure collapses into ProcessingFailed. The stage error stays attached as its
// source and is logged here, so callers only ever see one opaque failure.

use crate::codecs::CodecRegistry;
use crate::engine::decoder::check_dimensions;
use crate::engine::ico::package_ico;
use crate::engine::loader::{self, RasterSource};
use crate::engine::raster::rasterize;
use crate::engine::resize::resize;
use crate::engine::source::SourceFile;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{OptiImageError, ProcessingFailed, Result};
use crate::format::{CompressionSettings, Dimensions, ImageFormat, SVG_MIME};
use tracing::{debug, error, instrument};

/// Output size limits applied before any pixels are allocated.
///
/// These can only tighten the global decompression-bomb limits, never relax them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_dimension: u32,
    pub max_pixels: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
            max_pixels: MAX_PIXELS,
        }
    }
}

impl PipelineConfig {
    pub fn check(&self, dims: Dimensions) -> Result<()> {
        check_dimensions(dims.width, dims.height)?;
        if dims.width > self.max_dimension || dims.height > self.max_dimension {
            return Err(OptiImageError::dimension_exceeds_limit(
                dims.width.max(dims.height),
                self.max_dimension,
            ));
        }
        let pixels = dims.width as u64 * dims.height as u64;
        if pixels > self.max_pixels {
            return Err(OptiImageError::pixel_count_exceeds_limit(
                pixels,
                self.max_pixels,
            ));
        }
        Ok(())
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    /// Container format of `bytes` (ICO when wrapped, never ORIGINAL).
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Resolve what a run will actually produce.
///
/// ORIGINAL keeps the source format when it is one of the encodable raster formats.
/// SVG becomes PNG and anything else becomes JPEG. Explicit formats pass through.
pub fn resolve_effective_format(requested: ImageFormat, source_mime: &str) -> ImageFormat {
    if requested != ImageFormat::Original {
        return requested;
    }
    if source_mime.eq_ignore_ascii_case(SVG_MIME) {
        return ImageFormat::Png;
    }
    match ImageFormat::from_mime(source_mime) {
        Some(format) if format.is_encodable() => format,
        _ => ImageFormat::Jpeg,
    }
}

/// Encoder used for an effective format. ICO payloads are PNG.
pub fn encode_target(effective: ImageFormat) -> ImageFormat {
    match effective {
        ImageFormat::Ico => ImageFormat::Png,
        other => other,
    }
}

/// Final pixel size: the resize target when enabled (at least 1x1), else the natural size.
pub fn target_dimensions(settings: &CompressionSettings, natural: Dimensions) -> Dimensions {
    if settings.resize_enabled {
        Dimensions::new(settings.resize_width.max(1), settings.resize_height.max(1))
    } else {
        natural
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: CodecRegistry,
    config: PipelineConfig,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Pipeline with every codec this build supports.
    pub fn new() -> Self {
        Self::with_registry(CodecRegistry::standard())
    }

    pub fn with_registry(registry: CodecRegistry) -> Self {
        Self {
            registry,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Natural size of a source, without producing output.
    pub fn probe_dimensions(&self, file: &SourceFile) -> Result<Dimensions> {
        loader::probe_dimensions(file.bytes(), file.mime_type(), &self.registry)
    }

    /// Run the pipeline. Failures are reported as the single opaque `ProcessingFailed`.
    pub fn process(
        &self,
        file: &SourceFile,
        settings: &CompressionSettings,
    ) -> std::result::Result<EncodedImage, ProcessingFailed> {
        self.process_detailed(file, settings).map_err(|err| {
            error!(
                file = file.name(),
                mime = file.mime_type(),
                category = err.category().as_str(),
                error = %err,
                "processing failed"
            );
            ProcessingFailed::new(err)
        })
    }

    /// Run the pipeline and return the stage error on failure.
    #[instrument(level = "debug", skip_all, fields(file = file.name(), format = %settings.format))]
    pub fn process_detailed(
        &self,
        file: &SourceFile,
        settings: &CompressionSettings,
    ) -> Result<EncodedImage> {
        let effective = resolve_effective_format(settings.format, file.mime_type());
        let target = encode_target(effective);
        debug!(target: "optiimage::pipeline", %effective, encoder = %target, "resolved output format");

        let source = loader::load(file.bytes(), file.mime_type(), &self.registry)?;
        let natural = source.dimensions();
        let out = target_dimensions(settings, natural);
        self.config.check(out)?;

        let pixels = match source {
            RasterSource::Bitmap(handle) => {
                debug!(target: "optiimage::pipeline", %natural, %out, "rasterizing");
                rasterize(handle, out.width, out.height)?
            }
            RasterSource::Pixels(buffer) if settings.resize_enabled => {
                debug!(target: "optiimage::pipeline", %natural, %out, "resizing fallback pixels");
                resize(buffer, out.width, out.height)?
            }
            RasterSource::Pixels(buffer) => buffer,
        };

        let (width, height) = pixels.dimensions();
        let encoded = self.registry.encode(&pixels, target, settings)?;
        drop(pixels);

        let bytes = if effective == ImageFormat::Ico {
            package_ico(&encoded, width, height)
        } else {
            encoded
        };

        debug!(
            target: "optiimage::pipeline",
            %effective,
            width,
            height,
            size = bytes.len(),
            "encoded"
        );
        Ok(EncodedImage {
            bytes,
            format: effective,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::Encoder;
    use crate::engine::raster::PixelBuffer;
    use crate::error::PROCESSING_FAILED_MESSAGE;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Arc;

    fn png_file(width: u32, height: u32) -> SourceFile {
        let img = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 60, 255]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        SourceFile::new("in.png", "image/png", buf)
    }

    fn settings(format: ImageFormat) -> CompressionSettings {
        CompressionSettings {
            format,
            ..CompressionSettings::default()
        }
    }

    #[test]
    fn original_resolution_rules() {
        assert_eq!(
            resolve_effective_format(ImageFormat::Original, SVG_MIME),
            ImageFormat::Png
        );
        for format in ImageFormat::ENCODABLE {
            assert_eq!(
                resolve_effective_format(ImageFormat::Original, format.mime_type()),
                format
            );
        }
        assert_eq!(
            resolve_effective_format(ImageFormat::Original, "image/gif"),
            ImageFormat::Jpeg
        );
        assert_eq!(
            resolve_effective_format(ImageFormat::Original, "image/x-icon"),
            ImageFormat::Jpeg
        );
        assert_eq!(
            resolve_effective_format(ImageFormat::WebP, SVG_MIME),
            ImageFormat::WebP
        );
    }

    #[test]
    fn ico_encodes_as_png() {
        assert_eq!(encode_target(ImageFormat::Ico), ImageFormat::Png);
        assert_eq!(encode_target(ImageFormat::Avif), ImageFormat::Avif);
    }

    #[test]
    fn target_dimensions_clamp_to_one() {
        let mut s = settings(ImageFormat::Png);
        let natural = Dimensions::new(10, 20);
        assert_eq!(target_dimensions(&s, natural), natural);
        s.resize_enabled = true;
        s.resize_width = 0;
        s.resize_height = 5;
        assert_eq!(target_dimensions(&s, natural), Dimensions::new(1, 5));
    }

    #[test]
    fn config_can_only_tighten_limits() {
        let config = PipelineConfig {
            max_dimension: 100,
            max_pixels: 1_000,
        };
        assert!(config.check(Dimensions::new(30, 30)).is_ok());
        assert!(matches!(
            config.check(Dimensions::new(101, 1)),
            Err(OptiImageError::DimensionExceedsLimit { .. })
        ));
        assert!(matches!(
            config.check(Dimensions::new(50, 50)),
            Err(OptiImageError::PixelCountExceedsLimit { .. })
        ));
        let loose = PipelineConfig {
            max_dimension: u32::MAX,
            max_pixels: u64::MAX,
        };
        assert!(loose.check(Dimensions::new(MAX_DIMENSION + 1, 1)).is_err());
    }

    #[test]
    fn png_to_png_keeps_dimensions() {
        let out = Pipeline::new()
            .process(&png_file(12, 7), &settings(ImageFormat::Original))
            .unwrap();
        assert_eq!(out.format, ImageFormat::Png);
        assert_eq!(out.dimensions(), Dimensions::new(12, 7));
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 7));
    }

    #[test]
    fn resize_applies_to_native_path() {
        let mut s = settings(ImageFormat::Jpeg);
        s.resize_enabled = true;
        s.resize_width = 6;
        s.resize_height = 4;
        let out = Pipeline::new().process(&png_file(30, 20), &s).unwrap();
        assert_eq!(out.dimensions(), Dimensions::new(6, 4));
        assert_eq!(&out.bytes[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn undecodable_source_fails_opaquely() {
        let file = SourceFile::new("broken.png", "image/png", b"not a png".to_vec());
        let err = Pipeline::new()
            .process(&file, &settings(ImageFormat::WebP))
            .unwrap_err();
        assert_eq!(err.to_string(), PROCESSING_FAILED_MESSAGE);
        assert!(matches!(err.cause(), OptiImageError::DecodeFailed { .. }));
    }

    #[test]
    fn missing_encoder_is_unsupported_format() {
        struct FixedBytes;
        impl Encoder for FixedBytes {
            fn name(&self) -> &'static str {
                "noop"
            }
            fn encode(&self, _: &PixelBuffer, _: &CompressionSettings) -> Result<Vec<u8>> {
                Ok(vec![1, 2, 3])
            }
        }

        let mut registry = CodecRegistry::new();
        registry.register_encoder(ImageFormat::Png, Arc::new(FixedBytes));
        let pipeline = Pipeline::with_registry(registry);

        let err = pipeline
            .process_detailed(&png_file(2, 2), &settings(ImageFormat::WebP))
            .unwrap_err();
        assert!(matches!(err, OptiImageError::UnsupportedFormat { .. }));

        let ico = pipeline
            .process_detailed(&png_file(2, 2), &settings(ImageFormat::Ico))
            .unwrap();
        assert_eq!(ico.format, ImageFormat::Ico);
        assert_eq!(ico.bytes.len(), 22 + 3);
    }
}
