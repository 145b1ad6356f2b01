// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng), WebP (libwebp),
// AVIF (libavif), QOI (image) and optionally JPEG XL (libjxl).
//
// Every encoder takes straight-alpha RGBA8 pixels. Lossy encoders receive the
// quality as an integer percentage.

use crate::codecs::avif_safe::{AvifEncoder as LibavifEncoder, AvifImage};
use crate::codecs::Encoder;
use crate::engine::common::run_with_panic_policy;
use crate::engine::raster::PixelBuffer;
use crate::error::{OptiImageError, Result};
use crate::format::CompressionSettings;
use image::{DynamicImage, ImageFormat};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::io::Cursor;

/// oxipng preset when the user prefers speed.
pub const PNG_LEVEL_AUTO: u8 = 1;
/// oxipng preset otherwise.
pub const PNG_LEVEL_THOROUGH: u8 = 3;

/// Single source of truth for deriving per-codec tuning from a quality percentage.
/// Bands:
/// - High (>=85): visual quality first, AVIF speed 6
/// - Balanced (70-84): AVIF speed 7
/// - Fast (50-69): AVIF speed 8
/// - Fastest (<50): AVIF speed 9
/// WebP filter_strength keeps its own 80/60 thresholds.
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }

    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }

    /// libavif speed: 0 (slowest/best) to 10 (fastest/worst)
    pub fn avif_speed(&self) -> i32 {
        match self.band() {
            QualityBand::High => 6,
            QualityBand::Balanced => 7,
            QualityBand::Fast => 8,
            QualityBand::Fastest => 9,
        }
    }

    /// Butteraugli distance for libjxl, following libjxl's own quality mapping.
    pub fn jxl_distance(&self) -> f32 {
        let q = self.quality;
        if q >= 100.0 {
            0.0
        } else if q >= 30.0 {
            0.1 + (100.0 - q) * 0.09
        } else {
            53.0 / 3000.0 * q * q - 23.0 / 20.0 * q + 25.0
        }
    }
}

fn ensure_non_empty(pixels: &PixelBuffer, format: &'static str) -> Result<()> {
    let (w, h) = pixels.dimensions();
    if w == 0 || h == 0 {
        return Err(OptiImageError::encode_failed(
            format,
            "image width and height must be greater than 0",
        ));
    }
    Ok(())
}

fn rgba_to_rgb(pixels: &PixelBuffer) -> Vec<u8> {
    pixels
        .as_raw()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect()
}

/// Encode to JPEG using mozjpeg with progressive, optimized-scan settings.
/// Alpha is discarded.
pub fn encode_jpeg(pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>> {
    ensure_non_empty(pixels, "jpeg")?;
    run_with_panic_policy("encode:jpeg", || {
        let settings = QualitySettings::new(quality);
        let (w, h) = pixels.dimensions();
        let rgb = rgba_to_rgb(pixels);

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.quality());
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                OptiImageError::encode_failed("jpeg", format!("mozjpeg: failed to start compress: {e:?}"))
            })?;
            for row in rgb.chunks(w as usize * 3) {
                writer.write_scanlines(row).map_err(|e| {
                    OptiImageError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }
            writer.finish().map_err(|e| {
                OptiImageError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }
        Ok(output)
    })
}

/// Encode to PNG with the image crate, then re-optimize losslessly with oxipng.
/// `auto_mode` trades compression effort for speed.
pub fn encode_png(pixels: &PixelBuffer, auto_mode: bool) -> Result<Vec<u8>> {
    ensure_non_empty(pixels, "png")?;
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        pixels
            .as_rgba()
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| OptiImageError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let level = if auto_mode {
            PNG_LEVEL_AUTO
        } else {
            PNG_LEVEL_THOROUGH
        };
        let options = oxipng::Options::from_preset(level);
        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            OptiImageError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Encode to WebP. Opaque images are encoded without an alpha channel.
pub fn encode_webp(pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>> {
    ensure_non_empty(pixels, "webp")?;
    run_with_panic_policy("encode:webp", || {
        let (w, h) = pixels.dimensions();
        let rgb;
        let encoder = if pixels.has_transparency() {
            webp::Encoder::from_rgba(pixels.as_raw(), w, h)
        } else {
            rgb = rgba_to_rgb(pixels);
            webp::Encoder::from_rgb(&rgb, w, h)
        };

        let settings = QualitySettings::new(quality);
        let mut config = webp::WebPConfig::new()
            .map_err(|_| OptiImageError::internal_panic("failed to create WebPConfig"))?;
        config.quality = settings.quality();
        config.method = settings.webp_method();
        config.pass = 1;
        config.preprocessing = 0;
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = encoder.encode_advanced(&config).map_err(|e| {
            OptiImageError::encode_failed("webp", format!("WebP encode failed: {e:?}"))
        })?;
        Ok(mem.to_vec())
    })
}

/// Encode to AVIF with libavif (rav1e). Alpha is kept only when some pixel uses it.
pub fn encode_avif(pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>> {
    ensure_non_empty(pixels, "avif")?;
    run_with_panic_policy("encode:avif", || {
        let settings = QualitySettings::new(quality);
        let (w, h) = pixels.dimensions();
        let image = AvifImage::from_rgba(pixels.as_raw(), w, h, pixels.has_transparency())?;

        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .clamp(2, 8) as i32;

        let mut encoder = LibavifEncoder::new()?;
        encoder.configure(quality.min(100), settings.avif_speed(), threads);
        encoder.encode(&image)
    })
}

/// Encode to QOI (lossless) with the image crate.
pub fn encode_qoi(pixels: &PixelBuffer) -> Result<Vec<u8>> {
    ensure_non_empty(pixels, "qoi")?;
    run_with_panic_policy("encode:qoi", || {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(pixels.as_rgba().clone())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Qoi)
            .map_err(|e| OptiImageError::encode_failed("qoi", format!("QOI encode failed: {e}")))?;
        Ok(buf)
    })
}

/// Encode to JPEG XL with libjxl.
#[cfg(feature = "jxl")]
pub fn encode_jxl(pixels: &PixelBuffer, quality: u8) -> Result<Vec<u8>> {
    use jpegxl_rs::encode::{EncoderFrame, EncoderResult};
    use jpegxl_rs::encoder_builder;

    ensure_non_empty(pixels, "jxl")?;
    run_with_panic_policy("encode:jxl", || {
        let settings = QualitySettings::new(quality);
        let (w, h) = pixels.dimensions();
        let mut encoder = encoder_builder()
            .has_alpha(true)
            .quality(settings.jxl_distance())
            .build()
            .map_err(|e| OptiImageError::encode_failed("jxl", e.to_string()))?;
        let frame = EncoderFrame::new(pixels.as_raw()).num_channels(4);
        let result: EncoderResult<u8> = encoder
            .encode_frame(&frame, w, h)
            .map_err(|e| OptiImageError::encode_failed("jxl", e.to_string()))?;
        Ok(result.data)
    })
}

// Registry adapters

pub struct JpegEncoder;

impl Encoder for JpegEncoder {
    fn name(&self) -> &'static str {
        "mozjpeg"
    }

    fn encode(&self, pixels: &PixelBuffer, settings: &CompressionSettings) -> Result<Vec<u8>> {
        encode_jpeg(pixels, settings.quality_percent())
    }
}

pub struct PngEncoder;

impl Encoder for PngEncoder {
    fn name(&self) -> &'static str {
        "oxipng"
    }

    fn encode(&self, pixels: &PixelBuffer, settings: &CompressionSettings) -> Result<Vec<u8>> {
        encode_png(pixels, settings.auto_mode)
    }
}

pub struct WebpEncoder;

impl Encoder for WebpEncoder {
    fn name(&self) -> &'static str {
        "libwebp"
    }

    fn encode(&self, pixels: &PixelBuffer, settings: &CompressionSettings) -> Result<Vec<u8>> {
        encode_webp(pixels, settings.quality_percent())
    }
}

pub struct AvifEncoder;

impl Encoder for AvifEncoder {
    fn name(&self) -> &'static str {
        "libavif"
    }

    fn encode(&self, pixels: &PixelBuffer, settings: &CompressionSettings) -> Result<Vec<u8>> {
        encode_avif(pixels, settings.quality_percent())
    }
}

pub struct QoiEncoder;

impl Encoder for QoiEncoder {
    fn name(&self) -> &'static str {
        "qoi"
    }

    fn encode(&self, pixels: &PixelBuffer, _settings: &CompressionSettings) -> Result<Vec<u8>> {
        encode_qoi(pixels)
    }
}

#[cfg(feature = "jxl")]
pub struct JxlEncoder;

#[cfg(feature = "jxl")]
impl Encoder for JxlEncoder {
    fn name(&self) -> &'static str {
        "libjxl"
    }

    fn encode(&self, pixels: &PixelBuffer, settings: &CompressionSettings) -> Result<Vec<u8>> {
        encode_jxl(pixels, settings.quality_percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::new(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }))
    }

    fn translucent(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::new(RgbaImage::from_fn(width, height, |x, _| {
            Rgba([200, 10, 10, (x * 8 % 256) as u8])
        }))
    }

    #[test]
    fn test_encode_jpeg_produces_valid_jpeg() {
        let result = encode_jpeg(&gradient(100, 100), 80).unwrap();
        assert_eq!(&result[0..2], &[0xFF, 0xD8]);
        assert_eq!(&result[result.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_encode_jpeg_ignores_alpha() {
        let result = encode_jpeg(&translucent(32, 32), 70).unwrap();
        assert_eq!(&result[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_png_levels_are_lossless() {
        let pixels = translucent(40, 20);
        for auto_mode in [true, false] {
            let bytes = encode_png(&pixels, auto_mode).unwrap();
            assert_eq!(&bytes[0..8], &PNG_MAGIC);
            let decoded = image::load_from_memory(&bytes).unwrap().into_rgba8();
            assert_eq!(decoded.as_raw(), pixels.as_raw());
        }
    }

    #[test]
    fn test_encode_webp_produces_valid_webp() {
        for pixels in [gradient(100, 100), translucent(16, 16)] {
            let result = encode_webp(&pixels, 80).unwrap();
            assert_eq!(&result[0..4], b"RIFF");
            assert_eq!(&result[8..12], b"WEBP");
        }
    }

    #[test]
    fn test_encode_avif_produces_ftyp_box() {
        let result = encode_avif(&gradient(64, 48), 60).unwrap();
        assert_eq!(&result[4..8], b"ftyp");
    }

    #[test]
    fn test_encode_qoi_round_trip() {
        let pixels = translucent(9, 7);
        let bytes = encode_qoi(&pixels).unwrap();
        assert_eq!(&bytes[0..4], b"qoif");
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Qoi)
            .unwrap()
            .into_rgba8();
        assert_eq!(decoded.as_raw(), pixels.as_raw());
    }

    #[cfg(feature = "jxl")]
    #[test]
    fn test_encode_jxl_produces_jxl_signature() {
        for pixels in [gradient(32, 24), translucent(16, 16)] {
            let bytes = encode_jxl(&pixels, 80).unwrap();
            assert!(
                bytes.starts_with(&[0xFF, 0x0A]) || bytes.starts_with(&[0, 0, 0, 0x0C]),
                "missing JXL signature"
            );
        }
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        let empty = PixelBuffer::new(RgbaImage::new(0, 0));
        let err = encode_jpeg(&empty, 80).unwrap_err();
        assert!(matches!(err, OptiImageError::EncodeFailed { .. }));
    }

    #[test]
    fn test_quality_band_mapping_boundaries() {
        assert_eq!(QualitySettings::new(90).avif_speed(), 6);
        assert_eq!(QualitySettings::new(75).avif_speed(), 7);
        assert_eq!(QualitySettings::new(60).avif_speed(), 8);
        assert_eq!(QualitySettings::new(40).avif_speed(), 9);
    }

    #[test]
    fn test_quality_settings_webp_mapping_is_stable() {
        let high = QualitySettings::new(90);
        assert_eq!(high.webp_sns_strength(), 50);
        assert_eq!(high.webp_filter_strength(), 20);
        assert_eq!(high.webp_filter_sharpness(), 2);

        let balanced = QualitySettings::new(75);
        assert_eq!(balanced.webp_sns_strength(), 70);
        assert_eq!(balanced.webp_filter_strength(), 30);

        let fastest = QualitySettings::new(40);
        assert_eq!(fastest.webp_sns_strength(), 80);
        assert_eq!(fastest.webp_filter_strength(), 40);
    }

    #[test]
    fn test_jxl_distance_mapping() {
        assert_eq!(QualitySettings::new(100).jxl_distance(), 0.0);
        assert!((QualitySettings::new(90).jxl_distance() - 1.0).abs() < 1e-4);
        assert!((QualitySettings::new(0).jxl_distance() - 25.0).abs() < 1e-4);
        let low = QualitySettings::new(20).jxl_distance();
        let mid = QualitySettings::new(50).jxl_distance();
        assert!(low > mid);
    }

    #[test]
    fn test_registry_adapter_uses_quality_percent() {
        let settings = CompressionSettings {
            quality: 0.5,
            ..CompressionSettings::default()
        };
        let bytes = JpegEncoder.encode(&gradient(16, 16), &settings).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
    }
}
