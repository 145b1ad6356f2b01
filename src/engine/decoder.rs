// src/engine/decoder.rs
//
// Decoder operations.
//
// Two tiers:
// - native: content-sniffed decode through the image crate, restricted to what a browser
//   decodes on its own (JPEG, PNG, WebP, GIF, BMP), with EXIF orientation applied.
// - fallback: format-specific decoders (mozjpeg, zune-png, libwebp, avif-decode, libjxl,
//   image's QOI codec) registered per declared MIME type in the codec registry.

use crate::codecs::Decoder;
use crate::engine::common::run_with_panic_policy;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{OptiImageError, Result};
use image::metadata::Orientation;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// Formats the native path accepts after sniffing.
const NATIVE_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(OptiImageError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(OptiImageError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Read width and height from the container header without decoding pixels.
pub fn header_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> Result<()> {
    match header_dimensions(bytes) {
        Some((width, height)) => check_dimensions(width, height),
        None => Ok(()),
    }
}

/// Native decode path. Fails for anything a browser would not decode by itself,
/// which sends the loader to the registered fallback decoders.
pub fn decode_native(bytes: &[u8]) -> Result<DynamicImage> {
    let format = detect_format(bytes)
        .ok_or_else(|| OptiImageError::decode_failed("native: unrecognized image signature"))?;
    if !NATIVE_FORMATS.contains(&format) {
        return Err(OptiImageError::unsupported_format(format!(
            "native: {format:?}"
        )));
    }
    ensure_dimensions_safe(bytes)?;

    run_with_panic_policy("decode:native", || {
        let mut img = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| OptiImageError::decode_failed(format!("native: {e}")))?;
        check_dimensions(img.width(), img.height())?;

        if format == ImageFormat::Jpeg {
            if let Some(orientation) =
                detect_exif_orientation(bytes).and_then(|v| Orientation::from_exif(v as u8))
            {
                img.apply_orientation(orientation);
            }
        }
        Ok(img)
    })
}

/// Extract EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    // exif crate can represent as Short/Long; use get_uint for safety
    let orientation = field.value.get_uint(0)? as u16;
    (1..=8).contains(&orientation).then_some(orientation)
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(OptiImageError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            OptiImageError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;
        let mut decompress = decompress.rgb().map_err(|e| {
            OptiImageError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = u32::try_from(decompress.width())
            .map_err(|_| OptiImageError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        let height = u32::try_from(decompress.height())
            .map_err(|_| OptiImageError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            OptiImageError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        RgbImage::from_raw(width, height, flat_pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| {
                OptiImageError::decode_failed("mozjpeg: failed to create image from raw data")
            })
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        decoder
            .decode_headers()
            .map_err(|e| OptiImageError::decode_failed(format!("png: bad header: {e}")))?;
        let info = decoder
            .info()
            .ok_or_else(|| OptiImageError::decode_failed("png: missing header info"))?;
        let (width, height) = (info.width as u32, info.height as u32);
        check_dimensions(width, height)?;

        let pixels = decoder
            .decode()
            .map_err(|e| OptiImageError::decode_failed(format!("png: decode failed: {e}")))?;
        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(OptiImageError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| OptiImageError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
            ColorSpace::RGBA => {
                RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
            ColorSpace::LumaA => {
                GrayAlphaImage::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
            }
            other => {
                return Err(OptiImageError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };
        img.ok_or_else(|| OptiImageError::decode_failed("png: pixel buffer size mismatch"))
    })
}

/// Decode WebP using libwebp. Animated WebP goes through the image crate (first frame).
pub fn decode_webp_libwebp(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        // Parse header first to avoid allocating huge buffers on malformed files
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            OptiImageError::decode_failed("webp: failed to read bitstream features")
        })?;
        check_dimensions(features.width(), features.height())?;

        if features.has_animation() {
            return image::load_from_memory_with_format(data, ImageFormat::WebP).map_err(|e| {
                OptiImageError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| OptiImageError::decode_failed("webp: decode failed"))?;
        check_dimensions(decoded.width(), decoded.height())?;
        Ok(decoded.to_image())
    })
}

/// Decode QOI through the image crate's codec.
pub fn decode_qoi(data: &[u8]) -> Result<DynamicImage> {
    run_with_panic_policy("decode:qoi", || {
        if let Some((width, height)) = header_dimensions(data) {
            check_dimensions(width, height)?;
        }
        image::load_from_memory_with_format(data, ImageFormat::Qoi)
            .map_err(|e| OptiImageError::decode_failed(format!("qoi: {e}")))
    })
}

/// Decode AVIF using avif-decode (libaom + libyuv). High bit depth is reduced to 8 bits.
#[cfg(feature = "avif-decode")]
pub fn decode_avif(data: &[u8]) -> Result<DynamicImage> {
    use avif_decode::Image as AvifImage;

    fn dims(width: usize, height: usize) -> Result<(u32, u32)> {
        let width = u32::try_from(width)
            .map_err(|_| OptiImageError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        let height = u32::try_from(height)
            .map_err(|_| OptiImageError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        check_dimensions(width, height)?;
        Ok((width, height))
    }

    run_with_panic_policy("decode:avif", || {
        let decoder = avif_decode::Decoder::from_avif(data)
            .map_err(|e| OptiImageError::decode_failed(format!("avif: {e}")))?;
        let image = decoder
            .to_image()
            .map_err(|e| OptiImageError::decode_failed(format!("avif: {e}")))?;

        let (width, height, rgba): (u32, u32, Vec<u8>) = match image {
            AvifImage::Rgb8(img) => {
                let (w, h) = dims(img.width(), img.height())?;
                let buf = img.buf().iter().flat_map(|px| [px.r, px.g, px.b, 255]).collect();
                (w, h, buf)
            }
            AvifImage::Rgba8(img) => {
                let (w, h) = dims(img.width(), img.height())?;
                let buf = img.buf().iter().flat_map(|px| [px.r, px.g, px.b, px.a]).collect();
                (w, h, buf)
            }
            AvifImage::Rgb16(img) => {
                let (w, h) = dims(img.width(), img.height())?;
                let buf = img
                    .buf()
                    .iter()
                    .flat_map(|px| [(px.r >> 8) as u8, (px.g >> 8) as u8, (px.b >> 8) as u8, 255])
                    .collect();
                (w, h, buf)
            }
            AvifImage::Rgba16(img) => {
                let (w, h) = dims(img.width(), img.height())?;
                let buf = img
                    .buf()
                    .iter()
                    .flat_map(|px| {
                        [
                            (px.r >> 8) as u8,
                            (px.g >> 8) as u8,
                            (px.b >> 8) as u8,
                            (px.a >> 8) as u8,
                        ]
                    })
                    .collect();
                (w, h, buf)
            }
            AvifImage::Gray8(img) => {
                let (w, h) = dims(img.width(), img.height())?;
                let buf = img
                    .buf()
                    .iter()
                    .flat_map(|px| {
                        let v = px.value();
                        [v, v, v, 255]
                    })
                    .collect();
                (w, h, buf)
            }
            AvifImage::Gray16(img) => {
                let (w, h) = dims(img.width(), img.height())?;
                let buf = img
                    .buf()
                    .iter()
                    .flat_map(|px| {
                        let v = (px.value() >> 8) as u8;
                        [v, v, v, 255]
                    })
                    .collect();
                (w, h, buf)
            }
        };

        RgbaImage::from_raw(width, height, rgba)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| OptiImageError::decode_failed("avif: pixel buffer size mismatch"))
    })
}

/// Decode JPEG XL using libjxl.
#[cfg(feature = "jxl")]
pub fn decode_jxl(data: &[u8]) -> Result<DynamicImage> {
    use jpegxl_rs::decoder_builder;

    run_with_panic_policy("decode:jxl", || {
        let decoder = decoder_builder()
            .build()
            .map_err(|e| OptiImageError::decode_failed(format!("jxl: {e}")))?;
        let (metadata, pixels) = decoder
            .decode_with::<u8>(data)
            .map_err(|e| OptiImageError::decode_failed(format!("jxl: {e}")))?;
        check_dimensions(metadata.width, metadata.height)?;

        let (width, height) = (metadata.width, metadata.height);
        let channels = metadata.num_color_channels + u32::from(metadata.has_alpha_channel);
        let img = match channels {
            1 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
            2 => GrayAlphaImage::from_raw(width, height, pixels).map(DynamicImage::ImageLumaA8),
            3 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8),
            other => {
                return Err(OptiImageError::decode_failed(format!(
                    "jxl: unsupported channel count {other}"
                )))
            }
        };
        img.ok_or_else(|| OptiImageError::decode_failed("jxl: pixel buffer size mismatch"))
    })
}

// Registry adapters

pub struct MozjpegDecoder;

impl Decoder for MozjpegDecoder {
    fn name(&self) -> &'static str {
        "mozjpeg"
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        decode_jpeg_mozjpeg(bytes)
    }
}

pub struct ZunePngDecoder;

impl Decoder for ZunePngDecoder {
    fn name(&self) -> &'static str {
        "zune-png"
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        decode_png_zune(bytes)
    }
}

pub struct LibwebpDecoder;

impl Decoder for LibwebpDecoder {
    fn name(&self) -> &'static str {
        "libwebp"
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        decode_webp_libwebp(bytes)
    }
}

pub struct QoiDecoder;

impl Decoder for QoiDecoder {
    fn name(&self) -> &'static str {
        "qoi"
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        decode_qoi(bytes)
    }
}

#[cfg(feature = "avif-decode")]
pub struct AvifDecoder;

#[cfg(feature = "avif-decode")]
impl Decoder for AvifDecoder {
    fn name(&self) -> &'static str {
        "avif-decode"
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        decode_avif(bytes)
    }
}

#[cfg(feature = "jxl")]
pub struct JxlDecoder;

#[cfg(feature = "jxl")]
impl Decoder for JxlDecoder {
    fn name(&self) -> &'static str {
        "libjxl"
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        decode_jxl(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb};

    fn encode_webp(width: u32, height: u32) -> Vec<u8> {
        let rgb: Vec<u8> = std::iter::repeat([10u8, 20u8, 30u8])
            .take((width * height) as usize)
            .flatten()
            .collect();
        webp::Encoder::from_rgb(&rgb, width, height)
            .encode_lossless()
            .to_vec()
    }

    fn encode_with(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    fn rgb(width: u32, height: u32, px: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(px)))
    }

    #[test]
    fn test_ensure_dimensions_safe_allows_small_image() {
        let data = encode_with(rgb(64, 64, [0, 0, 0]), ImageFormat::Png);
        assert!(ensure_dimensions_safe(&data).is_ok());
    }

    #[test]
    fn test_ensure_dimensions_safe_rejects_large_image() {
        let data = encode_with(rgb(MAX_DIMENSION + 1, 1, [0, 0, 0]), ImageFormat::Png);
        let err = ensure_dimensions_safe(&data).unwrap_err();
        assert!(matches!(err, OptiImageError::DimensionExceedsLimit { .. }));
    }

    #[test]
    fn test_check_dimensions_pixel_limit() {
        let err = check_dimensions(20_000, 20_000).unwrap_err();
        assert!(matches!(err, OptiImageError::PixelCountExceedsLimit { .. }));
        assert!(check_dimensions(10_000, 10_000).is_ok());
    }

    #[test]
    fn native_decodes_browser_formats() {
        let png = encode_with(rgb(3, 2, [1, 2, 3]), ImageFormat::Png);
        assert_eq!(decode_native(&png).unwrap().dimensions(), (3, 2));

        let bmp = encode_with(rgb(4, 4, [1, 2, 3]), ImageFormat::Bmp);
        assert_eq!(decode_native(&bmp).unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn native_rejects_qoi() {
        let qoi = encode_with(
            DynamicImage::ImageRgba8(RgbaImage::new(2, 2)),
            ImageFormat::Qoi,
        );
        let err = decode_native(&qoi).unwrap_err();
        assert!(matches!(err, OptiImageError::UnsupportedFormat { .. }));
        assert_eq!(decode_qoi(&qoi).unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn native_rejects_garbage() {
        let err = decode_native(b"definitely not an image").unwrap_err();
        assert!(matches!(err, OptiImageError::DecodeFailed { .. }));
    }

    #[test]
    fn mozjpeg_decodes_jpeg() {
        let jpeg = encode_with(rgb(2, 2, [9, 8, 7]), ImageFormat::Jpeg);
        assert_eq!(detect_format(&jpeg), Some(ImageFormat::Jpeg));
        assert_eq!(decode_jpeg_mozjpeg(&jpeg).unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn mozjpeg_rejects_truncated_jpeg() {
        let jpeg = encode_with(rgb(8, 8, [9, 8, 7]), ImageFormat::Jpeg);
        assert!(decode_jpeg_mozjpeg(&jpeg[..jpeg.len() / 2]).is_err());
    }

    #[test]
    fn zune_decodes_png() {
        let png = encode_with(rgb(3, 1, [0, 0, 0]), ImageFormat::Png);
        let img = decode_png_zune(&png).unwrap();
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn libwebp_decodes_lossless_webp() {
        let webp = encode_webp(3, 2);
        let img = decode_webp_libwebp(&webp).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.to_rgb8().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn exif_orientation_absent_for_plain_jpeg() {
        let jpeg = encode_with(rgb(2, 2, [1, 1, 1]), ImageFormat::Jpeg);
        assert_eq!(detect_exif_orientation(&jpeg), None);
    }

    #[cfg(feature = "jxl")]
    #[test]
    fn jxl_decode_keeps_encoded_dimensions() {
        use crate::engine::encoder::encode_jxl;
        use crate::engine::raster::PixelBuffer;

        let pixels = PixelBuffer::new(RgbaImage::from_pixel(12, 7, image::Rgba([40, 80, 120, 255])));
        let jxl = encode_jxl(&pixels, 90).unwrap();
        let img = decode_jxl(&jxl).unwrap();
        assert_eq!(img.dimensions(), (12, 7));
    }

    #[cfg(feature = "jxl")]
    #[test]
    fn jxl_decode_rejects_garbage() {
        let err = decode_jxl(b"not a jpeg xl stream").unwrap_err();
        assert!(matches!(err, OptiImageError::DecodeFailed { .. }));
    }
}
