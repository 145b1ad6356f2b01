// src/engine/resize.rs
//
// Lanczos3 resize of RGBA8 buffers via fast_image_resize, with the image crate as a
// fallback when fir rejects the buffer. Shared by the rasterizer (resize-on-draw) and
// the explicit resize stage used after fallback decoding.

use crate::engine::check_dimensions;
use crate::engine::common::run_with_panic_policy;
use crate::engine::raster::PixelBuffer;
use crate::error::{OptiImageError, Result};
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::imageops::FilterType;
use image::RgbaImage;

/// Resize stage: scale a decoded buffer to exactly `width` x `height`.
///
/// Target dimensions are clamped to at least one pixel. Equal dimensions return the
/// buffer untouched.
pub fn resize(buffer: PixelBuffer, width: u32, height: u32) -> Result<PixelBuffer> {
    let target = (width.max(1), height.max(1));
    let source = buffer.dimensions();
    if source == target {
        return Ok(buffer);
    }
    check_dimensions(target.0, target.1)?;

    tracing::debug!(
        from = %format!("{}x{}", source.0, source.1),
        to = %format!("{}x{}", target.0, target.1),
        "resizing pixel buffer"
    );

    run_with_panic_policy("resize", || {
        let pixels = resize_rgba(buffer.into_raw(), source.0, source.1, target.0, target.1)
            .map_err(|reason| OptiImageError::resize_failed(source, target, reason))?;
        PixelBuffer::from_raw(target.0, target.1, pixels)
    })
}

fn default_resize_options() -> ResizeOptions {
    // Alpha is premultiplied by hand below, so fir must not do it a second time.
    ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
        .use_alpha(false)
}

/// Resize tightly packed RGBA8 pixels. Errors are plain strings; the caller attaches
/// the dimensions when building `ResizeFailed`.
pub(crate) fn resize_rgba(
    mut src_pixels: Vec<u8>,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<Vec<u8>, String> {
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err("invalid dimensions for resize".to_string());
    }

    let required_bytes = (src_width as usize)
        .checked_mul(src_height as usize)
        .and_then(|n| n.checked_mul(PixelType::U8x4.size()))
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;
    if src_pixels.len() != required_bytes {
        return Err(format!(
            "invalid source buffer size. expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let primary = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        PixelType::U8x4,
    ) {
        Ok(src_image) => resize_with_source_image(&src_image, dst_width, dst_height),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_width, src_height, PixelType::U8x4);
            aligned.buffer_mut().copy_from_slice(&src_pixels);
            resize_with_source_image(&aligned, dst_width, dst_height)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary {
        Ok(pixels) => Ok(pixels),
        Err(err) => {
            tracing::warn!(error = %err, "fast resize failed, retrying with image crate");
            resize_with_image_crate(src_pixels, src_width, src_height, dst_width, dst_height)
                .map_err(|fallback| format!("{err}; image crate fallback failed: {fallback}"))
        }
    }
}

/// `src_image` is left in straight alpha so a failed attempt can still hand the same
/// pixels to the image crate fallback.
fn resize_with_source_image(
    src_image: &fir::images::Image<'_>,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<Vec<u8>, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, PixelType::U8x4);
    let needs_premultiply = !is_fully_opaque(src_image.buffer());

    let mul_div = MulDiv::default();
    let premultiplied = if needs_premultiply {
        let mut copy =
            fir::images::Image::new(src_image.width(), src_image.height(), PixelType::U8x4);
        mul_div
            .multiply_alpha(src_image, &mut copy)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
        Some(copy)
    } else {
        None
    };

    let mut resizer = fir::Resizer::new();
    let options = default_resize_options();
    let resized = match &premultiplied {
        Some(copy) => resizer.resize(copy, &mut dst_image, &options),
        None => resizer.resize(src_image, &mut dst_image, &options),
    };
    resized.map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    Ok(dst_image.into_vec())
}

fn resize_with_image_crate(
    src_pixels: Vec<u8>,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<Vec<u8>, String> {
    let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels)
        .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
    Ok(image::imageops::resize(&rgba, dst_width, dst_height, FilterType::Lanczos3).into_raw())
}

fn is_fully_opaque(rgba: &[u8]) -> bool {
    rgba.iter().skip(3).step_by(4).all(|&alpha| alpha == 255)
}
