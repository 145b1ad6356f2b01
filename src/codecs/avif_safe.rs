// src/codecs/avif_safe.rs
//
// RAII wrappers around the libavif encoder FFI.
// All raw pointers stay inside this file; callers only see owned values and Results.
#![deny(unsafe_op_in_unsafe_fn)]

use crate::engine::check_dimensions;
use crate::error::OptiImageError;
use libavif_sys::*;
use std::ptr::NonNull;

type AvifResult<T> = std::result::Result<T, OptiImageError>;

fn avif_error(context: &str, result: avifResult) -> OptiImageError {
    OptiImageError::encode_failed("avif", format!("{context}: {result:?}"))
}

/// An 8-bit YUV420 image owned by libavif.
pub struct AvifImage {
    ptr: NonNull<avifImage>,
    width: u32,
    height: u32,
}

// The image is only touched through &mut self, and libavif keeps no thread-local state for it.
unsafe impl Send for AvifImage {}

impl AvifImage {
    /// Convert tightly packed RGBA8 pixels into a BT.709 full-range YUV420 image.
    ///
    /// When `keep_alpha` is false the alpha channel is dropped and no alpha plane is
    /// written, which keeps opaque output small.
    pub fn from_rgba(pixels: &[u8], width: u32, height: u32, keep_alpha: bool) -> AvifResult<Self> {
        if width == 0 || height == 0 {
            return Err(OptiImageError::encode_failed(
                "avif",
                "image width and height must be greater than 0",
            ));
        }
        check_dimensions(width, height)?;

        let row_bytes = width
            .checked_mul(4)
            .ok_or_else(|| OptiImageError::encode_failed("avif", "row bytes overflow"))?;
        let expected = row_bytes as usize * height as usize;
        if pixels.len() != expected {
            return Err(OptiImageError::encode_failed(
                "avif",
                format!("pixel buffer is {} bytes, expected {expected}", pixels.len()),
            ));
        }

        let raw = unsafe { avifImageCreate(width, height, 8, AVIF_PIXEL_FORMAT_YUV420) };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| OptiImageError::encode_failed("avif", "failed to create AVIF image"))?;
        let mut image = Self { ptr, width, height };

        unsafe {
            let raw = image.ptr.as_ptr();
            (*raw).colorPrimaries = AVIF_COLOR_PRIMARIES_BT709 as u16;
            (*raw).transferCharacteristics = AVIF_TRANSFER_CHARACTERISTICS_SRGB as u16;
            (*raw).matrixCoefficients = AVIF_MATRIX_COEFFICIENTS_BT709 as u16;
            (*raw).yuvRange = AVIF_RANGE_FULL;
        }

        let mut rgb: avifRGBImage = unsafe { std::mem::zeroed() };
        unsafe {
            avifRGBImageSetDefaults(&mut rgb, image.ptr.as_ptr());
        }
        rgb.format = AVIF_RGB_FORMAT_RGBA;
        rgb.depth = 8;
        rgb.rowBytes = row_bytes;
        // libavif only reads from the RGB buffer during conversion
        rgb.pixels = pixels.as_ptr() as *mut u8;
        rgb.ignoreAlpha = if keep_alpha { AVIF_FALSE as _ } else { AVIF_TRUE as _ };

        image.allocate_planes(AVIF_PLANES_YUV)?;
        let result = unsafe { avifImageRGBToYUV(image.ptr.as_ptr(), &rgb) };
        if result != AVIF_RESULT_OK {
            return Err(avif_error("RGB to YUV conversion failed", result));
        }

        if keep_alpha {
            image.allocate_planes(AVIF_PLANES_A)?;
            image.copy_alpha_from_rgba(pixels)?;
        }

        Ok(image)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn allocate_planes(&mut self, planes: u32) -> AvifResult<()> {
        let result = unsafe { avifImageAllocatePlanes(self.ptr.as_ptr(), planes) };
        if result != AVIF_RESULT_OK {
            return Err(avif_error("failed to allocate planes", result));
        }
        Ok(())
    }

    /// Write the A channel of an RGBA8 buffer into the allocated alpha plane.
    fn copy_alpha_from_rgba(&mut self, pixels: &[u8]) -> AvifResult<()> {
        let (plane, row_bytes) = unsafe {
            let raw = self.ptr.as_ptr();
            ((*raw).alphaPlane, (*raw).alphaRowBytes as usize)
        };
        let plane = NonNull::new(plane)
            .ok_or_else(|| OptiImageError::encode_failed("avif", "alpha plane is not allocated"))?;

        let width = self.width as usize;
        if row_bytes < width {
            return Err(OptiImageError::encode_failed(
                "avif",
                "alpha plane rows are narrower than the image",
            ));
        }

        let plane_len = row_bytes * self.height as usize;
        // SAFETY: libavif allocated alphaRowBytes * height bytes for an 8-bit alpha plane
        // and we hold the only handle to the image.
        let plane = unsafe { std::slice::from_raw_parts_mut(plane.as_ptr(), plane_len) };
        for (dst_row, src_row) in plane
            .chunks_exact_mut(row_bytes)
            .zip(pixels.chunks_exact(width * 4))
        {
            for (dst, src) in dst_row.iter_mut().zip(src_row.chunks_exact(4)) {
                *dst = src[3];
            }
        }
        Ok(())
    }
}

impl Drop for AvifImage {
    fn drop(&mut self) {
        unsafe { avifImageDestroy(self.ptr.as_ptr()) };
    }
}

/// Single-frame AVIF encoder.
pub struct AvifEncoder {
    ptr: NonNull<avifEncoder>,
}

unsafe impl Send for AvifEncoder {}

impl AvifEncoder {
    pub fn new() -> AvifResult<Self> {
        let raw = unsafe { avifEncoderCreate() };
        let ptr = NonNull::new(raw)
            .ok_or_else(|| OptiImageError::encode_failed("avif", "failed to create AVIF encoder"))?;
        Ok(Self { ptr })
    }

    /// `quality` is 0-100 (applied to color and alpha), `speed` is libavif's 0-10 scale.
    pub fn configure(&mut self, quality: u8, speed: i32, max_threads: i32) {
        let quality = i32::from(quality.min(100));
        unsafe {
            let raw = self.ptr.as_ptr();
            (*raw).quality = quality;
            (*raw).qualityAlpha = quality;
            (*raw).speed = speed.clamp(0, 10);
            (*raw).maxThreads = max_threads.max(1);
        }
    }

    /// Encode one still image and return the AVIF container bytes.
    pub fn encode(&mut self, image: &AvifImage) -> AvifResult<Vec<u8>> {
        let result = unsafe {
            avifEncoderAddImage(
                self.ptr.as_ptr(),
                image.ptr.as_ptr(),
                1,
                AVIF_ADD_IMAGE_FLAG_SINGLE,
            )
        };
        if result != AVIF_RESULT_OK {
            return Err(avif_error("failed to add image", result));
        }

        let mut output = RwData::new();
        let result = unsafe { avifEncoderFinish(self.ptr.as_ptr(), &mut output.0) };
        if result != AVIF_RESULT_OK {
            return Err(avif_error("failed to finish encoding", result));
        }
        Ok(output.as_slice().to_vec())
    }
}

impl Drop for AvifEncoder {
    fn drop(&mut self) {
        unsafe { avifEncoderDestroy(self.ptr.as_ptr()) };
    }
}

/// Output buffer owned by libavif, freed on drop.
struct RwData(avifRWData);

impl RwData {
    fn new() -> Self {
        Self(unsafe { std::mem::zeroed() })
    }

    fn as_slice(&self) -> &[u8] {
        if self.0.data.is_null() || self.0.size == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.0.data, self.0.size) }
        }
    }
}

impl Drop for RwData {
    fn drop(&mut self) {
        unsafe { avifRWDataFree(&mut self.0) };
    }
}
