// src/engine/raster.rs
//
// Pixel buffers and the rasterizer.
//
// A RasterHandle is what the native decode path produces: either a decoded bitmap or a
// parsed vector tree. `rasterize` consumes it and draws it at the requested size, so the
// decoded resources are dropped right after readback.

use crate::engine::check_dimensions;
use crate::engine::common::run_with_panic_policy;
use crate::engine::resize::resize_rgba;
use crate::error::{OptiImageError, Result};
use crate::format::Dimensions;
use image::{DynamicImage, RgbaImage};
use resvg::{tiny_skia, usvg};

/// Straight-alpha RGBA8 pixels with explicit dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Wrap raw RGBA8 bytes. Fails when the length does not match `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let len = pixels.len();
        RgbaImage::from_raw(width, height, pixels)
            .map(Self::new)
            .ok_or_else(|| {
                OptiImageError::decode_failed(format!(
                    "pixel buffer of {len} bytes does not match {width}x{height} RGBA"
                ))
            })
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::new(image.into_rgba8())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.image
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.image.into_raw()
    }

    /// True if any pixel is not fully opaque.
    pub fn has_transparency(&self) -> bool {
        self.image.as_raw().iter().skip(3).step_by(4).any(|&a| a != 255)
    }
}

/// A decoded source ready to be drawn.
pub enum RasterHandle {
    Bitmap(DynamicImage),
    Vector(Box<usvg::Tree>),
}

impl RasterHandle {
    /// Natural size. Vector trees report their viewport size rounded to whole pixels.
    pub fn dimensions(&self) -> Dimensions {
        match self {
            RasterHandle::Bitmap(img) => Dimensions::new(img.width(), img.height()),
            RasterHandle::Vector(tree) => vector_dimensions(tree),
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, RasterHandle::Vector(_))
    }
}

impl std::fmt::Debug for RasterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_vector() { "Vector" } else { "Bitmap" };
        write!(f, "RasterHandle::{kind}({})", self.dimensions())
    }
}

pub(crate) fn vector_dimensions(tree: &usvg::Tree) -> Dimensions {
    let size = tree.size();
    Dimensions::new(size.width().round() as u32, size.height().round() as u32)
}

/// Draw `handle` into a `width` x `height` RGBA buffer.
///
/// Bitmaps are resampled with Lanczos3 when the size differs. Vectors are rendered
/// directly at the target size, stretched to fill it.
pub fn rasterize(handle: RasterHandle, width: u32, height: u32) -> Result<PixelBuffer> {
    let (width, height) = (width.max(1), height.max(1));
    check_dimensions(width, height)?;

    match handle {
        RasterHandle::Bitmap(img) => run_with_panic_policy("rasterize:bitmap", || {
            let source = (img.width(), img.height());
            let rgba = img.into_rgba8();
            if source == (width, height) {
                return Ok(PixelBuffer::new(rgba));
            }
            let pixels = resize_rgba(rgba.into_raw(), source.0, source.1, width, height)
                .map_err(|reason| OptiImageError::resize_failed(source, (width, height), reason))?;
            PixelBuffer::from_raw(width, height, pixels)
        }),
        RasterHandle::Vector(tree) => {
            run_with_panic_policy("rasterize:vector", || render_vector(&tree, width, height))
        }
    }
}

fn render_vector(tree: &usvg::Tree, width: u32, height: u32) -> Result<PixelBuffer> {
    let size = tree.size();
    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
        OptiImageError::internal_panic(format!("failed to allocate {width}x{height} pixmap"))
    })?;
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(tree, transform, &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha; encoders expect straight alpha.
    let pixels = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    PixelBuffer::from_raw(width, height, pixels)
}
