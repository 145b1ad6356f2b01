// tests/common/mod.rs
//
// Source builders shared by the integration tests.

#![allow(dead_code)]

use image::{DynamicImage, Rgba, RgbaImage};
use optiimage::SourceFile;
use std::io::Cursor;

pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    }))
}

pub fn encoded(image: &DynamicImage, format: image::ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    let image = if format == image::ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        image.clone()
    };
    image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

pub fn png_source(name: &str, width: u32, height: u32) -> SourceFile {
    SourceFile::new(name, "image/png", encoded(&gradient(width, height), image::ImageFormat::Png))
}

pub fn jpeg_source(name: &str, width: u32, height: u32) -> SourceFile {
    SourceFile::new(name, "image/jpeg", encoded(&gradient(width, height), image::ImageFormat::Jpeg))
}

pub fn svg_source(name: &str, width: u32, height: u32) -> SourceFile {
    let svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">
<rect width="{width}" height="{height}" fill="#3366cc"/>
<circle cx="{cx}" cy="{cy}" r="{r}" fill="#ffcc00" fill-opacity="0.5"/>
</svg>"##,
        cx = width / 2,
        cy = height / 2,
        r = width.min(height) / 3,
    );
    SourceFile::new(name, "image/svg+xml", svg.into_bytes())
}
