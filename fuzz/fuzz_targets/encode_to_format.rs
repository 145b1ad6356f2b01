#![no_main]

//! Arbitrary pixels through every built-in encoder.

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use optiimage::engine::{encode_avif, encode_jpeg, encode_png, encode_qoi, encode_webp, PixelBuffer};

#[derive(Arbitrary, Debug)]
struct EncodeSeed {
    format: u8,
    quality: u8,
    width: u8,
    height: u8,
    auto_mode: bool,
}

fn build_pixels(data: &[u8], width: u8, height: u8) -> Option<PixelBuffer> {
    // Capped at 128x128 to keep runs fast
    let w = (width as u32 % 128).max(1);
    let h = (height as u32 % 128).max(1);
    let pixels = (0..(w * h * 4) as usize)
        .map(|i| data.get(i % data.len().max(1)).copied().unwrap_or(128))
        .collect();
    PixelBuffer::from_raw(w, h, pixels).ok()
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let Ok(seed) = EncodeSeed::arbitrary(&mut unstructured) else {
        return;
    };
    let Some(pixels) = build_pixels(data, seed.width, seed.height) else {
        return;
    };
    let quality = seed.quality.min(100);

    let _ = match seed.format % 5 {
        0 => encode_jpeg(&pixels, quality),
        1 => encode_png(&pixels, seed.auto_mode),
        2 => encode_webp(&pixels, quality),
        3 => encode_avif(&pixels, quality),
        _ => encode_qoi(&pixels),
    };
});
