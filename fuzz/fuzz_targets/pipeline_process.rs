#![no_main]

//! Whole runs with arbitrary sources and settings. Failures must surface as
//! `ProcessingFailed`, never as a panic.

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use optiimage::{CompressionSettings, ImageFormat, Pipeline, SourceFile};
use std::sync::OnceLock;

static PIPELINE: OnceLock<Pipeline> = OnceLock::new();

#[derive(Arbitrary, Debug)]
struct RunSeed {
    source_format: u8,
    target_format: u8,
    quality: u8,
    resize: Option<(u8, u8)>,
    auto_mode: bool,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let Ok(seed) = RunSeed::arbitrary(&mut unstructured) else {
        return;
    };
    let bytes = unstructured.take_rest().to_vec();
    let pick = |n: u8| ImageFormat::ALL[n as usize % ImageFormat::ALL.len()];

    let file = SourceFile::new("fuzz", pick(seed.source_format).mime_type(), bytes);
    let (resize_width, resize_height) = seed.resize.map_or((0, 0), |(w, h)| (w as u32, h as u32));
    let settings = CompressionSettings {
        format: pick(seed.target_format),
        quality: seed.quality as f64 / 255.0,
        auto_mode: seed.auto_mode,
        resize_enabled: seed.resize.is_some(),
        resize_width,
        resize_height,
        maintain_aspect_ratio: true,
    };

    let pipeline = PIPELINE.get_or_init(Pipeline::new);
    if let Ok(encoded) = pipeline.process(&file, &settings) {
        assert!(!encoded.is_empty());
        assert_ne!(encoded.format, ImageFormat::Original);
    }
});
