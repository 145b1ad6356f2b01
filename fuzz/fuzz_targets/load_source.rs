#![no_main]

//! Arbitrary bytes under every declared MIME type through the loader.

use libfuzzer_sys::fuzz_target;
use optiimage::engine::load;
use optiimage::{CodecRegistry, ImageFormat};
use std::sync::OnceLock;

static REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    let Some((&selector, bytes)) = data.split_first() else {
        return;
    };
    let registry = REGISTRY.get_or_init(CodecRegistry::standard);
    let mime = match ImageFormat::ALL.get(selector as usize % (ImageFormat::ALL.len() + 1)) {
        Some(format) => format.mime_type(),
        None => "image/svg+xml",
    };
    let _ = load(bytes, mime, registry);
});
