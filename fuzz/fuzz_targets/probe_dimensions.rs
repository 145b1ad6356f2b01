#![no_main]

use libfuzzer_sys::fuzz_target;
use optiimage::engine::probe_dimensions;
use optiimage::CodecRegistry;

fuzz_target!(|data: &[u8]| {
    let registry = CodecRegistry::new();
    let _ = probe_dimensions(data, "application/octet-stream", &registry);
    let _ = probe_dimensions(data, "image/svg+xml", &registry);
});
