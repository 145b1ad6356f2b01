#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use optiimage::engine::{package_ico, ICO_HEADER_LEN};

#[derive(Arbitrary, Debug)]
struct IcoSeed {
    width: u32,
    height: u32,
    payload: Vec<u8>,
}

fuzz_target!(|seed: IcoSeed| {
    let ico = package_ico(&seed.payload, seed.width, seed.height);
    assert_eq!(ico.len(), seed.payload.len() + ICO_HEADER_LEN);
    assert_eq!(&ico[ICO_HEADER_LEN..], seed.payload.as_slice());
    assert_eq!(
        u32::from_le_bytes([ico[14], ico[15], ico[16], ico[17]]) as usize,
        seed.payload.len()
    );
});
