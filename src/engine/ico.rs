// src/engine/ico.rs
//
// Single-entry ICO container around a PNG payload.
//
// Layout (little-endian):
//   ICONDIR       reserved u16 = 0, type u16 = 1, count u16 = 1
//   ICONDIRENTRY  width u8, height u8 (256 and above stored as 0), palette u8 = 0,
//                 reserved u8 = 0, planes u16 = 1, bpp u16 = 32,
//                 payload size u32, payload offset u32 = 22
//   payload       PNG bytes, copied verbatim

/// ICONDIR (6 bytes) plus one ICONDIRENTRY (16 bytes).
pub const ICO_HEADER_LEN: usize = 22;

/// Wrap `png` in an ICO container describing a `width` x `height` image.
///
/// The payload is not inspected. Dimensions that do not fit in a byte
/// (256 and above) are written as 0, which ICO readers interpret as 256.
pub fn package_ico(png: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut ico = Vec::with_capacity(ICO_HEADER_LEN + png.len());

    // ICONDIR
    ico.extend_from_slice(&0u16.to_le_bytes());
    ico.extend_from_slice(&1u16.to_le_bytes());
    ico.extend_from_slice(&1u16.to_le_bytes());

    // ICONDIRENTRY
    ico.push(dimension_byte(width));
    ico.push(dimension_byte(height));
    ico.push(0);
    ico.push(0);
    ico.extend_from_slice(&1u16.to_le_bytes());
    ico.extend_from_slice(&32u16.to_le_bytes());
    ico.extend_from_slice(&(png.len() as u32).to_le_bytes());
    ico.extend_from_slice(&(ICO_HEADER_LEN as u32).to_le_bytes());

    ico.extend_from_slice(png);
    ico
}

fn dimension_byte(value: u32) -> u8 {
    u8::try_from(value).unwrap_or(0)
}
