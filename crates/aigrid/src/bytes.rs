//! Big-endian field access for the fixed layout records and tile headers.

/// Amount subtracted from an unsigned bias of the given byte width to make it negative.
/// A width of 4 is stored as a two's complement `i32` and never needs this table.
const SIGN_EXTENSION: [i64; 4] = [0, 1 << 8, 1 << 16, 1 << 24];

#[inline]
pub fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn be_i32(data: &[u8], offset: usize) -> Option<i32> {
    be_u32(data, offset).map(|v| v as i32)
}

#[inline]
pub fn be_f64(data: &[u8], offset: usize) -> Option<f64> {
    let bytes = data.get(offset..offset + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Some(f64::from_be_bytes(raw))
}

/// Reads four consecutive big-endian doubles, the layout shared by `dblbnd.adf` and `sta.adf`.
pub fn be_f64_quad(data: &[u8]) -> Option<[f64; 4]> {
    Some([be_f64(data, 0)?, be_f64(data, 8)?, be_f64(data, 16)?, be_f64(data, 24)?])
}

/// Decodes the tile minimum ("bias") stored in a tile header.
///
/// `bytes` holds the `min_size` bytes of the field (0 to 4 bytes).
/// A 4 byte field is a big-endian two's complement value. Narrower fields are unsigned big-endian values
/// that are sign extended according to their width when `negative_hint` is set.
///
/// Note that the hint is not derived from `bytes`: callers pass the high bit of the byte at a fixed
/// position, the one that follows the 2 byte `(tag, min_size)` tile header (raw tile byte 4).
/// Existing archives depend on this exact byte, keep it even where it looks like it should be the
/// last byte of the field.
pub fn read_bias_value(bytes: &[u8], negative_hint: bool) -> i64 {
    debug_assert!(bytes.len() <= 4, "bias field is at most 4 bytes wide");

    if bytes.len() == 4 {
        return i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64;
    }

    let value = bytes.iter().fold(0i64, |acc, &b| acc * 256 + b as i64);
    if negative_hint {
        value - SIGN_EXTENSION.get(bytes.len()).copied().unwrap_or(0)
    } else {
        value
    }
}
