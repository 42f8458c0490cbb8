//! Decoding of a single stored tile.
//!
//! A stored tile starts with a big-endian u16 holding the tile length in 16 bit words, which must match
//! the length recorded in the tile index. Float tiles follow with raw big-endian f32 values.
//! Compressed integer tiles follow with a small header:
//!
//! | offset (after the size prefix) | content |
//! |---|---|
//! | 0 | scheme tag |
//! | 1 | `min_size`, byte width of the tile minimum (0-4) |
//! | 2 | tile minimum (bias), `min_size` bytes big-endian |
//! | 2 + `min_size` | scheme payload |
//!
//! Every decoded value is offset by the bias, except for the no-data runs of the run length schemes.

use thiserror::Error;

use crate::{CellType, GridHeader, NO_DATA, PixelBuffer, bytes, ccitt};

/// Largest tile length that the 16 bit word count of the size prefix can describe
pub const MAX_TILE_SIZE: u64 = u16::MAX as u64 * 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Tile size mismatch: the tile stores a length of {stored} bytes, the index expects {expected}")]
    SizeMismatch { stored: u64, expected: u64 },
    #[error("Tile data ends before all {cells} cells are decoded")]
    TruncatedTile { cells: usize },
    #[error("Run of {run} cells at cell {position} exceeds the {capacity} cells of the tile")]
    RunOverflow { run: usize, position: usize, capacity: usize },
    #[error("Unsupported run marker 0x{marker:02X} in tile of type 0x{tag:02X}")]
    UnsupportedRun { tag: u8, marker: u8 },
    #[error("Corrupt tile header: {0}")]
    CorruptHeader(String),
    #[error("Bitmap tile: {0}")]
    Bitmap(#[from] ccitt::CcittError),
}

pub type Result<T = ()> = std::result::Result<T, DecodeError>;

/// Encoding of a compressed integer tile, selected by the scheme tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileScheme {
    /// 0x00: every cell is the bias
    Constant,
    /// 0x01: one bit per cell, most significant bit first
    Raw1Bit,
    /// 0x04: one nibble per cell, high nibble first
    Raw4Bit,
    /// 0x08: one byte per cell
    Raw8Bit,
    /// 0x10: big-endian u16 per cell
    Raw16Bit,
    /// 0x20: big-endian 32 bit value per cell
    Raw32Bit,
    /// 0xFF: CCITT run length coded bitmap, set bits map to the bias, clear bits to bias + 1
    Bitmap,
    /// 0xE0: runs of a big-endian 32 bit value
    Repeat32Bit,
    /// 0xF0: runs of a big-endian u16 value
    Repeat16Bit,
    /// 0xFC and 0xF8: runs of a byte value
    Repeat8Bit(u8),
    /// 0xDF: runs of the bias
    RepeatMinimum,
    /// 0xD7: literal byte values
    Literal8Bit,
    /// 0xCF: literal big-endian u16 values
    Literal16Bit,
    /// Any other tag: only the no-data runs are understood
    NoDataRuns(u8),
}

impl From<u8> for TileScheme {
    fn from(tag: u8) -> Self {
        match tag {
            0x00 => TileScheme::Constant,
            0x01 => TileScheme::Raw1Bit,
            0x04 => TileScheme::Raw4Bit,
            0x08 => TileScheme::Raw8Bit,
            0x10 => TileScheme::Raw16Bit,
            0x20 => TileScheme::Raw32Bit,
            0xFF => TileScheme::Bitmap,
            0xE0 => TileScheme::Repeat32Bit,
            0xF0 => TileScheme::Repeat16Bit,
            0xFC | 0xF8 => TileScheme::Repeat8Bit(tag),
            0xDF => TileScheme::RepeatMinimum,
            0xD7 => TileScheme::Literal8Bit,
            0xCF => TileScheme::Literal16Bit,
            _ => TileScheme::NoDataRuns(tag),
        }
    }
}

impl TileScheme {
    pub fn tag(&self) -> u8 {
        match self {
            TileScheme::Constant => 0x00,
            TileScheme::Raw1Bit => 0x01,
            TileScheme::Raw4Bit => 0x04,
            TileScheme::Raw8Bit => 0x08,
            TileScheme::Raw16Bit => 0x10,
            TileScheme::Raw32Bit => 0x20,
            TileScheme::Bitmap => 0xFF,
            TileScheme::Repeat32Bit => 0xE0,
            TileScheme::Repeat16Bit => 0xF0,
            TileScheme::Repeat8Bit(tag) | TileScheme::NoDataRuns(tag) => *tag,
            TileScheme::RepeatMinimum => 0xDF,
            TileScheme::Literal8Bit => 0xD7,
            TileScheme::Literal16Bit => 0xCF,
        }
    }
}

/// The header of a compressed integer tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileHeader {
    pub scheme: TileScheme,
    pub min_size: usize,
    pub bias: i32,
}

impl TileHeader {
    /// Parses the header from the tile bytes following the size prefix.
    /// Returns the header and the remaining scheme payload.
    pub fn parse(data: &[u8]) -> Result<(TileHeader, &[u8])> {
        if data.len() < 2 {
            return Err(DecodeError::CorruptHeader(format!(
                "Need 2 bytes for the tile type and minimum size, only {} available",
                data.len()
            )));
        }

        let scheme = TileScheme::from(data[0]);
        let min_size = data[1] as usize;
        if min_size > 4 {
            return Err(DecodeError::CorruptHeader(format!("Invalid minimum size of {min_size} bytes")));
        }

        let min_bytes = data
            .get(2..2 + min_size)
            .ok_or_else(|| DecodeError::CorruptHeader(format!("Need {min_size} bytes for the tile minimum")))?;

        // The sign of a 1 to 3 byte minimum is taken from the byte that follows the (tag, min_size) pair,
        // at a fixed position rather than from the field. Archives depend on this byte.
        let negative_hint = min_size != 0 && data[2] > 127;
        let bias = bytes::read_bias_value(min_bytes, negative_hint) as i32;

        Ok((TileHeader { scheme, min_size, bias }, &data[2 + min_size..]))
    }
}

/// Verifies the 2 byte size prefix of a stored tile against the length from the tile index.
/// `raw` holds the prefix followed by the tile bytes, the tile bytes are returned.
pub fn verify_size_prefix(raw: &[u8], expected: u64) -> Result<&[u8]> {
    let stored = bytes::be_u16(raw, 0).map_or(0, |words| words as u64 * 2);
    if stored != expected {
        return Err(DecodeError::SizeMismatch { stored, expected });
    }

    let end = (expected as usize + 2).min(raw.len());
    Ok(raw.get(2..end).unwrap_or_default())
}

/// Decodes a stored tile held in memory: `raw` holds the size prefix followed by the tile bytes,
/// `expected_size` is the tile length from the tile index.
/// Returns the scheme for compressed integer tiles.
pub fn decode_tile_data(
    raw: &[u8],
    expected_size: u64,
    header: &GridHeader,
    buffer: &mut PixelBuffer,
) -> Result<Option<TileScheme>> {
    let data = verify_size_prefix(raw, expected_size)?;
    if buffer.len() != header.block_pixel_count() {
        return Err(DecodeError::CorruptHeader(format!(
            "Tile buffer holds {} cells, the grid blocks have {}",
            buffer.len(),
            header.block_pixel_count()
        )));
    }

    match (header.cell_type, buffer) {
        (CellType::Float, PixelBuffer::Float(out)) => decode_float_tile(data, out).map(|_| None),
        (CellType::Integer, PixelBuffer::Int(out)) if header.compressed => {
            decode_int_tile(data, header.block_x_size as usize, header.block_y_size as usize, out).map(Some)
        }
        (CellType::Integer, PixelBuffer::Int(out)) => decode_uncompressed_int_tile(data, out).map(|_| None),
        (cell_type, _) => Err(DecodeError::CorruptHeader(format!(
            "Tile buffer does not match the {cell_type:?} cells of the grid"
        ))),
    }
}

/// Decodes the tile bytes of a float grid, raw big-endian f32 values.
pub fn decode_float_tile(data: &[u8], out: &mut [f32]) -> Result {
    if data.len() < out.len() * 4 {
        return Err(DecodeError::TruncatedTile { cells: out.len() });
    }

    for (value, chunk) in out.iter_mut().zip(data.chunks_exact(4)) {
        *value = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    Ok(())
}

/// Decodes the tile bytes of an uncompressed integer grid, raw big-endian 32 bit values without a header.
pub fn decode_uncompressed_int_tile(data: &[u8], out: &mut [i32]) -> Result {
    decode_raw_32bit(data, 0, out)
}

/// Decodes the tile bytes of a compressed integer grid, `out` holds the `block_x_size` * `block_y_size` cells.
/// Returns the scheme the tile was stored with.
pub fn decode_int_tile(data: &[u8], block_x_size: usize, block_y_size: usize, out: &mut [i32]) -> Result<TileScheme> {
    debug_assert_eq!(out.len(), block_x_size * block_y_size);

    let (header, payload) = TileHeader::parse(data)?;
    let bias = header.bias;

    match header.scheme {
        TileScheme::Constant => decode_constant(bias, out),
        TileScheme::Raw1Bit => decode_raw_1bit(payload, bias, out)?,
        TileScheme::Raw4Bit => decode_raw_4bit(payload, bias, out)?,
        TileScheme::Raw8Bit => decode_raw_8bit(payload, bias, out)?,
        TileScheme::Raw16Bit => decode_raw_16bit(payload, bias, out)?,
        TileScheme::Raw32Bit => decode_raw_32bit(payload, bias, out)?,
        TileScheme::Bitmap => decode_bitmap(payload, bias, block_x_size, block_y_size, out)?,
        scheme @ (TileScheme::Repeat32Bit
        | TileScheme::Repeat16Bit
        | TileScheme::Repeat8Bit(_)
        | TileScheme::RepeatMinimum
        | TileScheme::Literal8Bit
        | TileScheme::Literal16Bit
        | TileScheme::NoDataRuns(_)) => decode_runs(scheme, payload, bias, out)?,
    }

    Ok(header.scheme)
}

fn check_payload(data: &[u8], required: usize, cells: usize) -> Result {
    if data.len() < required {
        return Err(DecodeError::TruncatedTile { cells });
    }

    Ok(())
}

fn decode_constant(bias: i32, out: &mut [i32]) {
    out.fill(bias);
}

fn decode_raw_1bit(data: &[u8], bias: i32, out: &mut [i32]) -> Result {
    check_payload(data, out.len().div_ceil(8), out.len())?;

    for (i, value) in out.iter_mut().enumerate() {
        let bit = (data[i >> 3] >> (7 - (i & 7))) & 1;
        *value = bias.wrapping_add(bit as i32);
    }

    Ok(())
}

fn decode_raw_4bit(data: &[u8], bias: i32, out: &mut [i32]) -> Result {
    check_payload(data, out.len().div_ceil(2), out.len())?;

    for (i, value) in out.iter_mut().enumerate() {
        let byte = data[i >> 1];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        *value = bias.wrapping_add(nibble as i32);
    }

    Ok(())
}

fn decode_raw_8bit(data: &[u8], bias: i32, out: &mut [i32]) -> Result {
    check_payload(data, out.len(), out.len())?;

    for (value, &byte) in out.iter_mut().zip(data) {
        *value = bias.wrapping_add(byte as i32);
    }

    Ok(())
}

fn decode_raw_16bit(data: &[u8], bias: i32, out: &mut [i32]) -> Result {
    check_payload(data, out.len() * 2, out.len())?;

    for (value, chunk) in out.iter_mut().zip(data.chunks_exact(2)) {
        *value = bias.wrapping_add(u16::from_be_bytes([chunk[0], chunk[1]]) as i32);
    }

    Ok(())
}

fn decode_raw_32bit(data: &[u8], bias: i32, out: &mut [i32]) -> Result {
    check_payload(data, out.len() * 4, out.len())?;

    for (value, chunk) in out.iter_mut().zip(data.chunks_exact(4)) {
        *value = bias.wrapping_add(i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(())
}

fn decode_bitmap(data: &[u8], bias: i32, block_x_size: usize, block_y_size: usize, out: &mut [i32]) -> Result {
    let bitmap = ccitt::decompress_rle(data, block_x_size, block_y_size)?;

    for (value, black) in out.iter_mut().zip(bitmap.cells()) {
        *value = if black { bias } else { bias.wrapping_add(1) };
    }

    Ok(())
}

/// Reserves room for a run, the run must fit in the remaining cells before anything is written.
fn check_run(run: usize, position: usize, capacity: usize) -> Result {
    if run + position > capacity {
        return Err(DecodeError::RunOverflow { run, position, capacity });
    }

    Ok(())
}

fn read_run_value(data: &[u8], pos: &mut usize, value_bytes: usize, cells: usize) -> Result<i32> {
    let value = match value_bytes {
        4 => bytes::be_i32(data, *pos),
        2 => bytes::be_u16(data, *pos).map(|v| v as i32),
        _ => data.get(*pos).map(|&v| v as i32),
    }
    .ok_or(DecodeError::TruncatedTile { cells })?;

    *pos += value_bytes;
    Ok(value)
}

/// Decodes the run length schemes. Every run starts with a marker byte, its meaning depends on the scheme.
fn decode_runs(scheme: TileScheme, data: &[u8], bias: i32, out: &mut [i32]) -> Result {
    let capacity = out.len();
    let mut pos = 0;
    let mut written = 0;

    while written < capacity && pos < data.len() {
        let marker = data[pos];
        pos += 1;
        let run = marker as usize;

        match scheme {
            TileScheme::Repeat32Bit | TileScheme::Repeat16Bit | TileScheme::Repeat8Bit(_) => {
                check_run(run, written, capacity)?;
                let value_bytes = match scheme {
                    TileScheme::Repeat32Bit => 4,
                    TileScheme::Repeat16Bit => 2,
                    _ => 1,
                };

                let value = read_run_value(data, &mut pos, value_bytes, capacity)?;
                out[written..written + run].fill(value.wrapping_add(bias));
                written += run;
            }
            TileScheme::RepeatMinimum if marker < 128 => {
                check_run(run, written, capacity)?;
                out[written..written + run].fill(bias);
                written += run;
            }
            TileScheme::Literal8Bit if marker < 128 => {
                check_run(run, written, capacity)?;
                // bounded by the payload, a short final run ends up as a truncated tile
                let available = run.min(data.len() - pos);
                for (value, &byte) in out[written..written + available].iter_mut().zip(&data[pos..pos + available]) {
                    *value = bias.wrapping_add(byte as i32);
                }

                pos += available;
                written += available;
            }
            TileScheme::Literal16Bit if marker < 128 => {
                check_run(run, written, capacity)?;
                check_payload(&data[pos..], run * 2, capacity)?;
                for (value, chunk) in out[written..written + run].iter_mut().zip(data[pos..pos + run * 2].chunks_exact(2)) {
                    *value = bias.wrapping_add(u16::from_be_bytes([chunk[0], chunk[1]]) as i32);
                }

                pos += run * 2;
                written += run;
            }
            _ if marker > 128 => {
                // no-data runs ignore the bias
                let run = 256 - run;
                check_run(run, written, capacity)?;
                out[written..written + run].fill(NO_DATA);
                written += run;
            }
            _ => {
                return Err(DecodeError::UnsupportedRun {
                    tag: scheme.tag(),
                    marker,
                });
            }
        }
    }

    if written < capacity {
        return Err(DecodeError::TruncatedTile { cells: capacity });
    }

    Ok(())
}
