//! Parsing of the fixed layout `hdr.adf` record.

use std::path::Path;

use crate::{Error, Result, bytes, io};

pub const HEADER_SIZE: usize = 308;
/// Upper limit on the cells in a block, every tile buffer holds this many cells.
pub const MAX_BLOCK_PIXELS: i64 = 16 * 1024 * 1024;

const HEADER_SIGNATURE: &[u8] = b"GRID1.2";

const CELL_TYPE_OFFSET: usize = 16;
const COMPRESSION_OFFSET: usize = 20;
const CELL_SIZE_X_OFFSET: usize = 256;
const CELL_SIZE_Y_OFFSET: usize = 264;
const BLOCKS_PER_ROW_OFFSET: usize = 288;
const BLOCKS_PER_COLUMN_OFFSET: usize = 292;
const BLOCK_X_SIZE_OFFSET: usize = 296;
const BLOCK_Y_SIZE_OFFSET: usize = 304;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Integer,
    Float,
}

impl TryFrom<i32> for CellType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(CellType::Integer),
            2 => Ok(CellType::Float),
            _ => Err(Error::CorruptHeader(format!("Unsupported cell type {value}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridHeader {
    pub cell_type: CellType,
    /// Integer tiles carry a scheme tag when set, otherwise they are stored as raw 32 bit values
    pub compressed: bool,
    pub cell_size_x: f64,
    pub cell_size_y: f64,
    pub blocks_per_row: i32,
    pub blocks_per_column: i32,
    pub block_x_size: i32,
    pub block_y_size: i32,
}

impl GridHeader {
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_bytes(&io::read_case_insensitive(path)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::CorruptHeader(format!(
                "Grid header is {} bytes, expected at least {HEADER_SIZE}",
                data.len()
            )));
        }

        if !data.starts_with(HEADER_SIGNATURE) {
            log::debug!("Grid header does not start with the {} signature", String::from_utf8_lossy(HEADER_SIGNATURE));
        }

        let read_i32 = |offset| bytes::be_i32(data, offset).ok_or_else(|| Error::CorruptHeader("Grid header too short".into()));
        let read_f64 = |offset| bytes::be_f64(data, offset).ok_or_else(|| Error::CorruptHeader("Grid header too short".into()));

        let header = GridHeader {
            cell_type: CellType::try_from(read_i32(CELL_TYPE_OFFSET)?)?,
            // on disk a zero value marks a compressed grid
            compressed: read_i32(COMPRESSION_OFFSET)? == 0,
            cell_size_x: read_f64(CELL_SIZE_X_OFFSET)?,
            cell_size_y: read_f64(CELL_SIZE_Y_OFFSET)?,
            blocks_per_row: read_i32(BLOCKS_PER_ROW_OFFSET)?,
            blocks_per_column: read_i32(BLOCKS_PER_COLUMN_OFFSET)?,
            block_x_size: read_i32(BLOCK_X_SIZE_OFFSET)?,
            block_y_size: read_i32(BLOCK_Y_SIZE_OFFSET)?,
        };

        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.block_x_size <= 0 || self.block_y_size <= 0 {
            return Err(Error::CorruptHeader(format!(
                "Invalid block size {}x{}",
                self.block_x_size, self.block_y_size
            )));
        }

        if self.blocks_per_row <= 0 || self.blocks_per_column <= 0 {
            return Err(Error::CorruptHeader(format!(
                "Invalid block layout {}x{}",
                self.blocks_per_row, self.blocks_per_column
            )));
        }

        let block_pixels = self.block_x_size as i64 * self.block_y_size as i64;
        if block_pixels > MAX_BLOCK_PIXELS {
            return Err(Error::CorruptHeader(format!(
                "Block size {}x{} exceeds the maximum of {MAX_BLOCK_PIXELS} cells per block",
                self.block_x_size, self.block_y_size
            )));
        }

        if (self.blocks_per_row as i64) * (self.blocks_per_column as i64) > i32::MAX as i64 {
            return Err(Error::CorruptHeader("Block count overflows".into()));
        }

        Ok(())
    }

    /// Number of pixels in every block, the required length of a tile buffer.
    pub fn block_pixel_count(&self) -> usize {
        self.block_x_size as usize * self.block_y_size as usize
    }

    pub fn block_count(&self) -> usize {
        self.blocks_per_row as usize * self.blocks_per_column as usize
    }
}
