//! The `w001001x.adf` tile index: byte location of every tile in the tile data file.

use std::{ops::Range, path::Path};

use crate::{Error, Result, bytes, io};

pub const INDEX_MAGIC: [u8; 6] = [0x00, 0x00, 0x27, 0x0A, 0xFF, 0xFF];
pub const INDEX_HEADER_SIZE: usize = 100;

const LENGTH_OFFSET: usize = 24;
const ENTRY_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq)]
pub struct TileLocation {
    /// Byte offset of the tile in the tile data file
    pub offset: u64,
    /// Byte length of the tile, excluding the 2 byte size prefix
    pub size: u64,
}

impl TileLocation {
    /// A tile without stored data, all of its cells are nodata
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The bytes to read for this tile, the size prefix followed by the tile data.
    pub fn range_to_fetch(&self) -> Range<u64> {
        if self.size == 0 {
            return Range { start: 0, end: 0 };
        }

        Range {
            start: self.offset,
            end: self.offset + self.size + 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TileIndex {
    locations: Vec<TileLocation>,
    trailing_bytes: usize,
}

impl TileIndex {
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_bytes(&io::read_case_insensitive(path)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::CorruptHeader(format!("Tile index is only {} bytes", data.len())));
        }

        if data[3] == b'\r' && data[4] == b'\n' {
            return Err(Error::LineEndingCorruption);
        }

        if data[0..6] != INDEX_MAGIC {
            return Err(Error::BadMagic);
        }

        let length_words = bytes::be_u32(data, LENGTH_OFFSET)
            .ok_or_else(|| Error::CorruptHeader("Tile index is too short to hold its length field".into()))?;
        let byte_length = length_words as usize * 2;
        if byte_length < INDEX_HEADER_SIZE {
            return Err(Error::CorruptHeader(format!("Invalid tile index length of {byte_length} bytes")));
        }

        let tile_count = (byte_length - INDEX_HEADER_SIZE) / ENTRY_SIZE;
        let trailing_bytes = (byte_length - INDEX_HEADER_SIZE) % ENTRY_SIZE;
        if trailing_bytes != 0 {
            log::warn!("Tile index length of {byte_length} bytes leaves {trailing_bytes} bytes after the last complete entry");
        }

        // The length field is untrusted, only allocate for entries that are actually present
        let available = data.len().saturating_sub(INDEX_HEADER_SIZE) / ENTRY_SIZE;
        if tile_count > available {
            return Err(Error::CorruptHeader(format!(
                "Tile index claims {tile_count} tiles but only contains {available}"
            )));
        }

        let locations = data[INDEX_HEADER_SIZE..INDEX_HEADER_SIZE + tile_count * ENTRY_SIZE]
            .chunks_exact(ENTRY_SIZE)
            .map(|entry| TileLocation {
                offset: u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]) as u64 * 2,
                size: u32::from_be_bytes([entry[4], entry[5], entry[6], entry[7]]) as u64 * 2,
            })
            .collect();

        Ok(TileIndex { locations, trailing_bytes })
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn get(&self, tile_id: usize) -> Option<TileLocation> {
        self.locations.get(tile_id).copied()
    }

    pub fn locations(&self) -> &[TileLocation] {
        &self.locations
    }

    /// Bytes covered by the length field that do not form a complete index entry.
    pub fn trailing_bytes(&self) -> usize {
        self.trailing_bytes
    }

    /// Drops the entries beyond `block_count`.
    /// A shorter index is left as is, the blocks it does not cover were never written.
    pub(crate) fn truncate_to_block_count(&mut self, block_count: usize) {
        if self.locations.len() > block_count {
            log::warn!(
                "Tile index holds {} entries for {block_count} blocks, ignoring the surplus entries",
                self.locations.len()
            );
            self.locations.truncate(block_count);
        }
    }
}
