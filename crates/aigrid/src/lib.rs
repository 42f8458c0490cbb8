#![warn(clippy::unwrap_used)]

//! Reader for Arc/Info binary grid datasets.
//!
//! A grid is a directory containing `hdr.adf` (layout), `dblbnd.adf` (extent), `sta.adf` (statistics),
//! `w001001x.adf` (tile index) and `w001001.adf` (tile data). [`GridHandle::open`] loads the metadata once,
//! after which any tile can be decoded independently with [`GridHandle::decode_tile`].

use std::path::PathBuf;

use thiserror::Error;

mod bytes;
pub mod ccitt;
mod grid;
pub mod header;
pub mod io;
pub mod metadata;
pub mod tiledecoder;
pub mod tileindex;

#[cfg(test)]
pub(crate) mod testutils;

pub use bytes::read_bias_value;
pub use grid::{DecodeOutcome, GridHandle, PixelBuffer};
pub use header::{CellType, GridHeader};
pub use metadata::{Bounds, Statistics};
pub use tiledecoder::{DecodeError, TileScheme};
pub use tileindex::{TileIndex, TileLocation};

/// Value assigned to integer cells without a valid measurement.
pub const NO_DATA: i32 = -2147483647;

/// Value assigned to floating point cells without a valid measurement.
pub const FLOAT_NO_DATA: f32 = -f32::MAX;

#[derive(Error, Debug)]
pub enum Error {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Tile index magic number is corrupt")]
    BadMagic,
    #[error("Tile index header was corrupted by a unix to dos text conversion")]
    LineEndingCorruption,
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),
    #[error("Corrupt header: {0}")]
    CorruptHeader(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type Result<T = ()> = std::result::Result<T, Error>;
