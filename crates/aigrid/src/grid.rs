use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    Bounds, CellType, Error, FLOAT_NO_DATA, GridHeader, NO_DATA, Result, Statistics, TileIndex,
    io::{self, ChunkReader},
    metadata::StatisticsAccumulator,
    tiledecoder::{self, DecodeError, MAX_TILE_SIZE},
};

const HEADER_FILE: &str = "hdr.adf";
const BOUNDS_FILE: &str = "dblbnd.adf";
const STATISTICS_FILE: &str = "sta.adf";
const PROJECTION_FILE: &str = "prj.adf";
const TILE_INDEX_FILE: &str = "w001001x.adf";
const TILE_DATA_FILE: &str = "w001001.adf";

/// Decoded cells of one tile, the variant follows the cell type of the grid.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

impl PixelBuffer {
    /// A buffer of `len` nodata cells
    pub fn new(cell_type: CellType, len: usize) -> Self {
        match cell_type {
            CellType::Integer => PixelBuffer::Int(vec![NO_DATA; len]),
            CellType::Float => PixelBuffer::Float(vec![FLOAT_NO_DATA; len]),
        }
    }

    pub fn cell_type(&self) -> CellType {
        match self {
            PixelBuffer::Int(_) => CellType::Integer,
            PixelBuffer::Float(_) => CellType::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::Int(data) => data.len(),
            PixelBuffer::Float(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fill_nodata(&mut self) {
        match self {
            PixelBuffer::Int(data) => data.fill(NO_DATA),
            PixelBuffer::Float(data) => data.fill(FLOAT_NO_DATA),
        }
    }

    pub fn as_int(&self) -> Option<&[i32]> {
        match self {
            PixelBuffer::Int(data) => Some(data),
            PixelBuffer::Float(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<&[f32]> {
        match self {
            PixelBuffer::Float(data) => Some(data),
            PixelBuffer::Int(_) => None,
        }
    }

    /// The cell value at `index`, `None` for nodata cells
    pub fn value(&self, index: usize) -> Option<f64> {
        match self {
            PixelBuffer::Int(data) => data.get(index).filter(|&&v| v != NO_DATA).map(|&v| v as f64),
            PixelBuffer::Float(data) => data.get(index).filter(|&&v| v != FLOAT_NO_DATA).map(|&v| v as f64),
        }
    }
}

/// Result of a tile decode that did not fail on I/O or caller errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Decoded,
    /// The tile has no stored data, the buffer holds nodata
    Empty,
    /// The stored tile is corrupt or uses an unsupported encoding, the buffer holds nodata
    Degraded(DecodeError),
}

impl DecodeOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, DecodeOutcome::Degraded(_))
    }
}

/// An opened grid: the metadata loaded at open time and the tile data source.
///
/// Tiles are decoded through positioned reads, so a handle can be shared between threads
/// as long as every thread decodes into its own [`PixelBuffer`].
pub struct GridHandle<R = File> {
    path: PathBuf,
    header: GridHeader,
    bounds: Bounds,
    statistics: Option<Statistics>,
    projection: Option<String>,
    index: TileIndex,
    reader: R,
    unsupported_run_reported: AtomicBool,
    corrupt_tile_reported: AtomicBool,
}

impl GridHandle<File> {
    /// Opens the grid in directory `path`. A path to one of the `.adf` files of the grid opens its directory.
    pub fn open(path: &Path) -> Result<Self> {
        let dir = if !path.is_dir() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("adf")) {
            path.parent().unwrap_or(Path::new("."))
        } else {
            path
        };

        let header = GridHeader::from_file(&dir.join(HEADER_FILE))?;
        let bounds = Bounds::from_file(&dir.join(BOUNDS_FILE))?;
        let statistics = match Statistics::from_file(&dir.join(STATISTICS_FILE)) {
            Ok(stats) => Some(stats),
            Err(Error::MetadataUnavailable(msg)) => {
                log::debug!("No statistics for grid {}: {msg}", dir.display());
                None
            }
            Err(e) => return Err(e),
        };

        let projection = match io::read_case_insensitive(&dir.join(PROJECTION_FILE)) {
            Ok(data) => Some(String::from_utf8_lossy(&data).trim().to_string()),
            Err(Error::FileNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let index = TileIndex::from_file(&dir.join(TILE_INDEX_FILE))?;
        let (reader, data_path) = io::open_case_insensitive(&dir.join(TILE_DATA_FILE))?;

        log::debug!(
            "Grid {}: {:?} cells, {}x{} blocks of {}x{}, tile data in {}",
            dir.display(),
            header.cell_type,
            header.blocks_per_row,
            header.blocks_per_column,
            header.block_x_size,
            header.block_y_size,
            data_path.display()
        );

        let mut grid = GridHandle::from_parts(header, bounds, statistics, index, reader)?;
        grid.path = dir.to_path_buf();
        grid.projection = projection;
        Ok(grid)
    }
}

impl<R: ChunkReader> GridHandle<R> {
    /// Assembles a grid from loaded metadata and a tile data source.
    pub fn from_parts(
        header: GridHeader,
        bounds: Bounds,
        statistics: Option<Statistics>,
        mut index: TileIndex,
        reader: R,
    ) -> Result<Self> {
        for (pixels, extent, cell_size) in [
            ((bounds.width() / header.cell_size_x).round(), bounds.width(), header.cell_size_x),
            ((bounds.height() / header.cell_size_y).round(), bounds.height(), header.cell_size_y),
        ] {
            if !pixels.is_finite() || pixels < 0.0 {
                return Err(Error::CorruptHeader(format!(
                    "Extent of {extent} with a cell size of {cell_size} does not give a valid raster size"
                )));
            }
        }

        if index.len() < header.block_count() {
            log::debug!(
                "Tile index holds {} entries for {} blocks, remaining blocks are empty",
                index.len(),
                header.block_count()
            );
        }
        index.truncate_to_block_count(header.block_count());

        Ok(GridHandle {
            path: PathBuf::new(),
            header,
            bounds,
            statistics,
            projection: None,
            index,
            reader,
            unsupported_run_reported: AtomicBool::new(false),
            corrupt_tile_reported: AtomicBool::new(false),
        })
    }

    /// The grid directory, empty for grids assembled with [`GridHandle::from_parts`]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn cell_type(&self) -> CellType {
        self.header.cell_type
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }

    /// Contents of `prj.adf`, when present
    pub fn projection(&self) -> Option<&str> {
        self.projection.as_deref()
    }

    pub fn tile_index(&self) -> &TileIndex {
        &self.index
    }

    pub fn pixels_x(&self) -> usize {
        (self.bounds.width() / self.header.cell_size_x).round() as usize
    }

    pub fn pixels_y(&self) -> usize {
        (self.bounds.height() / self.header.cell_size_y).round() as usize
    }

    /// Number of tiles in the block layout, tiles beyond the stored index are empty.
    pub fn tile_count(&self) -> usize {
        self.header.block_count()
    }

    pub fn tile_id(&self, block_col: usize, block_row: usize) -> Result<usize> {
        let blocks_per_row = self.header.blocks_per_row as usize;
        let blocks_per_column = self.header.blocks_per_column as usize;
        if block_col >= blocks_per_row || block_row >= blocks_per_column {
            return Err(Error::InvalidArgument(format!(
                "Block ({block_col}, {block_row}) outside of the {blocks_per_row}x{blocks_per_column} blocks of the grid"
            )));
        }

        Ok(block_col + block_row * blocks_per_row)
    }

    /// A nodata buffer that fits one tile of this grid
    pub fn new_tile_buffer(&self) -> PixelBuffer {
        PixelBuffer::new(self.header.cell_type, self.header.block_pixel_count())
    }

    /// Decodes tile `tile_id` into `buffer`, which must come from [`GridHandle::new_tile_buffer`] or match its layout.
    ///
    /// Corrupt tiles do not fail the decode: the buffer is filled with nodata and the reason is returned
    /// as [`DecodeOutcome::Degraded`]. Errors are reserved for read failures and invalid arguments.
    pub fn decode_tile(&self, tile_id: usize, buffer: &mut PixelBuffer) -> Result<DecodeOutcome> {
        if tile_id >= self.tile_count() {
            return Err(Error::InvalidArgument(format!(
                "Tile {tile_id} out of range, the grid has {} tiles",
                self.tile_count()
            )));
        }

        if buffer.cell_type() != self.header.cell_type || buffer.len() != self.header.block_pixel_count() {
            return Err(Error::InvalidArgument(format!(
                "Tile buffer of {} {:?} cells does not fit the {} {:?} cells of a tile",
                buffer.len(),
                buffer.cell_type(),
                self.header.block_pixel_count(),
                self.header.cell_type
            )));
        }

        let location = self.index.get(tile_id).unwrap_or_default();
        if location.is_empty() {
            buffer.fill_nodata();
            return Ok(DecodeOutcome::Empty);
        }

        if location.size > MAX_TILE_SIZE {
            let err = DecodeError::CorruptHeader(format!(
                "Tile length of {} bytes exceeds the maximum of {MAX_TILE_SIZE}",
                location.size
            ));
            return Ok(self.degrade(tile_id, buffer, err));
        }

        let range = location.range_to_fetch();
        let mut raw = vec![0u8; (range.end - range.start) as usize];
        self.reader.read_chunk(range.start, &mut raw)?;

        match tiledecoder::decode_tile_data(&raw, location.size, &self.header, buffer) {
            Ok(scheme) => {
                if let Some(scheme) = scheme {
                    log::trace!("Tile {tile_id}: {} bytes, {scheme:?}", location.size);
                }

                Ok(DecodeOutcome::Decoded)
            }
            Err(err) => Ok(self.degrade(tile_id, buffer, err)),
        }
    }

    /// Decodes the block at (`block_col`, `block_row`) into a new buffer.
    pub fn read_block(&self, block_col: usize, block_row: usize) -> Result<(PixelBuffer, DecodeOutcome)> {
        let tile_id = self.tile_id(block_col, block_row)?;
        let mut buffer = self.new_tile_buffer();
        let outcome = self.decode_tile(tile_id, &mut buffer)?;
        Ok((buffer, outcome))
    }

    /// Computes the statistics of all valid cells within the raster extent.
    /// Returns `None` when the grid holds no valid cells.
    pub fn compute_statistics(&self) -> Result<Option<Statistics>> {
        let block_x_size = self.header.block_x_size as usize;
        let block_y_size = self.header.block_y_size as usize;
        let pixels_x = self.pixels_x();
        let pixels_y = self.pixels_y();

        let mut accumulator = StatisticsAccumulator::default();
        let mut buffer = self.new_tile_buffer();
        for block_row in 0..self.header.blocks_per_column as usize {
            let y_offset = block_row * block_y_size;
            if y_offset >= pixels_y {
                break;
            }

            for block_col in 0..self.header.blocks_per_row as usize {
                let x_offset = block_col * block_x_size;
                if x_offset >= pixels_x {
                    break;
                }

                let tile_id = self.tile_id(block_col, block_row)?;
                if self.decode_tile(tile_id, &mut buffer)? == DecodeOutcome::Empty {
                    continue;
                }

                let rows = block_y_size.min(pixels_y - y_offset);
                let cols = block_x_size.min(pixels_x - x_offset);
                for row in 0..rows {
                    for col in 0..cols {
                        if let Some(value) = buffer.value(row * block_x_size + col) {
                            accumulator.add(value);
                        }
                    }
                }
            }
        }

        log::debug!("Computed statistics from {} valid cells", accumulator.count());
        Ok(accumulator.finish())
    }

    /// Releases the tile data source.
    pub fn close(self) {
        log::debug!("Closing grid {}", self.path.display());
    }

    fn degrade(&self, tile_id: usize, buffer: &mut PixelBuffer, err: DecodeError) -> DecodeOutcome {
        buffer.fill_nodata();

        match err {
            DecodeError::UnsupportedRun { .. } => {
                if !self.unsupported_run_reported.swap(true, Ordering::Relaxed) {
                    log::warn!(
                        "Tile {tile_id}: {err}, the tile is read as nodata. Further unsupported tiles are only logged at debug level"
                    );
                } else {
                    log::debug!("Tile {tile_id}: {err}, the tile is read as nodata");
                }
            }
            _ => {
                if !self.corrupt_tile_reported.swap(true, Ordering::Relaxed) {
                    log::warn!(
                        "Tile {tile_id}: {err}, the tile is read as nodata. Further corrupt tiles are only logged at debug level"
                    );
                } else {
                    log::debug!("Tile {tile_id}: {err}, the tile is read as nodata");
                }
            }
        }

        DecodeOutcome::Degraded(err)
    }
}
