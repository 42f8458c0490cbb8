//! Writers for synthetic grid files used by the unit tests.

use std::path::Path;

use crate::{
    CellType,
    ccitt::{BLACK_MAKEUP, BLACK_TERMINATING, EXTENDED_MAKEUP, WHITE_MAKEUP, WHITE_TERMINATING},
    io::ChunkReader,
    tileindex::{INDEX_HEADER_SIZE, INDEX_MAGIC},
};

#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    pub cell_type: CellType,
    pub compressed: bool,
    pub cell_size: (f64, f64),
    pub blocks: (i32, i32),
    pub block_size: (i32, i32),
}

impl Default for HeaderBuilder {
    fn default() -> Self {
        HeaderBuilder {
            cell_type: CellType::Integer,
            compressed: true,
            cell_size: (1.0, 1.0),
            blocks: (1, 1),
            block_size: (4, 4),
        }
    }
}

impl HeaderBuilder {
    pub fn cell_type(mut self, cell_type: CellType) -> Self {
        self.cell_type = cell_type;
        self
    }

    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn cell_size(mut self, x: f64, y: f64) -> Self {
        self.cell_size = (x, y);
        self
    }

    pub fn blocks(mut self, per_row: i32, per_column: i32) -> Self {
        self.blocks = (per_row, per_column);
        self
    }

    pub fn block_size(mut self, width: i32, height: i32) -> Self {
        self.block_size = (width, height);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = vec![0u8; 308];
        data[..7].copy_from_slice(b"GRID1.2");

        let cell_type: i32 = match self.cell_type {
            CellType::Integer => 1,
            CellType::Float => 2,
        };
        data[16..20].copy_from_slice(&cell_type.to_be_bytes());
        data[20..24].copy_from_slice(&(if self.compressed { 0i32 } else { 1 }).to_be_bytes());
        data[256..264].copy_from_slice(&self.cell_size.0.to_be_bytes());
        data[264..272].copy_from_slice(&self.cell_size.1.to_be_bytes());
        data[288..292].copy_from_slice(&self.blocks.0.to_be_bytes());
        data[292..296].copy_from_slice(&self.blocks.1.to_be_bytes());
        data[296..300].copy_from_slice(&self.block_size.0.to_be_bytes());
        data[304..308].copy_from_slice(&self.block_size.1.to_be_bytes());
        data
    }
}

/// Four big-endian doubles, the layout of the bounds and statistics files
pub fn f64_record(values: [f64; 4]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Tile index file with the given `(offset, length)` entries, both in 16 bit words.
pub fn index_file_bytes(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut data = vec![0u8; INDEX_HEADER_SIZE];
    data[..6].copy_from_slice(&INDEX_MAGIC);
    for (offset, length) in entries {
        data.extend_from_slice(&offset.to_be_bytes());
        data.extend_from_slice(&length.to_be_bytes());
    }

    let words = (data.len() / 2) as u32;
    data[24..28].copy_from_slice(&words.to_be_bytes());
    data
}

#[derive(Default)]
struct BitWriter {
    data: Vec<u8>,
    bit_pos: usize,
}

impl BitWriter {
    fn write_code(&mut self, code: &str) {
        for bit in code.bytes() {
            if self.bit_pos % 8 == 0 {
                self.data.push(0);
            }

            if bit == b'1' {
                let last = self.data.len() - 1;
                self.data[last] |= 0x80 >> (self.bit_pos % 8);
            }

            self.bit_pos += 1;
        }
    }

    fn align_to_byte(&mut self) {
        self.bit_pos = self.bit_pos.div_ceil(8) * 8;
    }
}

fn write_run(writer: &mut BitWriter, mut run: usize, black: bool) {
    let (terminating, makeup) = if black {
        (&BLACK_TERMINATING, &BLACK_MAKEUP)
    } else {
        (&WHITE_TERMINATING, &WHITE_MAKEUP)
    };

    while run >= 2560 {
        writer.write_code(EXTENDED_MAKEUP[EXTENDED_MAKEUP.len() - 1]);
        run -= 2560;
    }

    if run >= 64 {
        let step = run / 64;
        let code = if step <= makeup.len() {
            makeup[step - 1]
        } else {
            EXTENDED_MAKEUP[step - makeup.len() - 1]
        };

        writer.write_code(code);
        run -= step * 64;
    }

    writer.write_code(terminating[run]);
}

/// CCITT modified Huffman encoding of a bitmap, `true` cells are black.
pub fn encode_ccitt_rle(cells: &[bool], width: usize, height: usize) -> Vec<u8> {
    assert_eq!(cells.len(), width * height);

    let mut writer = BitWriter::default();
    for row in cells.chunks(width).take(height) {
        let mut black = false;
        let mut run = 0;
        for &cell in row {
            if cell == black {
                run += 1;
            } else {
                write_run(&mut writer, run, black);
                black = cell;
                run = 1;
            }
        }

        write_run(&mut writer, run, black);
        writer.align_to_byte();
    }

    writer.data
}

/// Prefixes tile bytes with the 16 bit word count, padding them to a whole number of words.
pub fn with_size_prefix(body: &[u8]) -> Vec<u8> {
    let mut padded = body.to_vec();
    if padded.len() % 2 != 0 {
        padded.push(0);
    }

    let mut raw = ((padded.len() / 2) as u16).to_be_bytes().to_vec();
    raw.extend_from_slice(&padded);
    raw
}

/// Encoder for compressed integer tiles.
pub struct TileBuilder {
    tag: u8,
    bias: i32,
    min_size: Option<usize>,
    payload: Vec<u8>,
}

impl TileBuilder {
    pub fn new(tag: u8) -> Self {
        TileBuilder {
            tag,
            bias: 0,
            min_size: None,
            payload: Vec::new(),
        }
    }

    pub fn bias(mut self, bias: i32) -> Self {
        self.bias = bias;
        self
    }

    /// Forces the width of the stored minimum, by default the smallest width that holds the bias is used
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.min_size = Some(min_size);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    fn smallest_min_size(&self) -> usize {
        if self.bias == 0 {
            return 0;
        }

        (1..4)
            .find(|&width| {
                let limit = 1i64 << (width * 8 - 1);
                (-limit..limit).contains(&(self.bias as i64))
            })
            .unwrap_or(4)
    }

    /// The tile bytes following the size prefix
    pub fn build_body(&self) -> Vec<u8> {
        let min_size = self.min_size.unwrap_or_else(|| self.smallest_min_size());
        let mut body = vec![self.tag, min_size as u8];
        body.extend_from_slice(&self.bias.to_be_bytes()[4 - min_size..]);
        body.extend_from_slice(&self.payload);
        body
    }

    /// The stored tile including its size prefix
    pub fn build(&self) -> Vec<u8> {
        with_size_prefix(&self.build_body())
    }
}

/// Writes the files of a grid directory.
pub struct GridWriter {
    pub header: HeaderBuilder,
    pub bounds: [f64; 4],
    pub statistics: Option<[f64; 4]>,
    pub projection: Option<String>,
    /// Stored tiles including the size prefix, `None` for tiles without data
    pub tiles: Vec<Option<Vec<u8>>>,
    pub upper_case_names: bool,
}

impl GridWriter {
    pub fn new(header: HeaderBuilder) -> Self {
        let width = (header.blocks.0 * header.block_size.0) as f64 * header.cell_size.0;
        let height = (header.blocks.1 * header.block_size.1) as f64 * header.cell_size.1;

        GridWriter {
            header,
            bounds: [1000.0, 2000.0, 1000.0 + width, 2000.0 + height],
            statistics: None,
            projection: None,
            tiles: Vec::new(),
            upper_case_names: false,
        }
    }

    pub fn tile(mut self, tile: Option<Vec<u8>>) -> Self {
        self.tiles.push(tile);
        self
    }

    pub fn statistics(mut self, statistics: [f64; 4]) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn projection(mut self, projection: &str) -> Self {
        self.projection = Some(projection.to_string());
        self
    }

    pub fn upper_case_names(mut self) -> Self {
        self.upper_case_names = true;
        self
    }

    /// Tile data file contents and the matching tile index file
    pub fn tile_files(&self) -> (Vec<u8>, Vec<u8>) {
        let mut data = vec![0u8; INDEX_HEADER_SIZE];
        data[..6].copy_from_slice(&INDEX_MAGIC);

        let mut entries = Vec::with_capacity(self.tiles.len());
        for tile in &self.tiles {
            match tile {
                Some(raw) => {
                    entries.push(((data.len() / 2) as u32, ((raw.len() - 2) / 2) as u32));
                    data.extend_from_slice(raw);
                }
                None => entries.push((0, 0)),
            }
        }

        let words = (data.len() / 2) as u32;
        data[24..28].copy_from_slice(&words.to_be_bytes());
        (data, index_file_bytes(&entries))
    }

    pub fn write(&self, dir: &Path) -> std::io::Result<()> {
        let name = |name: &str| {
            if self.upper_case_names {
                dir.join(name.to_uppercase())
            } else {
                dir.join(name)
            }
        };

        let (data, index) = self.tile_files();
        std::fs::write(name("hdr.adf"), self.header.build())?;
        std::fs::write(name("dblbnd.adf"), f64_record(self.bounds))?;
        std::fs::write(name("w001001.adf"), data)?;
        std::fs::write(name("w001001x.adf"), index)?;

        if let Some(statistics) = self.statistics {
            std::fs::write(name("sta.adf"), f64_record(statistics))?;
        }

        if let Some(projection) = &self.projection {
            std::fs::write(name("prj.adf"), projection)?;
        }

        Ok(())
    }
}

/// Byte source that fails every read
pub struct FailingReader;

impl ChunkReader for FailingReader {
    fn read_chunk(&self, offset: u64, _buf: &mut [u8]) -> std::io::Result<()> {
        Err(std::io::Error::other(format!("Unexpected read at offset {offset}")))
    }
}
