//! CCITT modified Huffman run length decoding (the one dimensional coding of T.4, TIFF compression 2).
//!
//! Rows are coded as alternating white and black runs starting with white, every run is zero or more
//! makeup codes followed by one terminating code. Each coded row starts on a byte boundary.
//! The decoded bitmap stores black cells as set bits, rows are padded to whole bytes.

use std::sync::LazyLock;

use thiserror::Error;

const MAX_CODE_LENGTH: usize = 13;
const NO_CODE: u16 = u16::MAX;

/// Terminating codes, indexed by run length (0-63)
pub(crate) const WHITE_TERMINATING: [&str; 64] = [
    "00110101", "000111", "0111", "1000", "1011", "1100", "1110", "1111", // 0-7
    "10011", "10100", "00111", "01000", "001000", "000011", "110100", "110101", // 8-15
    "101010", "101011", "0100111", "0001100", "0001000", "0010111", "0000011", "0000100", // 16-23
    "0101000", "0101011", "0010011", "0100100", "0011000", "00000010", "00000011", "00011010", // 24-31
    "00011011", "00010010", "00010011", "00010100", "00010101", "00010110", "00010111", "00101000", // 32-39
    "00101001", "00101010", "00101011", "00101100", "00101101", "00000100", "00000101", "00001010", // 40-47
    "00001011", "01010010", "01010011", "01010100", "01010101", "00100100", "00100101", "01011000", // 48-55
    "01011001", "01011010", "01011011", "01001010", "01001011", "00110010", "00110011", "00110100", // 56-63
];

/// Makeup codes for run lengths 64 to 1728 in steps of 64
pub(crate) const WHITE_MAKEUP: [&str; 27] = [
    "11011", "10010", "010111", "0110111", "00110110", "00110111", "01100100", "01100101", // 64-512
    "01101000", "01100111", "011001100", "011001101", "011010010", "011010011", "011010100", "011010101", // 576-1024
    "011010110", "011010111", "011011000", "011011001", "011011010", "011011011", "010011000", "010011001", // 1088-1536
    "010011010", "011000", "010011011", // 1600-1728
];

pub(crate) const BLACK_TERMINATING: [&str; 64] = [
    "0000110111", "010", "11", "10", "011", "0011", "0010", "00011", // 0-7
    "000101", "000100", "0000100", "0000101", "0000111", "00000100", "00000111", "000011000", // 8-15
    "0000010111", "0000011000", "0000001000", "00001100111", "00001101000", "00001101100", "00000110111", "00000101000", // 16-23
    "00000010111", "00000011000", "000011001010", "000011001011", "000011001100", "000011001101", "000001101000", "000001101001", // 24-31
    "000001101010", "000001101011", "000011010010", "000011010011", "000011010100", "000011010101", "000011010110", "000011010111", // 32-39
    "000001101100", "000001101101", "000011011010", "000011011011", "000001010100", "000001010101", "000001010110", "000001010111", // 40-47
    "000001100100", "000001100101", "000001010010", "000001010011", "000000100100", "000000110111", "000000111000", "000000100111", // 48-55
    "000000101000", "000001011000", "000001011001", "000000101011", "000000101100", "000001011010", "000001100110", "000001100111", // 56-63
];

pub(crate) const BLACK_MAKEUP: [&str; 27] = [
    "0000001111", "000011001000", "000011001001", "000001011011", "000000110011", "000000110100", "000000110101", "0000001101100", // 64-512
    "0000001101101", "0000001001010", "0000001001011", "0000001001100", "0000001001101", "0000001110010", "0000001110011", "0000001110100", // 576-1024
    "0000001110101", "0000001110110", "0000001110111", "0000001010010", "0000001010011", "0000001010100", "0000001010101", "0000001011010", // 1088-1536
    "0000001011011", "0000001100100", "0000001100101", // 1600-1728
];

/// Makeup codes for run lengths 1792 to 2560 in steps of 64, shared by both colors
pub(crate) const EXTENDED_MAKEUP: [&str; 13] = [
    "00000001000", "00000001100", "00000001101", "000000010010", "000000010011", "000000010100", "000000010101", // 1792-2176
    "000000010110", "000000010111", "000000011100", "000000011101", "000000011110", "000000011111", // 2240-2560
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CcittError {
    #[error("Invalid run length code in row {row}")]
    InvalidCode { row: usize },
    #[error("Runs exceed the row width of {width} in row {row}")]
    RowOverrun { row: usize, width: usize },
    #[error("Compressed data ends in row {row}")]
    UnexpectedEof { row: usize },
}

/// Run length lookup keyed on a code prefixed with a marker bit, which keeps codes of different
/// lengths apart: `1 << len | code`.
struct CodeTable {
    runs: Vec<u16>,
}

impl CodeTable {
    fn new(terminating: &[&str], makeup: &[&str]) -> Self {
        let mut runs = vec![NO_CODE; 1 << (MAX_CODE_LENGTH + 1)];
        let mut insert = |code: &str, run: usize| {
            let key = code.bytes().fold(1usize, |acc, b| (acc << 1) | (b == b'1') as usize);
            runs[key] = run as u16;
        };

        for (run, code) in terminating.iter().enumerate() {
            insert(code, run);
        }

        for (i, code) in makeup.iter().chain(EXTENDED_MAKEUP.iter()).enumerate() {
            insert(code, (i + 1) * 64);
        }

        CodeTable { runs }
    }

    fn lookup(&self, key: usize) -> Option<usize> {
        match self.runs.get(key) {
            Some(&run) if run != NO_CODE => Some(run as usize),
            _ => None,
        }
    }
}

static WHITE_CODES: LazyLock<CodeTable> = LazyLock::new(|| CodeTable::new(&WHITE_TERMINATING, &WHITE_MAKEUP));
static BLACK_CODES: LazyLock<CodeTable> = LazyLock::new(|| CodeTable::new(&BLACK_TERMINATING, &BLACK_MAKEUP));

struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, bit_pos: 0 }
    }

    #[inline]
    fn read_bit(&mut self) -> Option<usize> {
        let byte = *self.data.get(self.bit_pos >> 3)?;
        let bit = (byte >> (7 - (self.bit_pos & 7))) & 1;
        self.bit_pos += 1;
        Some(bit as usize)
    }

    fn align_to_byte(&mut self) {
        self.bit_pos = self.bit_pos.div_ceil(8) * 8;
    }
}

/// Bitonal raster, set bits are black cells. Rows start on a byte boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: usize, height: usize) -> Self {
        Bitmap {
            width,
            height,
            data: vec![0; width.div_ceil(8) * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row_bytes(&self) -> usize {
        self.width.div_ceil(8)
    }

    pub fn row(&self, row: usize) -> &[u8] {
        let row_bytes = self.row_bytes();
        &self.data[row * row_bytes..(row + 1) * row_bytes]
    }

    pub fn is_set(&self, col: usize, row: usize) -> bool {
        self.row(row)[col >> 3] & (0x80 >> (col & 7)) != 0
    }

    /// Iterates the cells in row major order
    pub fn cells(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.height).flat_map(move |row| (0..self.width).map(move |col| self.is_set(col, row)))
    }

    fn set_run(&mut self, row: usize, start: usize, len: usize) {
        let offset = row * self.row_bytes();
        for col in start..start + len {
            self.data[offset + (col >> 3)] |= 0x80 >> (col & 7);
        }
    }
}

fn decode_code(reader: &mut BitReader, table: &CodeTable, row: usize) -> Result<usize, CcittError> {
    let mut key = 1usize;
    for _ in 0..MAX_CODE_LENGTH {
        key = (key << 1) | reader.read_bit().ok_or(CcittError::UnexpectedEof { row })?;
        if let Some(run) = table.lookup(key) {
            return Ok(run);
        }
    }

    Err(CcittError::InvalidCode { row })
}

fn decode_run(reader: &mut BitReader, table: &CodeTable, row: usize) -> Result<usize, CcittError> {
    let mut run = 0;
    loop {
        let len = decode_code(reader, table, row)?;
        run += len;
        if len < 64 {
            return Ok(run);
        }
    }
}

/// Decompresses `height` rows of `width` cells.
pub fn decompress_rle(data: &[u8], width: usize, height: usize) -> Result<Bitmap, CcittError> {
    let mut bitmap = Bitmap::new(width, height);
    let mut reader = BitReader::new(data);

    for row in 0..height {
        let mut col = 0;
        let mut white = true;

        while col < width {
            let table: &CodeTable = if white { &*WHITE_CODES } else { &*BLACK_CODES };
            let run = decode_run(&mut reader, table, row)?;
            if col + run > width {
                return Err(CcittError::RowOverrun { row, width });
            }

            if !white {
                bitmap.set_run(row, col, run);
            }

            col += run;
            white = !white;
        }

        reader.align_to_byte();
    }

    Ok(bitmap)
}
