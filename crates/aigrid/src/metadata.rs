//! The `dblbnd.adf` extent and `sta.adf` statistics records.
//! Both are 32 bytes holding four big-endian doubles.

use std::path::Path;

use crate::{Error, Result, bytes, io};

pub const RECORD_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = read_record(path)?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let [min_x, min_y, max_x, max_y] = parse_record(data, "bounds")?;
        Ok(Bounds { min_x, min_y, max_x, max_y })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
}

impl Statistics {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = read_record(path)?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let [min, max, mean, stddev] = parse_record(data, "statistics")?;
        Ok(Statistics { min, max, mean, stddev })
    }

    /// Computes the statistics of the valid values (population standard deviation).
    /// Returns `None` when there are no values.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut accumulator = StatisticsAccumulator::default();
        values.into_iter().for_each(|v| accumulator.add(v));
        accumulator.finish()
    }
}

/// Running sums for computing statistics over values that arrive in chunks.
#[derive(Debug, Clone, Copy)]
pub struct StatisticsAccumulator {
    count: usize,
    min: f64,
    max: f64,
    sum: f64,
    sum_sq: f64,
}

impl Default for StatisticsAccumulator {
    fn default() -> Self {
        StatisticsAccumulator {
            count: 0,
            min: f64::MAX,
            max: f64::MIN,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }
}

impl StatisticsAccumulator {
    pub fn add(&mut self, v: f64) {
        self.count += 1;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.sum += v;
        self.sum_sq += v * v;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(&self) -> Option<Statistics> {
        if self.count == 0 {
            return None;
        }

        let mean = self.sum / self.count as f64;
        let variance = (self.sum_sq / self.count as f64 - mean * mean).max(0.0);

        Some(Statistics {
            min: self.min,
            max: self.max,
            mean,
            stddev: variance.sqrt(),
        })
    }
}

fn read_record(path: &Path) -> Result<Vec<u8>> {
    match io::read_case_insensitive(path) {
        Ok(data) => Ok(data),
        Err(Error::FileNotFound(p)) => Err(Error::MetadataUnavailable(format!("{} not found", p.display()))),
        Err(e) => Err(e),
    }
}

fn parse_record(data: &[u8], name: &str) -> Result<[f64; 4]> {
    if data.len() < RECORD_SIZE {
        return Err(Error::MetadataUnavailable(format!(
            "The {name} record is {} bytes, expected {RECORD_SIZE}",
            data.len()
        )));
    }

    bytes::be_f64_quad(data).ok_or_else(|| Error::MetadataUnavailable(format!("Failed to read the {name} record")))
}
