use std::path::PathBuf;

use aigrid::{DecodeOutcome, GridHandle, PixelBuffer, Statistics};
use clap::Parser;
use env_logger::{Env, TimestampPrecision};

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser, Debug)]
#[clap(name = "aiginfo", about = "Print the metadata of an Arc/Info binary grid")]
pub struct Opt {
    /// Grid directory, or one of the .adf files it contains
    pub input: PathBuf,

    /// Print the cell values of the block at COL,ROW
    #[arg(long = "block", value_name = "COL,ROW", value_parser = parse_block)]
    pub block: Option<(usize, usize)>,

    /// Compute the statistics from the cell values when the grid does not store them
    #[arg(long = "stats")]
    pub stats: bool,
}

fn parse_block(value: &str) -> std::result::Result<(usize, usize), String> {
    let (col, row) = value
        .split_once(',')
        .ok_or_else(|| format!("Expected COL,ROW but got '{value}'"))?;

    let parse = |v: &str| v.trim().parse::<usize>().map_err(|e| format!("Invalid block coordinate '{v}': {e}"));
    Ok((parse(col)?, parse(row)?))
}

fn print_statistics(label: &str, stats: &Statistics) {
    println!(
        "{label}: min={} max={} mean={} stddev={}",
        stats.min, stats.max, stats.mean, stats.stddev
    );
}

fn print_block(buffer: &PixelBuffer, width: usize) {
    match buffer {
        PixelBuffer::Int(data) => {
            for row in data.chunks(width) {
                let line: Vec<String> = row
                    .iter()
                    .map(|&v| if v == aigrid::NO_DATA { "-".to_string() } else { v.to_string() })
                    .collect();
                println!("{}", line.join(" "));
            }
        }
        PixelBuffer::Float(data) => {
            for row in data.chunks(width) {
                let line: Vec<String> = row
                    .iter()
                    .map(|&v| if v == aigrid::FLOAT_NO_DATA { "-".to_string() } else { v.to_string() })
                    .collect();
                println!("{}", line.join(" "));
            }
        }
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let grid = GridHandle::open(&opt.input)?;
    let header = grid.header();
    let bounds = grid.bounds();

    println!("Grid: {}", grid.path().display());
    println!("Cell type: {:?}{}", header.cell_type, if header.compressed { "" } else { " (uncompressed)" });
    println!("Size: {}x{}", grid.pixels_x(), grid.pixels_y());
    println!("Cell size: {}x{}", header.cell_size_x, header.cell_size_y);
    println!(
        "Bounds: ({}, {}) - ({}, {})",
        bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
    );
    println!(
        "Blocks: {}x{} of {}x{} cells, {} stored",
        header.blocks_per_row,
        header.blocks_per_column,
        header.block_x_size,
        header.block_y_size,
        grid.tile_index().locations().iter().filter(|loc| !loc.is_empty()).count()
    );

    match grid.statistics() {
        Some(stats) => print_statistics("Statistics", stats),
        None if opt.stats => {
            log::info!("Computing statistics from {} tiles", grid.tile_count());
            match grid.compute_statistics()? {
                Some(stats) => print_statistics("Computed statistics", &stats),
                None => println!("Computed statistics: no valid cells"),
            }
        }
        None => println!("Statistics: not available"),
    }

    if let Some(projection) = grid.projection() {
        println!("Projection:\n{projection}");
    }

    if let Some((col, row)) = opt.block {
        let (buffer, outcome) = grid.read_block(col, row)?;
        match &outcome {
            DecodeOutcome::Decoded => println!("Block {col},{row}:"),
            DecodeOutcome::Empty => println!("Block {col},{row} (no data stored):"),
            DecodeOutcome::Degraded(err) => println!("Block {col},{row} (corrupt: {err}):"),
        }

        print_block(&buffer, header.block_x_size as usize);
    }

    grid.close();
    Ok(())
}
