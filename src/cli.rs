use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::decoder::types::{DEFAULT_EXTENT, MAX_ZOOM, TileKey};

#[derive(Debug, Parser)]
#[command(name = "vt-pick", version, about = "Decode GeoJSON tiles and pick features by screen position")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error|warn|info|debug|trace)
    #[arg(long, default_value = "info")]
    pub log: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Decode(DecodeArgs),
    Pick(PickArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    pub input: PathBuf,

    /// Tile to decode, z/x/y
    #[arg(long)]
    pub tile: String,

    #[arg(long)]
    pub theme: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output: ReportFormat,

    #[arg(long, default_value_t = false)]
    pub no_tile_info: bool,

    #[arg(long, default_value_t = false)]
    pub no_attributes: bool,

    #[arg(long, default_value_t = DEFAULT_EXTENT)]
    pub extent: u32,
}

#[derive(Debug, Args)]
pub struct PickArgs {
    pub input: PathBuf,

    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    #[arg(long)]
    pub zoom: f64,

    /// Tile to load, z/x/y; defaults to the tile under lon/lat at zoom
    #[arg(long)]
    pub tile: Option<String>,

    #[arg(long, default_value_t = 800.0)]
    pub width: f64,

    #[arg(long, default_value_t = 600.0)]
    pub height: f64,

    #[arg(long)]
    pub x: Option<f64>,

    #[arg(long)]
    pub y: Option<f64>,

    #[arg(long)]
    pub theme: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Ndjson,
}

pub fn parse_tile_spec(value: &str) -> Result<TileKey> {
    let trimmed = value.trim();
    let mut parts = trimmed.split('/');
    let zoom_str = parts.next().context("tile must be in z/x/y format")?;
    let x_str = parts.next().context("tile must be in z/x/y format")?;
    let y_str = parts.next().context("tile must be in z/x/y format")?;
    if parts.next().is_some() {
        anyhow::bail!("tile must be in z/x/y format");
    }
    let zoom: u8 = zoom_str.parse().context("invalid tile zoom")?;
    let x: u32 = x_str.parse().context("invalid tile x")?;
    let y: u32 = y_str.parse().context("invalid tile y")?;
    let tile = TileKey::new(zoom, x, y);
    if !tile.is_valid() {
        anyhow::bail!("tile {tile} is outside the tile grid");
    }
    Ok(tile)
}

pub fn tile_for_lon_lat(lon: f64, lat: f64, zoom: f64) -> TileKey {
    let zoom = zoom.clamp(0.0, MAX_ZOOM as f64).floor() as u8;
    let (x, y) = crate::decoder::algo::lon_lat_to_world(lon, lat);
    let key = TileKey::new(zoom, 0, 0);
    let (west, _, _, north) = TileKey::new(0, 0, 0).world_bounds();
    let size = key.size();
    let max = (1u32 << zoom) - 1;
    let column = ((x - west) / size).floor().clamp(0.0, max as f64) as u32;
    let row = ((north - y) / size).floor().clamp(0.0, max as f64) as u32;
    TileKey::new(zoom, column, row)
}
