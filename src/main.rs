use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use vt_pick::camera::GeoCoordinates;
use vt_pick::cli::{Cli, Command, DecodeArgs, PickArgs, ReportFormat, parse_tile_spec, tile_for_lon_lat};
use vt_pick::decoder::{DecoderOptions, GeoJsonTileDecoder};
use vt_pick::loader::{TileLoader, TileLoaderState};
use vt_pick::mapview::{DataSource, MapView, MapViewOptions};
use vt_pick::output::{decode_ndjson_lines, decode_text_lines, pick_ndjson_lines, pick_text_lines};
use vt_pick::provider::GeoJsonDataProvider;
use vt_pick::theme::{Theme, read_theme};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    match cli.command {
        Command::Decode(args) => runtime.block_on(run_decode(args)),
        Command::Pick(args) => runtime.block_on(run_pick(args)),
    }
}

fn load_theme(path: Option<&std::path::Path>) -> Result<Theme> {
    match path {
        Some(path) => read_theme(path).with_context(|| format!("load theme {}", path.display())),
        None => Ok(Theme::default()),
    }
}

async fn run_decode(args: DecodeArgs) -> Result<()> {
    let tile = parse_tile_spec(&args.tile)?;
    let theme = load_theme(args.theme.as_deref())?;
    let provider = GeoJsonDataProvider::from_path("cli", &args.input)
        .with_context(|| format!("open {}", args.input.display()))?;
    let options = DecoderOptions {
        extent: args.extent,
        gather_feature_attributes: !args.no_attributes,
        create_tile_info: !args.no_tile_info,
    };
    let loader = TileLoader::new(
        tile,
        Arc::new(provider),
        Arc::new(GeoJsonTileDecoder::new(theme, options)),
    );

    let state = loader.load_and_decode().await;
    if state != TileLoaderState::Ready {
        match loader.last_error() {
            Some(err) => return Err(err).with_context(|| format!("decode tile {tile}")),
            None => anyhow::bail!("decode tile {tile}: loader ended in {state}"),
        }
    }
    let decoded = loader
        .decoded_tile()
        .with_context(|| format!("decode tile {tile}: no decoded tile"))?;

    match args.output {
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(decoded.as_ref())?;
            println!("{}", json);
        }
        ReportFormat::Ndjson => {
            for line in decode_ndjson_lines(&decoded)? {
                println!("{}", line);
            }
        }
        ReportFormat::Text => {
            for line in decode_text_lines(&decoded) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

async fn run_pick(args: PickArgs) -> Result<()> {
    let tile = match args.tile.as_deref() {
        Some(value) => parse_tile_spec(value)?,
        None => tile_for_lon_lat(args.lon, args.lat, args.zoom),
    };
    let theme = load_theme(args.theme.as_deref())?;
    let provider = GeoJsonDataProvider::from_path("cli", &args.input)
        .with_context(|| format!("open {}", args.input.display()))?;

    let mut map_view = MapView::new(MapViewOptions {
        width: args.width,
        height: args.height,
        ..MapViewOptions::default()
    });
    let source = map_view.add_data_source(DataSource::new(
        "cli",
        Arc::new(provider),
        Arc::new(GeoJsonTileDecoder::new(theme, DecoderOptions::default())),
    ));
    let target = GeoCoordinates::new(args.lat, args.lon);
    map_view.look_at(target, args.zoom);

    let state = map_view
        .load_tile(source, tile)
        .await
        .context("data source missing")?;
    if state != TileLoaderState::Ready {
        anyhow::bail!("tile {tile} not loaded: {state}");
    }

    let (x, y) = match (args.x, args.y) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            let screen = map_view
                .screen_position(target)
                .context("target is behind the camera")?;
            (screen.x, screen.y)
        }
    };
    let results = map_view.pick(x, y);

    match args.output {
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&results)?;
            println!("{}", json);
        }
        ReportFormat::Ndjson => {
            for line in pick_ndjson_lines(&results)? {
                println!("{}", line);
            }
        }
        ReportFormat::Text => {
            for line in pick_text_lines(&results) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
