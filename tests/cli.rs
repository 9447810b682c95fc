use clap::{CommandFactory, Parser};

use vt_pick::cli::{Cli, Command, ReportFormat, parse_tile_spec, tile_for_lon_lat};
use vt_pick::decoder::TileKey;

#[test]
fn parse_decode_minimal() {
    let cli = Cli::parse_from(["vt-pick", "decode", "italy.geojson", "--tile", "0/0/0"]);
    assert_eq!(cli.log, "info");
    match cli.command {
        Command::Decode(args) => {
            assert_eq!(args.input.as_os_str(), "italy.geojson");
            assert_eq!(args.tile, "0/0/0");
            assert_eq!(args.theme, None);
            assert_eq!(args.output, ReportFormat::Text);
            assert!(!args.no_tile_info);
            assert!(!args.no_attributes);
            assert_eq!(args.extent, 4096);
        }
        _ => panic!("expected decode command"),
    }
}

#[test]
fn parse_decode_options() {
    let cli = Cli::parse_from([
        "vt-pick",
        "--log",
        "debug",
        "decode",
        "italy.geojson",
        "--tile",
        "3/4/2",
        "--theme",
        "theme.json",
        "--output",
        "ndjson",
        "--no-tile-info",
        "--no-attributes",
        "--extent",
        "512",
    ]);
    assert_eq!(cli.log, "debug");
    match cli.command {
        Command::Decode(args) => {
            assert_eq!(args.theme.expect("theme").as_os_str(), "theme.json");
            assert_eq!(args.output, ReportFormat::Ndjson);
            assert!(args.no_tile_info);
            assert!(args.no_attributes);
            assert_eq!(args.extent, 512);
        }
        _ => panic!("expected decode command"),
    }
}

#[test]
fn parse_pick_with_negative_coordinates() {
    let cli = Cli::parse_from([
        "vt-pick", "pick", "world.geojson", "--lon", "-74.0", "--lat", "40.7", "--zoom", "4",
        "--x", "10", "--y", "20", "--output", "json",
    ]);
    match cli.command {
        Command::Pick(args) => {
            assert_eq!(args.lon, -74.0);
            assert_eq!(args.lat, 40.7);
            assert_eq!(args.zoom, 4.0);
            assert_eq!(args.tile, None);
            assert_eq!(args.width, 800.0);
            assert_eq!(args.height, 600.0);
            assert_eq!(args.x, Some(10.0));
            assert_eq!(args.y, Some(20.0));
            assert_eq!(args.output, ReportFormat::Json);
        }
        _ => panic!("expected pick command"),
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn tile_spec_parsing() {
    assert_eq!(parse_tile_spec(" 2/1/3 ").expect("tile"), TileKey::new(2, 1, 3));
    assert!(parse_tile_spec("2/1").is_err());
    assert!(parse_tile_spec("2/1/3/4").is_err());
    assert!(parse_tile_spec("a/1/3").is_err());
    assert!(parse_tile_spec("1/2/0").is_err());
}

#[test]
fn tile_under_lon_lat() {
    assert_eq!(tile_for_lon_lat(12.5, 41.9, 0.0), TileKey::new(0, 0, 0));
    assert_eq!(tile_for_lon_lat(12.5, 41.9, 1.0), TileKey::new(1, 1, 0));
    assert_eq!(tile_for_lon_lat(-74.0, -33.0, 1.5), TileKey::new(1, 0, 1));
    assert_eq!(tile_for_lon_lat(180.0, -90.0, 2.0), TileKey::new(2, 3, 3));
}
