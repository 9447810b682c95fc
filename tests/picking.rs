use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use vt_pick::camera::GeoCoordinates;
use vt_pick::decoder::{DecoderOptions, GeoJsonTileDecoder, GeometryKind, TileKey};
use vt_pick::error::FetchError;
use vt_pick::geojson::{FeatureCollection, GeoJsonGeometry, parse_geojson};
use vt_pick::loader::TileLoaderState;
use vt_pick::mapview::{DataSource, MapView, MapViewOptions};
use vt_pick::provider::{DataProvider, GeoJsonDataProvider};
use vt_pick::theme::Theme;

const FEATURES: &str = include_str!("fixtures/features.geojson");
const THEME: &str = include_str!("fixtures/theme.json");
const ROOT: TileKey = TileKey {
    zoom: 0,
    x: 0,
    y: 0,
};

fn collection() -> FeatureCollection {
    parse_geojson(FEATURES.as_bytes()).expect("fixture geojson")
}

fn properties(index: usize) -> Map<String, Value> {
    collection().features[index]
        .properties
        .clone()
        .expect("fixture properties")
}

fn coordinates(index: usize) -> Vec<Vec<f64>> {
    match collection().features[index].geometry.clone() {
        Some(GeoJsonGeometry::Point { coordinates }) => vec![coordinates],
        Some(GeoJsonGeometry::LineString { coordinates }) => coordinates,
        other => panic!("unexpected fixture geometry {other:?}"),
    }
}

fn location(position: &[f64]) -> GeoCoordinates {
    GeoCoordinates::new(position[1], position[0])
}

async fn map_view() -> MapView {
    let theme = Theme::from_value(&serde_json::from_str(THEME).expect("fixture theme"));
    let mut map_view = MapView::new(MapViewOptions::default());
    let source = map_view.add_data_source(DataSource::new(
        "geojson",
        Arc::new(GeoJsonDataProvider::new("italy_test", collection())),
        Arc::new(GeoJsonTileDecoder::new(theme, DecoderOptions::default())),
    ));
    assert_eq!(
        map_view.load_tile(source, ROOT).await,
        Some(TileLoaderState::Ready)
    );
    map_view
}

fn pick_at(map_view: &mut MapView, target: GeoCoordinates) -> Vec<vt_pick::PickResult> {
    map_view.look_at(target, 2.0);
    let screen = map_view.screen_position(target).expect("on screen");
    map_view.pick(screen.x, screen.y)
}

#[tokio::test]
async fn pick_polygon() {
    let mut map_view = map_view().await;
    // The unstyled marker sits inside the polygon.
    let target = location(&coordinates(3)[0]);

    let results = pick_at(&mut map_view, target);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].kind, GeometryKind::Polygon);
    assert_eq!(results[0].user_data.properties, properties(0));

    let published = map_view.published_tile(0, ROOT).expect("published tile");
    let polygon = published.geometry(GeometryKind::Polygon).expect("polygon");
    assert!(Arc::ptr_eq(&results[0].user_data, &polygon.obj_infos[0]));
}

#[tokio::test]
async fn raw_intersections_include_decorations() {
    let mut map_view = map_view().await;
    let target = location(&coordinates(3)[0]);
    map_view.look_at(target, 2.0);
    assert!((map_view.camera().zoom_level() - 2.0).abs() < 1e-9);
    let world = target.to_world();
    assert!((map_view.camera().target() - world).norm() < 1e-6);
    let screen = map_view.screen_position(target).expect("on screen");

    let hits = map_view.intersect_map_objects(screen.x, screen.y);
    assert!(hits.iter().any(|hit| hit.user_data.is_none()));
    let usable: Vec<_> = hits.iter().filter(|hit| hit.user_data.is_some()).collect();
    assert_eq!(usable.len(), 1);
}

#[tokio::test]
async fn pick_line() {
    let mut map_view = map_view().await;
    let target = location(&coordinates(1)[1]);

    let results = pick_at(&mut map_view, target);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].kind, GeometryKind::SolidLine);
    assert_eq!(results[0].user_data.properties, properties(1));
}

#[tokio::test]
async fn pick_beside_line_misses() {
    let mut map_view = map_view().await;
    let target = location(&coordinates(1)[1]);
    map_view.look_at(target, 2.0);
    let screen = map_view.screen_position(target).expect("on screen");

    assert!(map_view.pick(screen.x + 40.0, screen.y + 40.0).is_empty());
}

#[tokio::test]
async fn pick_label() {
    let mut map_view = map_view().await;
    let target = location(&coordinates(2)[0]);

    let results = pick_at(&mut map_view, target);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].kind, GeometryKind::Text);
    assert_eq!(results[0].user_data.properties, properties(2));

    // Inside the label box but off the anchor.
    let screen = map_view.screen_position(target).expect("on screen");
    let results = map_view.pick(screen.x + 15.0, screen.y + 4.0);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].kind, GeometryKind::Text);

    assert!(map_view.pick(screen.x, screen.y + 30.0).is_empty());
}

#[tokio::test]
async fn pick_circle_point_with_default_theme() {
    let mut map_view = MapView::new(MapViewOptions::default());
    let source = map_view.add_data_source(DataSource::new(
        "geojson",
        Arc::new(GeoJsonDataProvider::new("italy_test", collection())),
        Arc::new(GeoJsonTileDecoder::default()),
    ));
    map_view.load_tile(source, ROOT).await;
    let target = location(&coordinates(3)[0]);

    let results = pick_at(&mut map_view, target);
    assert_eq!(results.len(), 2);
    let kinds: Vec<GeometryKind> = results.iter().map(|result| result.kind).collect();
    assert!(kinds.contains(&GeometryKind::Point));
    assert!(kinds.contains(&GeometryKind::Polygon));
    assert!(results.windows(2).all(|pair| pair[0].distance <= pair[1].distance));
}

#[tokio::test]
async fn failed_tiles_contribute_nothing() {
    struct Offline;

    #[async_trait]
    impl DataProvider for Offline {
        async fn get_tile(&self, _tile: TileKey) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Provider("offline".to_string()))
        }
    }

    let mut map_view = MapView::new(MapViewOptions::default());
    let source = map_view.add_data_source(DataSource::new(
        "offline",
        Arc::new(Offline),
        Arc::new(GeoJsonTileDecoder::default()),
    ));
    assert_eq!(
        map_view.load_tile(source, ROOT).await,
        Some(TileLoaderState::Error)
    );
    assert!(map_view.published_tile(source, ROOT).is_none());
    assert!(map_view.scene().is_empty());

    let target = location(&coordinates(3)[0]);
    assert!(pick_at(&mut map_view, target).is_empty());
}

/// Serves the fixture after a short delay so a re-load can be caught in flight.
struct SlowProvider(GeoJsonDataProvider);

#[async_trait]
impl DataProvider for SlowProvider {
    async fn get_tile(&self, tile: TileKey) -> Result<Vec<u8>, FetchError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.0.get_tile(tile).await
    }
}

#[tokio::test]
async fn in_flight_reload_keeps_tile_and_cancel_removes_it() {
    let mut map_view = MapView::new(MapViewOptions::default());
    let source = map_view.add_data_source(DataSource::new(
        "slow",
        Arc::new(SlowProvider(GeoJsonDataProvider::new("italy_test", collection()))),
        Arc::new(GeoJsonTileDecoder::default()),
    ));
    assert_eq!(
        map_view.load_tile(source, ROOT).await,
        Some(TileLoaderState::Ready)
    );
    let target = location(&coordinates(3)[0]);
    assert!(!pick_at(&mut map_view, target).is_empty());

    let loader = map_view
        .data_source(source)
        .and_then(|data_source| data_source.existing_loader(ROOT))
        .cloned()
        .expect("loader");
    let reload = {
        let loader = Arc::clone(&loader);
        tokio::spawn(async move { loader.load_and_decode().await })
    };
    while loader.state() == TileLoaderState::Ready {
        tokio::task::yield_now().await;
    }
    assert_eq!(loader.state(), TileLoaderState::Loading);

    // Still published while the new cycle is in flight.
    map_view.update_scene();
    assert!(map_view.published_tile(source, ROOT).is_some());
    assert!(!pick_at(&mut map_view, target).is_empty());

    assert_eq!(
        map_view.cancel_tile(source, ROOT),
        Some(TileLoaderState::Cancelled)
    );
    assert_eq!(reload.await.expect("join"), TileLoaderState::Cancelled);
    assert!(map_view.scene().is_empty());
    assert!(map_view.published_tile(source, ROOT).is_none());
    assert!(pick_at(&mut map_view, target).is_empty());
}

#[tokio::test]
async fn results_serialize_with_user_data() {
    let mut map_view = map_view().await;
    let target = location(&coordinates(3)[0]);
    let results = pick_at(&mut map_view, target);

    let value = serde_json::to_value(&results).expect("serialize");
    assert_eq!(value[0]["userData"]["name"], json!("X"));
    assert_eq!(value[0]["kind"], json!("polygon"));
}

#[tokio::test]
async fn load_tiles_publishes_every_ready_tile() {
    let theme = Theme::from_value(&serde_json::from_str(THEME).expect("fixture theme"));
    let mut map_view = MapView::new(MapViewOptions::default());
    let source = map_view.add_data_source(DataSource::new(
        "geojson",
        Arc::new(GeoJsonDataProvider::new("italy_test", collection())),
        Arc::new(GeoJsonTileDecoder::new(theme, DecoderOptions::default())),
    ));
    let tiles = [
        TileKey::new(1, 0, 0),
        TileKey::new(1, 1, 0),
        TileKey::new(1, 0, 1),
        TileKey::new(1, 1, 1),
    ];

    let states = map_view.load_tiles(source, &tiles).await;
    assert_eq!(states.len(), 4);
    for (tile, state) in &states {
        assert_eq!(*state, TileLoaderState::Ready, "tile {tile}");
        assert!(map_view.published_tile(source, *tile).is_some());
    }
    // Nothing changed since the load synced the scene.
    assert_eq!(map_view.update_scene(), Default::default());

    let target = location(&coordinates(3)[0]);
    let results = pick_at(&mut map_view, target);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tile, TileKey::new(1, 1, 0));
    assert_eq!(results[0].kind, GeometryKind::Polygon);
}
