use std::sync::Arc;

use serde_json::{Value, json};

use vt_pick::decoder::{
    DecodedTile, DecoderOptions, GeoJsonTileDecoder, GeometryKind, TileDecoder, TileKey,
    decode_features, decode_tile_payload, encode_tile_payload, objects_by_kind,
};
use vt_pick::error::{DecodeError, FetchError};
use vt_pick::geojson::{FeatureCollection, parse_geojson};
use vt_pick::loader::{TileLoader, TileLoaderState};
use vt_pick::provider::{DataProvider, GeoJsonDataProvider};
use vt_pick::theme::Theme;

const FEATURES: &str = include_str!("fixtures/features.geojson");
const THEME: &str = include_str!("fixtures/theme.json");

fn collection() -> FeatureCollection {
    parse_geojson(FEATURES.as_bytes()).expect("fixture geojson")
}

fn theme() -> Theme {
    Theme::from_value(&serde_json::from_str(THEME).expect("fixture theme"))
}

fn properties(index: usize) -> serde_json::Map<String, Value> {
    collection().features[index]
        .properties
        .clone()
        .expect("fixture properties")
}

async fn decoded_tile() -> Arc<DecodedTile> {
    let loader = TileLoader::new(
        TileKey::new(0, 0, 0),
        Arc::new(GeoJsonDataProvider::new("italy_test", collection())),
        Arc::new(GeoJsonTileDecoder::new(theme(), DecoderOptions::default())),
    );
    let state = loader.load_and_decode().await;
    assert_eq!(state, TileLoaderState::Ready);
    loader.decoded_tile().expect("decoded tile")
}

#[tokio::test]
async fn decoded_tile_is_created() {
    let tile = decoded_tile().await;
    assert_eq!(tile.geometries.len(), 2);
    assert_eq!(tile.text_geometries.len(), 1);
    assert!(tile.tile_info.is_some());
    assert_eq!(tile.stats.input_features, 4);
    assert_eq!(tile.stats.skipped_invalid, 0);
    assert_eq!(tile.stats.skipped_unstyled, 1);
}

#[tokio::test]
async fn text_geometry_carries_feature_attributes() {
    let tile = decoded_tile().await;
    let text = &tile.text_geometries[0];
    assert_eq!(text.texts, vec!["Paris".to_string()]);
    assert_eq!(text.obj_infos.len(), 1);
    assert_eq!(text.obj_infos[0].properties, properties(2));
}

#[tokio::test]
async fn line_geometry_has_one_group() {
    let tile = decoded_tile().await;
    let line = tile.geometry(GeometryKind::SolidLine).expect("line geometry");
    assert_eq!(line.groups.len(), 1);
    assert_eq!(line.primitive_count(), 2);
    assert_eq!(line.obj_infos[0].properties, properties(1));
}

#[tokio::test]
async fn polygon_geometry_has_one_object_info() {
    let tile = decoded_tile().await;
    let polygon = tile.geometry(GeometryKind::Polygon).expect("polygon geometry");
    assert_eq!(polygon.groups.len(), 1);
    assert_eq!(polygon.obj_infos.len(), 1);
    assert_eq!(polygon.group_obj_infos(0).len(), 1);
    assert_eq!(polygon.obj_infos[0].properties, properties(0));
    assert_eq!(polygon.obj_infos[0].properties.get("name"), Some(&json!("X")));
}

#[tokio::test]
async fn tile_info_resolves_the_same_object_info() {
    let tile = decoded_tile().await;
    let info = tile.tile_info.as_ref().expect("tile info");
    assert_eq!(info.len(), 3);
    let polygon = tile.geometry(GeometryKind::Polygon).expect("polygon geometry");
    let stored = &polygon.obj_infos[0];
    let indexed = info.get(stored.feature_id).expect("indexed feature");
    assert!(Arc::ptr_eq(stored, indexed));
    assert_eq!(info.counts.get(&GeometryKind::Text), Some(&1));
}

#[test]
fn every_styled_feature_lands_in_exactly_one_kind() {
    let tile = TileKey::new(0, 0, 0);
    let decoded = decode_features(tile, &collection().features, &Theme::default(), &DecoderOptions::default())
        .expect("decode");
    let by_kind = objects_by_kind(&decoded);
    assert_eq!(by_kind.get(&GeometryKind::Polygon).map(Vec::len), Some(1));
    assert_eq!(by_kind.get(&GeometryKind::SolidLine).map(Vec::len), Some(1));
    assert_eq!(by_kind.get(&GeometryKind::Text).map(Vec::len), Some(1));
    // The default theme renders unnamed points as circles.
    assert_eq!(by_kind.get(&GeometryKind::Point).map(Vec::len), Some(1));

    let mut ordinals: Vec<usize> = by_kind.values().flatten().map(|info| info.ordinal).collect();
    ordinals.sort();
    assert_eq!(ordinals, vec![0, 1, 2, 3]);
}

#[test]
fn empty_collection_decodes_to_empty_tile() {
    let decoder = GeoJsonTileDecoder::default();
    let tile = TileKey::new(4, 3, 5);
    let decoded = decoder
        .decode(tile, br#"{"type":"FeatureCollection","features":[]}"#)
        .expect("decode");
    assert!(decoded.is_empty());
    assert_eq!(decoded.tile_key, tile);
    assert_eq!(decoded.tile_info.as_ref().map(|info| info.len()), Some(0));

    let again = decoder
        .decode(tile, br#"{"type":"FeatureCollection","features":[]}"#)
        .expect("decode");
    assert_eq!(decoded, again);
}

#[test]
fn invalid_feature_is_skipped_without_failing_the_tile() {
    let payload = json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "broken"},
             "geometry": {"type": "LineString", "coordinates": [[1.0, 1.0]]}},
            {"type": "Feature", "properties": {"name": "nowhere"},
             "geometry": {"type": "Point", "coordinates": [500.0, 1.0]}},
            {"type": "Feature", "properties": {"name": "ok"}, "geometry": null},
            {"type": "Feature", "properties": {"ref": "A1"},
             "geometry": {"type": "LineString", "coordinates": [[1.0, 1.0], [2.0, 2.0]]}}
        ]
    });
    let decoded = GeoJsonTileDecoder::default()
        .decode(TileKey::new(0, 0, 0), payload.to_string().as_bytes())
        .expect("decode");
    assert_eq!(decoded.stats.skipped_invalid, 3);
    assert_eq!(decoded.geometries.len(), 1);
    let line = decoded.geometry(GeometryKind::SolidLine).expect("line");
    assert_eq!(line.obj_infos[0].properties.get("ref"), Some(&json!("A1")));
}

#[test]
fn attributes_can_be_omitted() {
    let options = DecoderOptions {
        gather_feature_attributes: false,
        create_tile_info: false,
        ..DecoderOptions::default()
    };
    let decoded = decode_features(TileKey::new(0, 0, 0), &collection().features, &theme(), &options)
        .expect("decode");
    assert!(decoded.tile_info.is_none());
    let polygon = decoded.geometry(GeometryKind::Polygon).expect("polygon");
    assert!(polygon.obj_infos[0].properties.is_empty());
    // Labels still need their text.
    assert_eq!(decoded.text_geometries[0].texts, vec!["Paris".to_string()]);
}

#[test]
fn feature_ids_are_stable_per_tile() {
    let tile = TileKey::new(0, 0, 0);
    let first = decode_features(tile, &collection().features, &theme(), &DecoderOptions::default())
        .expect("decode");
    let second = decode_features(tile, &collection().features, &theme(), &DecoderOptions::default())
        .expect("decode");
    let id = |decoded: &DecodedTile| decoded.geometries[0].obj_infos[0].feature_id;
    assert_eq!(id(&first), id(&second));
    assert_eq!(first, second);
}

#[test]
fn decoded_tile_serializes_object_infos_with_ids() {
    let decoded = decode_features(
        TileKey::new(0, 0, 0),
        &collection().features,
        &theme(),
        &DecoderOptions::default(),
    )
    .expect("decode");
    let value = serde_json::to_value(&decoded).expect("serialize");
    let info = &value["geometries"][0]["objInfos"][0];
    assert_eq!(info["name"], json!("X"));
    assert!(info["$id"].is_u64());
}

#[test]
fn zero_area_polygon_and_zero_length_line_are_skipped() {
    let payload = json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "flat"},
             "geometry": {"type": "Polygon", "coordinates": [[[1, 1], [1, 1], [1, 1], [1, 1]]]}},
            {"type": "Feature", "properties": {"ref": "stub"},
             "geometry": {"type": "LineString", "coordinates": [[2, 2], [2, 2]]}},
            {"type": "Feature", "properties": {"name": "kept"},
             "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [4, 0], [4, 4], [0, 0]]]}}
        ]
    });
    let decoded = GeoJsonTileDecoder::default()
        .decode(TileKey::new(0, 0, 0), payload.to_string().as_bytes())
        .expect("decode");

    assert_eq!(decoded.stats.input_features, 3);
    assert_eq!(decoded.stats.skipped_invalid, 2);
    assert_eq!(decoded.stats.skipped_unstyled, 0);
    assert!(decoded.geometry(GeometryKind::SolidLine).is_none());
    let polygon = decoded.geometry(GeometryKind::Polygon).expect("polygon");
    assert_eq!(polygon.obj_infos.len(), 1);
    assert_eq!(polygon.obj_infos[0].properties.get("name"), Some(&json!("kept")));
    assert!(polygon.primitive_count() >= 1);
    assert_eq!(decoded.tile_info.as_ref().map(|info| info.len()), Some(1));
}

#[test]
fn every_object_info_covers_at_least_one_primitive() {
    let decoded = decode_features(
        TileKey::new(0, 0, 0),
        &collection().features,
        &Theme::default(),
        &DecoderOptions::default(),
    )
    .expect("decode");
    for geometry in &decoded.geometries {
        for object in 0..geometry.obj_infos.len() {
            let range = geometry.object_index_range(object).expect("object span");
            assert!(!range.is_empty(), "{:?} object {object}", geometry.kind);
        }
    }
}

#[test]
fn tile_outside_the_grid_is_a_decode_error() {
    let payload = br#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"Point","coordinates":[1.0,2.0]},"properties":{}}
    ]}"#;
    let decoder = GeoJsonTileDecoder::default();
    for tile in [
        TileKey::new(31, 0, 0),
        TileKey::new(32, 0, 0),
        TileKey::new(200, 0, 0),
        TileKey::new(2, 4, 0),
    ] {
        let err = decoder.decode(tile, payload).expect_err("invalid tile");
        assert_eq!(err, DecodeError::InvalidTile(tile));
    }
    assert!(decoder.decode(TileKey::new(30, 0, 0), payload).is_ok());
}

#[test]
fn gzip_payload_round_trips() {
    let data = br#"{"type":"FeatureCollection","features":[]}"#;
    let encoded = encode_tile_payload(data, true).expect("gzip");
    assert_ne!(encoded.as_slice(), data.as_slice());
    assert_eq!(decode_tile_payload(&encoded).expect("gunzip"), data.to_vec());
    assert_eq!(decode_tile_payload(data).expect("plain"), data.to_vec());
}

#[test]
fn malformed_json_is_a_decode_error() {
    let err = GeoJsonTileDecoder::default()
        .decode(TileKey::new(0, 0, 0), b"{ not json")
        .expect_err("decode error");
    assert!(matches!(err, DecodeError::Parse(_)));
}

fn cities() -> GeoJsonDataProvider {
    let collection: FeatureCollection = serde_json::from_value(json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [12.5, 41.9]},
             "properties": {"name": "Roma"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-74.0, 40.7]},
             "properties": {"name": "New York"}}
        ]
    }))
    .expect("collection");
    GeoJsonDataProvider::new("cities", collection)
}

#[test]
fn provider_cuts_features_by_tile_bounds() {
    let provider = cities();
    assert_eq!(provider.features_for_tile(TileKey::new(0, 0, 0)).len(), 2);
    // z1: x=1,y=0 is the north-east quadrant.
    let north_east = provider.features_for_tile(TileKey::new(1, 1, 0));
    assert_eq!(north_east.len(), 1);
    assert_eq!(
        north_east[0].properties.as_ref().and_then(|p| p.get("name")),
        Some(&json!("Roma"))
    );
}

#[tokio::test]
async fn gzipped_provider_payload_decodes() {
    let tile = TileKey::new(1, 1, 0);
    let payload = cities()
        .with_gzip(true)
        .get_tile(tile)
        .await
        .expect("payload");
    assert!(payload.starts_with(&[0x1f, 0x8b]));
    let decoded = GeoJsonTileDecoder::default()
        .decode(tile, &payload)
        .expect("decode");
    assert_eq!(decoded.stats.input_features, 1);
    assert_eq!(decoded.text_geometries[0].texts, vec!["Roma".to_string()]);
}

#[tokio::test]
async fn provider_rejects_tiles_outside_the_grid() {
    for tile in [TileKey::new(1, 2, 0), TileKey::new(64, 0, 0)] {
        let err = cities().get_tile(tile).await.expect_err("out of grid");
        assert!(matches!(err, FetchError::NotFound(_)));
    }
}
