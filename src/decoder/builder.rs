use std::collections::HashMap;
use std::sync::Arc;

use crate::decoder::types::{
    DecodeStats, DecodedTile, Geometry, GeometryKind, ObjectInfo, TextGeometry, TileInfo, TileKey,
};

pub fn build(
    tile_key: TileKey,
    geometries: Vec<Geometry>,
    text_geometries: Vec<TextGeometry>,
    build_tile_info: bool,
) -> DecodedTile {
    build_with_stats(
        tile_key,
        geometries,
        text_geometries,
        build_tile_info,
        DecodeStats::default(),
    )
}

pub fn build_with_stats(
    tile_key: TileKey,
    geometries: Vec<Geometry>,
    text_geometries: Vec<TextGeometry>,
    build_tile_info: bool,
    stats: DecodeStats,
) -> DecodedTile {
    let tile_info = build_tile_info.then(|| tile_info(&geometries, &text_geometries));
    DecodedTile {
        tile_key,
        center: tile_key.world_center(),
        geometries,
        text_geometries,
        tile_info,
        stats,
    }
}

fn tile_info(geometries: &[Geometry], text_geometries: &[TextGeometry]) -> TileInfo {
    let mut info = TileInfo::default();
    let mut record = |kind: GeometryKind, objects: &[Arc<ObjectInfo>]| {
        *info.counts.entry(kind).or_insert(0) += objects.len();
        for object in objects {
            info.features
                .entry(object.feature_id)
                .or_insert_with(|| Arc::clone(object));
        }
    };
    for geometry in geometries {
        record(geometry.kind, &geometry.obj_infos);
    }
    for text in text_geometries {
        record(GeometryKind::Text, &text.obj_infos);
    }
    info
}

pub fn objects_by_kind(tile: &DecodedTile) -> HashMap<GeometryKind, Vec<Arc<ObjectInfo>>> {
    let mut by_kind: HashMap<GeometryKind, Vec<Arc<ObjectInfo>>> = HashMap::new();
    for geometry in tile.geometries.iter() {
        by_kind
            .entry(geometry.kind)
            .or_default()
            .extend(geometry.obj_infos.iter().cloned());
    }
    for text in tile.text_geometries.iter() {
        by_kind
            .entry(GeometryKind::Text)
            .or_default()
            .extend(text.obj_infos.iter().cloned());
    }
    by_kind
}
