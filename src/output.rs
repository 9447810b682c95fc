use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::json;

use crate::decoder::types::DecodedTile;
use crate::pick::PickResult;

pub fn decode_text_lines(tile: &DecodedTile) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "tile: {} features={} skipped_invalid={} skipped_unstyled={}",
        tile.tile_key,
        tile.stats.input_features,
        tile.stats.skipped_invalid,
        tile.stats.skipped_unstyled
    ));
    for geometry in tile.geometries.iter() {
        lines.push(format!(
            "geometry: {} vertices={} primitives={} groups={} objects={}",
            geometry.kind.as_str(),
            geometry.positions.len(),
            geometry.primitive_count(),
            geometry.groups.len(),
            geometry.obj_infos.len()
        ));
        for (group, technique) in geometry.groups.iter().zip(geometry.techniques.iter()) {
            lines.push(format!(
                "group: technique={} start={} count={} objects={} params={}",
                group.technique_index,
                group.start,
                group.count,
                group.objects.len(),
                serde_json::to_string(technique).unwrap_or_default()
            ));
        }
    }
    for text in tile.text_geometries.iter() {
        lines.push(format!(
            "text: technique={} labels={} size={}",
            text.technique_index,
            text.texts.len(),
            text.style.size
        ));
    }
    if let Some(info) = tile.tile_info.as_ref() {
        lines.push(format!("tile_info: features={}", info.len()));
    }
    lines
}

pub fn decode_ndjson_lines(tile: &DecodedTile) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    lines.push(serde_json::to_string(&json!({
        "type": "summary",
        "tile": tile.tile_key,
        "center": tile.center,
        "stats": tile.stats,
    }))?);

    for geometry in tile.geometries.iter() {
        lines.push(serde_json::to_string(&json!({
            "type": "geometry",
            "kind": geometry.kind,
            "vertices": geometry.positions.len(),
            "primitives": geometry.primitive_count(),
            "groups": geometry.groups,
            "techniques": geometry.techniques,
            "objInfos": geometry.obj_infos,
        }))?);
    }

    for text in tile.text_geometries.iter() {
        lines.push(serde_json::to_string(&json!({
            "type": "text",
            "technique_index": text.technique_index,
            "style": text.style,
            "texts": text.texts,
            "objInfos": text.obj_infos,
        }))?);
    }

    if let Some(info) = tile.tile_info.as_ref() {
        let counts: BTreeMap<&str, usize> = info
            .counts
            .iter()
            .map(|(kind, count)| (kind.as_str(), *count))
            .collect();
        lines.push(serde_json::to_string(&json!({
            "type": "tile_info",
            "features": info.len(),
            "counts": counts,
        }))?);
    }

    Ok(lines)
}

pub fn pick_text_lines(results: &[PickResult]) -> Vec<String> {
    if results.is_empty() {
        return vec!["no features".to_string()];
    }
    results
        .iter()
        .map(|result| {
            let properties = serde_json::to_string(&result.user_data.properties).unwrap_or_default();
            format!(
                "hit: tile={} kind={} id={} distance={:.1} properties={}",
                result.tile,
                result.kind.as_str(),
                result.feature_id(),
                result.distance,
                properties
            )
        })
        .collect()
}

pub fn pick_ndjson_lines(results: &[PickResult]) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for result in results.iter() {
        lines.push(serde_json::to_string(&json!({
            "type": "hit",
            "result": result,
        }))?);
    }
    Ok(lines)
}
