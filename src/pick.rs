use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::decoder::types::{DecodedTile, FeatureId, GeometryKind, ObjectInfo, ObjectInfoRef, TileKey};
use crate::scene::Intersection;

#[derive(Debug, Clone, Serialize)]
pub struct PickResult {
    pub source: usize,
    pub tile: TileKey,
    pub kind: GeometryKind,
    pub distance: f64,
    pub point: [f64; 3],
    #[serde(skip)]
    pub object: ObjectInfoRef,
    #[serde(rename = "userData")]
    pub user_data: Arc<ObjectInfo>,
}

impl PickResult {
    pub fn feature_id(&self) -> FeatureId {
        self.user_data.feature_id
    }
}

pub fn resolve_intersections<'a, F>(intersections: &[Intersection], lookup: F) -> Vec<PickResult>
where
    F: Fn(usize, TileKey) -> Option<&'a Arc<DecodedTile>>,
{
    let mut seen: HashSet<(usize, TileKey, FeatureId)> = HashSet::new();
    let mut ordered: Vec<&Intersection> = intersections.iter().collect();
    ordered.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    ordered
        .into_iter()
        .filter_map(|hit| {
            let reference = hit.user_data?;
            let decoded = lookup(hit.source, reference.tile)?;
            let info = decoded.object_info(&reference)?;
            seen.insert((hit.source, reference.tile, info.feature_id))
                .then(|| PickResult {
                    source: hit.source,
                    tile: reference.tile,
                    kind: reference.kind,
                    distance: hit.distance,
                    point: [hit.point.x, hit.point.y, hit.point.z],
                    object: reference,
                    user_data: Arc::clone(info),
                })
        })
        .collect()
}
