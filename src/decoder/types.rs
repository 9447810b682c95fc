use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::decoder::algo::{EARTH_CIRCUMFERENCE, splitmix64, tile_id_from_xyz};

pub const DEFAULT_EXTENT: u32 = 4096;
pub const MAX_ZOOM: u8 = 30;

pub type Attributes = Map<String, Value>;

pub type FeatureId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileKey {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    pub fn is_valid(&self) -> bool {
        if self.zoom > MAX_ZOOM {
            return false;
        }
        let tiles_per_axis = 1u32 << self.zoom;
        self.x < tiles_per_axis && self.y < tiles_per_axis
    }

    pub fn tile_id(&self) -> u64 {
        tile_id_from_xyz(self.zoom, self.x, self.y)
    }

    pub fn size(&self) -> f64 {
        EARTH_CIRCUMFERENCE / 2f64.powi(self.zoom as i32)
    }

    pub fn world_bounds(&self) -> (f64, f64, f64, f64) {
        let size = self.size();
        let half = EARTH_CIRCUMFERENCE / 2.0;
        let west = -half + self.x as f64 * size;
        let north = half - self.y as f64 * size;
        (west, north - size, west + size, north)
    }

    pub fn world_center(&self) -> [f64; 3] {
        let (west, south, east, north) = self.world_bounds();
        [(west + east) / 2.0, (south + north) / 2.0, 0.0]
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

pub fn feature_id(tile: TileKey, ordinal: usize) -> FeatureId {
    splitmix64(tile.tile_id() ^ (ordinal as u64).rotate_left(32))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeometryKind {
    Point,
    SolidLine,
    Polygon,
    Text,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::SolidLine => "solid-line",
            GeometryKind::Polygon => "polygon",
            GeometryKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectInfo {
    #[serde(rename = "$id")]
    pub feature_id: FeatureId,
    #[serde(skip)]
    pub ordinal: usize,
    #[serde(flatten)]
    pub properties: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub start: usize,
    pub count: usize,
    pub technique_index: usize,
    pub objects: Range<usize>,
}

impl Group {
    pub fn index_range(&self) -> Range<usize> {
        self.start..self.start + self.count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "technique", rename_all = "kebab-case")]
pub enum TechniqueParams {
    Fill { color: String },
    SolidLine { color: String, line_width: f64 },
    Circle { color: String, size: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geometry {
    pub kind: GeometryKind,
    pub positions: Vec<[f64; 3]>,
    /// Triangles for polygons, segment pairs for lines, one index per point.
    pub indices: Vec<u32>,
    pub groups: Vec<Group>,
    pub techniques: Vec<TechniqueParams>,
    #[serde(rename = "objInfos")]
    pub obj_infos: Vec<Arc<ObjectInfo>>,
    /// Index-buffer offset where the span of `obj_infos[i]` starts.
    pub feature_starts: Vec<usize>,
}

impl Geometry {
    pub fn group_obj_infos(&self, group: usize) -> &[Arc<ObjectInfo>] {
        match self.groups.get(group) {
            Some(g) => &self.obj_infos[g.objects.clone()],
            None => &[],
        }
    }

    pub fn object_index_range(&self, object: usize) -> Option<Range<usize>> {
        let start = *self.feature_starts.get(object)?;
        let group = self.groups.iter().find(|g| g.objects.contains(&object))?;
        let end = if object + 1 < group.objects.end {
            self.feature_starts[object + 1]
        } else {
            group.start + group.count
        };
        Some(start..end)
    }

    pub fn primitive_count(&self) -> usize {
        let per = match self.kind {
            GeometryKind::Polygon => 3,
            GeometryKind::SolidLine => 2,
            GeometryKind::Point | GeometryKind::Text => 1,
        };
        self.indices.len() / per
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub size: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextGeometry {
    pub positions: Vec<[f64; 3]>,
    pub texts: Vec<String>,
    pub style: TextStyle,
    pub technique_index: usize,
    #[serde(rename = "objInfos")]
    pub obj_infos: Vec<Arc<ObjectInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TileInfo {
    pub features: HashMap<FeatureId, Arc<ObjectInfo>>,
    pub counts: HashMap<GeometryKind, usize>,
}

impl TileInfo {
    pub fn get(&self, id: FeatureId) -> Option<&Arc<ObjectInfo>> {
        self.features.get(&id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    pub input_features: usize,
    pub skipped_invalid: usize,
    pub skipped_unstyled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedTile {
    pub tile_key: TileKey,
    pub center: [f64; 3],
    pub geometries: Vec<Geometry>,
    #[serde(rename = "textGeometries")]
    pub text_geometries: Vec<TextGeometry>,
    #[serde(rename = "tileInfo", skip_serializing_if = "Option::is_none")]
    pub tile_info: Option<TileInfo>,
    pub stats: DecodeStats,
}

impl DecodedTile {
    pub fn geometry(&self, kind: GeometryKind) -> Option<&Geometry> {
        self.geometries.iter().find(|geometry| geometry.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty() && self.text_geometries.is_empty()
    }

    pub fn object_info(&self, reference: &ObjectInfoRef) -> Option<&Arc<ObjectInfo>> {
        if reference.tile != self.tile_key {
            return None;
        }
        match reference.kind {
            GeometryKind::Text => self
                .text_geometries
                .get(reference.geometry)?
                .obj_infos
                .get(reference.object),
            _ => self
                .geometries
                .get(reference.geometry)?
                .obj_infos
                .get(reference.object),
        }
    }
}

/// Index triple into a [`DecodedTile`]; what scene objects carry as user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectInfoRef {
    pub tile: TileKey,
    pub kind: GeometryKind,
    pub geometry: usize,
    pub object: usize,
}
