use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decoder::types::Attributes;

pub type Position = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<GeoJsonGeometry> },
}

impl GeoJsonGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            GeoJsonGeometry::Point { .. } => "Point",
            GeoJsonGeometry::MultiPoint { .. } => "MultiPoint",
            GeoJsonGeometry::LineString { .. } => "LineString",
            GeoJsonGeometry::MultiLineString { .. } => "MultiLineString",
            GeoJsonGeometry::Polygon { .. } => "Polygon",
            GeoJsonGeometry::MultiPolygon { .. } => "MultiPolygon",
            GeoJsonGeometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        self.visit_positions(&mut |position: &Position| {
            if position.len() < 2 {
                return;
            }
            let (lon, lat) = (position[0], position[1]);
            bounds = Some(match bounds {
                None => (lon, lat, lon, lat),
                Some((a, b, c, d)) => (a.min(lon), b.min(lat), c.max(lon), d.max(lat)),
            });
        });
        bounds
    }

    fn visit_positions(&self, visit: &mut dyn FnMut(&Position)) {
        match self {
            GeoJsonGeometry::Point { coordinates } => visit(coordinates),
            GeoJsonGeometry::MultiPoint { coordinates }
            | GeoJsonGeometry::LineString { coordinates } => coordinates.iter().for_each(visit),
            GeoJsonGeometry::MultiLineString { coordinates }
            | GeoJsonGeometry::Polygon { coordinates } => {
                coordinates.iter().flatten().for_each(visit)
            }
            GeoJsonGeometry::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().flatten().for_each(visit)
            }
            GeoJsonGeometry::GeometryCollection { geometries } => {
                for geometry in geometries {
                    geometry.visit_positions(visit);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonFeature {
    #[serde(default = "feature_type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    pub properties: Option<Attributes>,
}

fn feature_type() -> String {
    "Feature".to_string()
}

impl GeoJsonFeature {
    pub fn new(geometry: GeoJsonGeometry, properties: Attributes) -> Self {
        Self {
            r#type: feature_type(),
            id: None,
            geometry: Some(geometry),
            properties: Some(properties),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default = "collection_type")]
    pub r#type: String,
    pub features: Vec<GeoJsonFeature>,
}

fn collection_type() -> String {
    "FeatureCollection".to_string()
}

impl FeatureCollection {
    pub fn new(features: Vec<GeoJsonFeature>) -> Self {
        Self {
            r#type: collection_type(),
            features,
        }
    }
}

pub fn parse_geojson(bytes: &[u8]) -> serde_json::Result<FeatureCollection> {
    let value: Value = serde_json::from_slice(bytes)?;
    match value.get("type").and_then(Value::as_str) {
        Some("Feature") => {
            let feature: GeoJsonFeature = serde_json::from_value(value)?;
            Ok(FeatureCollection::new(vec![feature]))
        }
        Some("FeatureCollection") | None => serde_json::from_value(value),
        Some(_) => {
            let geometry: GeoJsonGeometry = serde_json::from_value(value)?;
            Ok(FeatureCollection::new(vec![GeoJsonFeature::new(
                geometry,
                Attributes::new(),
            )]))
        }
    }
}
