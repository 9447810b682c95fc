use std::sync::Arc;

use geo_types::{Coord, LineString, Polygon};
use tracing::warn;

use crate::decoder::algo::{lon_lat_to_world, world_to_tile_local};
use crate::decoder::types::{Attributes, TileKey};
use crate::error::IngestError;
use crate::geojson::{GeoJsonFeature, GeoJsonGeometry, Position};

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Coord<f64>),
    Line(LineString<f64>),
    Polygon(Polygon<f64>),
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Point(_) => "point",
            Shape::Line(_) => "line",
            Shape::Polygon(_) => "polygon",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGeometry {
    pub ordinal: usize,
    pub shape: Shape,
    pub properties: Arc<Attributes>,
}

// Shoelace over a closed ring, compared against the rounding error of its terms.
fn ring_has_area(coords: &[Coord<f64>]) -> bool {
    let (area, magnitude) = coords.windows(2).fold((0.0, 0.0), |(area, magnitude), pair| {
        let (a, b) = (pair[0].x * pair[1].y, pair[1].x * pair[0].y);
        (area + a - b, magnitude + a.abs() + b.abs())
    });
    area.abs() > magnitude * f64::EPSILON * 8.0
}

struct Projector {
    tile: TileKey,
    extent: u32,
    ordinal: usize,
}

impl Projector {
    fn position(&self, position: &Position) -> Result<Coord<f64>, IngestError> {
        if position.len() < 2 {
            return Err(IngestError::invalid_geometry(
                self.ordinal,
                format!("position has {} ordinates", position.len()),
            ));
        }
        let (lon, lat) = (position[0], position[1]);
        if !lon.is_finite() || !lat.is_finite() {
            return Err(IngestError::invalid_geometry(
                self.ordinal,
                "non-finite coordinate",
            ));
        }
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(IngestError::invalid_geometry(
                self.ordinal,
                format!("coordinate out of range: [{lon}, {lat}]"),
            ));
        }
        let (x, y) = lon_lat_to_world(lon, lat);
        Ok(world_to_tile_local(self.tile, self.extent, x, y))
    }

    fn line(&self, positions: &[Position]) -> Result<LineString<f64>, IngestError> {
        if positions.len() < 2 {
            return Err(IngestError::invalid_geometry(
                self.ordinal,
                format!("line string needs 2 positions, got {}", positions.len()),
            ));
        }
        let coords = positions
            .iter()
            .map(|position| self.position(position))
            .collect::<Result<Vec<_>, _>>()?;
        if !coords.windows(2).any(|pair| pair[0] != pair[1]) {
            return Err(IngestError::invalid_geometry(
                self.ordinal,
                "line string has no length",
            ));
        }
        Ok(LineString::new(coords))
    }

    fn ring(&self, positions: &[Position]) -> Result<LineString<f64>, IngestError> {
        let mut coords = positions
            .iter()
            .map(|position| self.position(position))
            .collect::<Result<Vec<_>, _>>()?;
        if coords.len() > 1 && coords.first() != coords.last() {
            coords.push(coords[0]);
        }
        if coords.len() < 4 {
            return Err(IngestError::invalid_geometry(
                self.ordinal,
                format!("polygon ring needs 4 positions, got {}", coords.len()),
            ));
        }
        let mut distinct: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
        for coord in &coords {
            if !distinct.contains(coord) {
                distinct.push(*coord);
            }
        }
        if distinct.len() < 3 || !ring_has_area(&coords) {
            return Err(IngestError::invalid_geometry(
                self.ordinal,
                "polygon ring has no area",
            ));
        }
        Ok(LineString::new(coords))
    }

    fn polygon(&self, rings: &[Vec<Position>]) -> Result<Polygon<f64>, IngestError> {
        let Some((exterior, interiors)) = rings.split_first() else {
            return Err(IngestError::invalid_geometry(self.ordinal, "polygon has no rings"));
        };
        let exterior = self.ring(exterior)?;
        let interiors = interiors
            .iter()
            .map(|ring| self.ring(ring))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Polygon::new(exterior, interiors))
    }

    fn shapes(&self, geometry: &GeoJsonGeometry, out: &mut Vec<Shape>) -> Result<(), IngestError> {
        let empty = || {
            IngestError::invalid_geometry(
                self.ordinal,
                format!("empty {}", geometry.type_name()),
            )
        };
        match geometry {
            GeoJsonGeometry::Point { coordinates } => {
                out.push(Shape::Point(self.position(coordinates)?));
            }
            GeoJsonGeometry::MultiPoint { coordinates } => {
                if coordinates.is_empty() {
                    return Err(empty());
                }
                for position in coordinates {
                    out.push(Shape::Point(self.position(position)?));
                }
            }
            GeoJsonGeometry::LineString { coordinates } => {
                out.push(Shape::Line(self.line(coordinates)?));
            }
            GeoJsonGeometry::MultiLineString { coordinates } => {
                if coordinates.is_empty() {
                    return Err(empty());
                }
                for line in coordinates {
                    out.push(Shape::Line(self.line(line)?));
                }
            }
            GeoJsonGeometry::Polygon { coordinates } => {
                out.push(Shape::Polygon(self.polygon(coordinates)?));
            }
            GeoJsonGeometry::MultiPolygon { coordinates } => {
                if coordinates.is_empty() {
                    return Err(empty());
                }
                for polygon in coordinates {
                    out.push(Shape::Polygon(self.polygon(polygon)?));
                }
            }
            GeoJsonGeometry::GeometryCollection { geometries } => {
                if geometries.is_empty() {
                    return Err(empty());
                }
                for geometry in geometries {
                    self.shapes(geometry, out)?;
                }
            }
        }
        Ok(())
    }
}

pub fn ingest(
    tile: TileKey,
    extent: u32,
    ordinal: usize,
    feature: &GeoJsonFeature,
) -> Result<Vec<NormalizedGeometry>, IngestError> {
    let Some(geometry) = feature.geometry.as_ref() else {
        return Err(IngestError::invalid_geometry(ordinal, "feature has no geometry"));
    };
    let projector = Projector {
        tile,
        extent,
        ordinal,
    };
    let mut shapes = Vec::new();
    projector.shapes(geometry, &mut shapes)?;

    let properties = Arc::new(feature.properties.clone().unwrap_or_default());
    Ok(shapes
        .into_iter()
        .map(|shape| NormalizedGeometry {
            ordinal,
            shape,
            properties: Arc::clone(&properties),
        })
        .collect())
}

pub fn ingest_features(
    tile: TileKey,
    extent: u32,
    features: &[GeoJsonFeature],
) -> (Vec<NormalizedGeometry>, usize) {
    let mut normalized = Vec::with_capacity(features.len());
    let mut skipped = 0usize;
    for (ordinal, feature) in features.iter().enumerate() {
        match ingest(tile, extent, ordinal, feature) {
            Ok(parts) => normalized.extend(parts),
            Err(err) => {
                warn!(tile = %tile, %err, "skipping feature");
                skipped += 1;
            }
        }
    }
    (normalized, skipped)
}
