use std::sync::Arc;

use geo_types::Coord;

use crate::decoder::algo::{tile_local_to_center_relative, triangulate_polygon};
use crate::decoder::ingest::Shape;
use crate::decoder::types::{
    Geometry, GeometryKind, Group, ObjectInfo, TechniqueParams, TextGeometry, TextStyle, TileKey,
};
use crate::error::GrouperError;

#[derive(Debug)]
struct Bucket {
    kind: GeometryKind,
    technique_index: usize,
    params: TechniqueParams,
    positions: Vec<[f64; 3]>,
    indices: Vec<u32>,
    obj_infos: Vec<Arc<ObjectInfo>>,
    feature_starts: Vec<usize>,
}

impl Bucket {
    fn begin_object(&mut self, info: &Arc<ObjectInfo>) {
        let same_feature = self
            .obj_infos
            .last()
            .is_some_and(|last| last.feature_id == info.feature_id);
        if !same_feature {
            self.obj_infos.push(Arc::clone(info));
            self.feature_starts.push(self.indices.len());
        }
    }
}

#[derive(Debug)]
struct TextBucket {
    technique_index: usize,
    style: TextStyle,
    positions: Vec<[f64; 3]>,
    texts: Vec<String>,
    obj_infos: Vec<Arc<ObjectInfo>>,
}

#[derive(Debug, Default)]
pub struct GroupedGeometries {
    pub geometries: Vec<Geometry>,
    pub text_geometries: Vec<TextGeometry>,
}

#[derive(Debug)]
pub struct GeometryGrouper {
    tile: TileKey,
    extent: u32,
    buckets: Vec<Bucket>,
    text_buckets: Vec<TextBucket>,
    finalized: bool,
}

fn expected_kind(shape: &Shape) -> GeometryKind {
    match shape {
        Shape::Point(_) => GeometryKind::Point,
        Shape::Line(_) => GeometryKind::SolidLine,
        Shape::Polygon(_) => GeometryKind::Polygon,
    }
}

impl GeometryGrouper {
    pub fn new(tile: TileKey, extent: u32) -> Self {
        Self {
            tile,
            extent,
            buckets: Vec::new(),
            text_buckets: Vec::new(),
            finalized: false,
        }
    }

    fn position(&self, coord: Coord<f64>) -> [f64; 3] {
        tile_local_to_center_relative(self.tile, self.extent, coord)
    }

    pub fn add(
        &mut self,
        kind: GeometryKind,
        technique_index: usize,
        params: &TechniqueParams,
        shape: &Shape,
        info: &Arc<ObjectInfo>,
    ) -> Result<(), GrouperError> {
        if self.finalized {
            return Err(GrouperError::Finalized(kind));
        }
        if kind == GeometryKind::Text || expected_kind(shape) != kind {
            return Err(GrouperError::KindMismatch {
                kind,
                shape: shape.name(),
            });
        }

        // Build local buffers first so a triangulation failure leaves the bucket intact.
        let (projected, local_indices): (Vec<[f64; 3]>, Vec<u32>) = match shape {
            Shape::Point(coord) => (vec![self.position(*coord)], vec![0]),
            Shape::Line(line) => {
                let positions = line.0.iter().map(|c| self.position(*c)).collect();
                let segments = (1..line.0.len() as u32)
                    .flat_map(|i| [i - 1, i])
                    .collect();
                (positions, segments)
            }
            Shape::Polygon(polygon) => {
                let (vertices, triangles) = triangulate_polygon(polygon)?;
                if triangles.is_empty() {
                    return Err(GrouperError::Degenerate(shape.name()));
                }
                let positions = vertices.iter().map(|c| self.position(*c)).collect();
                (positions, triangles.into_iter().map(|i| i as u32).collect())
            }
        };

        let slot = match self
            .buckets
            .iter()
            .position(|b| b.kind == kind && b.technique_index == technique_index)
        {
            Some(slot) => slot,
            None => {
                self.buckets.push(Bucket {
                    kind,
                    technique_index,
                    params: params.clone(),
                    positions: Vec::new(),
                    indices: Vec::new(),
                    obj_infos: Vec::new(),
                    feature_starts: Vec::new(),
                });
                self.buckets.len() - 1
            }
        };
        let bucket = &mut self.buckets[slot];
        bucket.begin_object(info);

        let base = bucket.positions.len() as u32;
        bucket.positions.extend(projected);
        bucket.indices.extend(local_indices.into_iter().map(|i| base + i));
        Ok(())
    }

    pub fn add_label(
        &mut self,
        technique_index: usize,
        style: &TextStyle,
        anchor: Coord<f64>,
        text: String,
        info: &Arc<ObjectInfo>,
    ) -> Result<(), GrouperError> {
        if self.finalized {
            return Err(GrouperError::Finalized(GeometryKind::Text));
        }
        let position = self.position(anchor);
        let slot = match self
            .text_buckets
            .iter()
            .position(|b| b.technique_index == technique_index)
        {
            Some(slot) => slot,
            None => {
                self.text_buckets.push(TextBucket {
                    technique_index,
                    style: style.clone(),
                    positions: Vec::new(),
                    texts: Vec::new(),
                    obj_infos: Vec::new(),
                });
                self.text_buckets.len() - 1
            }
        };
        let bucket = &mut self.text_buckets[slot];
        bucket.positions.push(position);
        bucket.texts.push(text);
        bucket.obj_infos.push(Arc::clone(info));
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<GroupedGeometries, GrouperError> {
        if self.finalized {
            return Err(GrouperError::AlreadyFinalized);
        }
        self.finalized = true;

        let mut geometries: Vec<Geometry> = Vec::new();
        for bucket in std::mem::take(&mut self.buckets) {
            let slot = match geometries.iter().position(|g| g.kind == bucket.kind) {
                Some(slot) => slot,
                None => {
                    geometries.push(Geometry {
                        kind: bucket.kind,
                        positions: Vec::new(),
                        indices: Vec::new(),
                        groups: Vec::new(),
                        techniques: Vec::new(),
                        obj_infos: Vec::new(),
                        feature_starts: Vec::new(),
                    });
                    geometries.len() - 1
                }
            };
            let geometry = &mut geometries[slot];
            let vertex_base = geometry.positions.len() as u32;
            let index_base = geometry.indices.len();
            let object_base = geometry.obj_infos.len();

            geometry.positions.extend(bucket.positions);
            geometry
                .indices
                .extend(bucket.indices.iter().map(|i| vertex_base + i));
            geometry
                .feature_starts
                .extend(bucket.feature_starts.iter().map(|start| index_base + start));
            geometry.obj_infos.extend(bucket.obj_infos);
            geometry.groups.push(Group {
                start: index_base,
                count: bucket.indices.len(),
                technique_index: bucket.technique_index,
                objects: object_base..geometry.obj_infos.len(),
            });
            geometry.techniques.push(bucket.params);
        }

        let text_geometries = std::mem::take(&mut self.text_buckets)
            .into_iter()
            .map(|bucket| TextGeometry {
                positions: bucket.positions,
                texts: bucket.texts,
                style: bucket.style,
                technique_index: bucket.technique_index,
                obj_infos: bucket.obj_infos,
            })
            .collect();

        Ok(GroupedGeometries {
            geometries,
            text_geometries,
        })
    }
}
