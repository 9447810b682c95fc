use nalgebra::{Point2, Point3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::Camera;
use crate::decoder::types::{
    DecodedTile, Geometry, GeometryKind, ObjectInfoRef, TechniqueParams, TextGeometry, TileKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneOptions {
    /// Minimum pickable line width in pixels; thin lines would otherwise
    /// be unpickable at low zoom.
    pub line_pick_tolerance: f64,
    pub glyph_width_ratio: f64,
    pub tile_backgrounds: bool,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            line_pick_tolerance: 2.0,
            glyph_width_ratio: 0.6,
            tile_backgrounds: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Triangles(Vec<[Point3<f64>; 3]>),
    Segments {
        segments: Vec<[Point3<f64>; 2]>,
        half_width: f64,
    },
    Points {
        points: Vec<Point3<f64>>,
        size: f64,
    },
    Label {
        anchor: Point3<f64>,
        width: f64,
        height: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub source: usize,
    pub tile: TileKey,
    pub kind: Option<GeometryKind>,
    pub primitive: Primitive,
    pub user_data: Option<ObjectInfoRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    pub object: usize,
    pub source: usize,
    pub tile: TileKey,
    pub distance: f64,
    pub point: Point3<f64>,
    pub user_data: Option<ObjectInfoRef>,
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    options: SceneOptions,
    objects: Vec<SceneObject>,
}

fn world(center: &[f64; 3], position: &[f64; 3]) -> Point3<f64> {
    Point3::new(
        center[0] + position[0],
        center[1] + position[1],
        center[2] + position[2],
    )
}

fn distance_to_segment(p: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    let ab = b - a;
    let length_sq = ab.norm_squared();
    if length_sq == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / length_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

fn in_screen_box(screen: Point2<f64>, center: Point2<f64>, width: f64, height: f64) -> bool {
    (screen.x - center.x).abs() <= width / 2.0 && (screen.y - center.y).abs() <= height / 2.0
}

impl Scene {
    pub fn new(options: SceneOptions) -> Self {
        Self {
            options,
            objects: Vec::new(),
        }
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn add_decoration(&mut self, source: usize, tile: TileKey, primitive: Primitive) {
        self.objects.push(SceneObject {
            source,
            tile,
            kind: None,
            primitive,
            user_data: None,
        });
    }

    pub fn add_tile(&mut self, source: usize, decoded: &DecodedTile) -> usize {
        let tile = decoded.tile_key;
        if self.options.tile_backgrounds {
            let (west, south, east, north) = tile.world_bounds();
            let corners = [
                Point3::new(west, south, 0.0),
                Point3::new(east, south, 0.0),
                Point3::new(east, north, 0.0),
                Point3::new(west, north, 0.0),
            ];
            self.add_decoration(
                source,
                tile,
                Primitive::Triangles(vec![
                    [corners[0], corners[1], corners[2]],
                    [corners[0], corners[2], corners[3]],
                ]),
            );
        }

        let before = self.objects.len();
        for (index, geometry) in decoded.geometries.iter().enumerate() {
            for object in 0..geometry.obj_infos.len() {
                let Some(primitive) = mesh_primitive(&decoded.center, geometry, object) else {
                    continue;
                };
                self.objects.push(SceneObject {
                    source,
                    tile,
                    kind: Some(geometry.kind),
                    primitive,
                    user_data: Some(ObjectInfoRef {
                        tile,
                        kind: geometry.kind,
                        geometry: index,
                        object,
                    }),
                });
            }
        }
        for (index, text) in decoded.text_geometries.iter().enumerate() {
            for object in 0..text.obj_infos.len() {
                let Some(primitive) = self.label_primitive(&decoded.center, text, object) else {
                    continue;
                };
                self.objects.push(SceneObject {
                    source,
                    tile,
                    kind: Some(GeometryKind::Text),
                    primitive,
                    user_data: Some(ObjectInfoRef {
                        tile,
                        kind: GeometryKind::Text,
                        geometry: index,
                        object,
                    }),
                });
            }
        }
        let added = self.objects.len() - before;
        debug!(source, tile = %tile, objects = added, "added tile to scene");
        added
    }

    pub fn remove_tile(&mut self, source: usize, tile: TileKey) -> usize {
        let before = self.objects.len();
        self.objects
            .retain(|object| !(object.source == source && object.tile == tile));
        let removed = before - self.objects.len();
        if removed > 0 {
            debug!(source, tile = %tile, objects = removed, "removed tile from scene");
        }
        removed
    }

    fn label_primitive(&self, center: &[f64; 3], text: &TextGeometry, object: usize) -> Option<Primitive> {
        let anchor = world(center, text.positions.get(object)?);
        let glyphs = text.texts.get(object)?.chars().count() as f64;
        Some(Primitive::Label {
            anchor,
            width: glyphs * text.style.size * self.options.glyph_width_ratio,
            height: text.style.size,
        })
    }

    pub fn intersect(&self, camera: &dyn Camera, x: f64, y: f64) -> Vec<Intersection> {
        let ray = camera.ray(x, y);
        let eye = camera.position();
        let screen = Point2::new(x, y);
        let tolerance = self.options.line_pick_tolerance;

        let mut hits: Vec<Intersection> = self
            .objects
            .par_iter()
            .enumerate()
            .filter_map(|(index, object)| {
                let (distance, point) = match &object.primitive {
                    Primitive::Triangles(triangles) => triangles
                        .iter()
                        .filter_map(|[a, b, c]| ray.intersect_triangle(a, b, c))
                        .min_by(f64::total_cmp)
                        .map(|t| (t, ray.at(t)))?,
                    Primitive::Segments {
                        segments,
                        half_width,
                    } => segments
                        .iter()
                        .filter_map(|[a, b]| {
                            let t = ray.intersect_plane_z(a.z)?;
                            let hit = ray.at(t);
                            let reach = half_width.max(0.5 * tolerance * camera.world_per_pixel(t));
                            let off = distance_to_segment(hit.xy(), a.xy(), b.xy());
                            (off <= reach).then_some((t, hit))
                        })
                        .min_by(|a, b| a.0.total_cmp(&b.0))?,
                    Primitive::Points { points, size } => points
                        .iter()
                        .filter(|point| {
                            camera
                                .project(point)
                                .is_some_and(|center| in_screen_box(screen, center, *size, *size))
                        })
                        .map(|point| ((point - eye).norm(), *point))
                        .min_by(|a, b| a.0.total_cmp(&b.0))?,
                    Primitive::Label {
                        anchor,
                        width,
                        height,
                    } => {
                        let center = camera.project(anchor)?;
                        if !in_screen_box(screen, center, *width, *height) {
                            return None;
                        }
                        ((anchor - eye).norm(), *anchor)
                    }
                };
                Some(Intersection {
                    object: index,
                    source: object.source,
                    tile: object.tile,
                    distance,
                    point,
                    user_data: object.user_data,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

fn mesh_primitive(center: &[f64; 3], geometry: &Geometry, object: usize) -> Option<Primitive> {
    let range = geometry.object_index_range(object)?;
    let group = geometry
        .groups
        .iter()
        .position(|group| group.objects.contains(&object))?;
    let vertex = |i: &u32| {
        geometry
            .positions
            .get(*i as usize)
            .map(|position| world(center, position))
    };
    let indices = geometry.indices.get(range)?;

    match (geometry.kind, geometry.techniques.get(group)?) {
        (GeometryKind::Polygon, _) => {
            let triangles = indices
                .chunks_exact(3)
                .map(|tri| Some([vertex(&tri[0])?, vertex(&tri[1])?, vertex(&tri[2])?]))
                .collect::<Option<Vec<_>>>()?;
            Some(Primitive::Triangles(triangles))
        }
        (GeometryKind::SolidLine, params) => {
            let line_width = match params {
                TechniqueParams::SolidLine { line_width, .. } => *line_width,
                _ => 0.0,
            };
            let segments = indices
                .chunks_exact(2)
                .map(|seg| Some([vertex(&seg[0])?, vertex(&seg[1])?]))
                .collect::<Option<Vec<_>>>()?;
            Some(Primitive::Segments {
                segments,
                half_width: line_width / 2.0,
            })
        }
        (GeometryKind::Point, params) => {
            let size = match params {
                TechniqueParams::Circle { size, .. } => *size,
                _ => 0.0,
            };
            let points = indices.iter().map(vertex).collect::<Option<Vec<_>>>()?;
            Some(Primitive::Points { points, size })
        }
        (GeometryKind::Text, _) => None,
    }
}
