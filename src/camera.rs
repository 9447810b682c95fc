use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::decoder::algo::{EARTH_CIRCUMFERENCE, lon_lat_to_world};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn to_world(&self) -> Point3<f64> {
        let (x, y) = lon_lat_to_world(self.longitude, self.latitude);
        Point3::new(x, y, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Vector3<f64>,
}

impl Ray {
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }

    pub fn intersect_plane_z(&self, height: f64) -> Option<f64> {
        if self.direction.z.abs() < f64::EPSILON {
            return None;
        }
        let t = (height - self.origin.z) / self.direction.z;
        (t >= 0.0).then_some(t)
    }

    pub fn intersect_triangle(&self, a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<f64> {
        let edge1 = b - a;
        let edge2 = c - a;
        let p = self.direction.cross(&edge2);
        let det = edge1.dot(&p);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let s = self.origin - a;
        let u = s.dot(&p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(&edge1);
        let v = self.direction.dot(&q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(&q) * inv_det;
        (t >= 0.0).then_some(t)
    }
}

pub trait Camera: Send + Sync {
    fn viewport(&self) -> (f64, f64);

    fn position(&self) -> Point3<f64>;

    fn ray(&self, x: f64, y: f64) -> Ray;

    fn project(&self, world: &Point3<f64>) -> Option<Point2<f64>>;

    fn world_per_pixel(&self, depth: f64) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapCamera {
    width: f64,
    height: f64,
    fov_y: f64,
    target: Point3<f64>,
    distance: f64,
}

pub const TILE_PIXELS: f64 = 256.0;

impl MapCamera {
    pub fn new(width: f64, height: f64, fov_y_degrees: f64) -> Self {
        let mut camera = Self {
            width,
            height,
            fov_y: fov_y_degrees.to_radians(),
            target: Point3::origin(),
            distance: 1.0,
        };
        camera.look_at(GeoCoordinates::new(0.0, 0.0), 0.0);
        camera
    }

    fn tan_half_fov(&self) -> f64 {
        (self.fov_y / 2.0).tan()
    }

    pub fn look_at(&mut self, target: GeoCoordinates, zoom_level: f64) {
        let meters_per_pixel = EARTH_CIRCUMFERENCE / (TILE_PIXELS * 2f64.powf(zoom_level));
        self.target = target.to_world();
        self.distance = (self.height / 2.0) / self.tan_half_fov() * meters_per_pixel;
    }

    pub fn target(&self) -> Point3<f64> {
        self.target
    }

    pub fn zoom_level(&self) -> f64 {
        let meters_per_pixel = self.world_per_pixel(self.distance);
        (EARTH_CIRCUMFERENCE / (TILE_PIXELS * meters_per_pixel)).log2()
    }

    pub fn screen_position(&self, geo: GeoCoordinates) -> Option<Point2<f64>> {
        self.project(&geo.to_world())
    }
}

impl Camera for MapCamera {
    fn viewport(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn position(&self) -> Point3<f64> {
        Point3::new(self.target.x, self.target.y, self.distance)
    }

    fn ray(&self, x: f64, y: f64) -> Ray {
        let aspect = self.width / self.height;
        let ndc_x = (x / self.width) * 2.0 - 1.0;
        let ndc_y = 1.0 - (y / self.height) * 2.0;
        let tan = self.tan_half_fov();
        let direction = Vector3::new(ndc_x * tan * aspect, ndc_y * tan, -1.0).normalize();
        Ray {
            origin: self.position(),
            direction,
        }
    }

    fn project(&self, world: &Point3<f64>) -> Option<Point2<f64>> {
        let relative = world - self.position();
        let depth = -relative.z;
        if depth <= 0.0 {
            return None;
        }
        let aspect = self.width / self.height;
        let tan = self.tan_half_fov();
        let ndc_x = relative.x / (depth * tan * aspect);
        let ndc_y = relative.y / (depth * tan);
        Some(Point2::new(
            (ndc_x + 1.0) / 2.0 * self.width,
            (1.0 - ndc_y) / 2.0 * self.height,
        ))
    }

    fn world_per_pixel(&self, depth: f64) -> f64 {
        2.0 * depth * self.tan_half_fov() / self.height
    }
}
