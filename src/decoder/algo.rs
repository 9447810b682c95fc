use geo_types::{Coord, LineString, Polygon};
use hilbert_2d::{Variant, xy2h_discrete};

use crate::decoder::types::TileKey;
use crate::error::GrouperError;

pub const EARTH_RADIUS: f64 = 6_378_137.0;
pub const EARTH_CIRCUMFERENCE: f64 = 2.0 * std::f64::consts::PI * EARTH_RADIUS;
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

pub fn tile_id_from_xyz(z: u8, x: u32, y: u32) -> u64 {
    if z == 0 {
        return 0;
    }
    let order = z as usize;
    let hilbert = xy2h_discrete(x as usize, y as usize, order, Variant::Hilbert) as u64;
    let base_id = (pow4(z) - 1) / 3;
    base_id + hilbert
}

pub fn pow4(z: u8) -> u64 {
    1u64.checked_shl(2 * z as u32).unwrap_or(u64::MAX)
}

pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

pub fn lon_lat_to_world(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

pub fn world_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

pub fn world_to_tile_local(tile: TileKey, extent: u32, x: f64, y: f64) -> Coord<f64> {
    let (west, _, _, north) = tile.world_bounds();
    let scale = extent as f64 / tile.size();
    Coord {
        x: (x - west) * scale,
        y: (north - y) * scale,
    }
}

pub fn tile_local_to_center_relative(tile: TileKey, extent: u32, coord: Coord<f64>) -> [f64; 3] {
    let size = tile.size();
    let scale = size / extent as f64;
    [
        coord.x * scale - size / 2.0,
        size / 2.0 - coord.y * scale,
        0.0,
    ]
}

pub fn ring_coords(line: &LineString<f64>) -> &[Coord<f64>] {
    let coords = line.0.as_slice();
    if coords.len() > 1 && coords.first() == coords.last() {
        &coords[..coords.len() - 1]
    } else {
        coords
    }
}

pub fn triangulate_polygon(
    polygon: &Polygon<f64>,
) -> Result<(Vec<Coord<f64>>, Vec<usize>), GrouperError> {
    let mut vertices: Vec<Coord<f64>> = Vec::new();
    let mut hole_indices = Vec::with_capacity(polygon.interiors().len());

    vertices.extend_from_slice(ring_coords(polygon.exterior()));
    for ring in polygon.interiors() {
        hole_indices.push(vertices.len());
        vertices.extend_from_slice(ring_coords(ring));
    }

    let mut data = Vec::with_capacity(vertices.len() * 2);
    for coord in vertices.iter() {
        data.push(coord.x);
        data.push(coord.y);
    }
    let triangles = earcutr::earcut(&data, &hole_indices, 2)
        .map_err(|err| GrouperError::Triangulation(format!("{err:?}")))?;
    Ok((vertices, triangles))
}
