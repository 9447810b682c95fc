use std::fs;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::decoder::algo::world_to_lon_lat;
use crate::decoder::processing::encode_tile_payload;
use crate::decoder::types::TileKey;
use crate::error::FetchError;
use crate::geojson::{FeatureCollection, GeoJsonFeature, parse_geojson};

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn get_tile(&self, tile: TileKey) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct GeoJsonDataProvider {
    name: String,
    collection: FeatureCollection,
    gzip: bool,
}

impl GeoJsonDataProvider {
    pub fn new(name: impl Into<String>, collection: FeatureCollection) -> Self {
        Self {
            name: name.into(),
            collection,
            gzip: false,
        }
    }

    pub fn from_path(name: impl Into<String>, path: &Path) -> Result<Self, FetchError> {
        let bytes = fs::read(path)
            .map_err(|err| FetchError::Provider(format!("read {}: {err}", path.display())))?;
        let collection = parse_geojson(&bytes)
            .map_err(|err| FetchError::Provider(format!("parse {}: {err}", path.display())))?;
        Ok(Self::new(name, collection))
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features_for_tile(&self, tile: TileKey) -> Vec<GeoJsonFeature> {
        let (west, south, east, north) = tile_lon_lat_bounds(tile);
        self.collection
            .features
            .iter()
            .filter(|feature| {
                match feature.geometry.as_ref().and_then(|geometry| geometry.bbox()) {
                    Some((min_lon, min_lat, max_lon, max_lat)) => {
                        !(max_lon < west || min_lon > east || max_lat < south || min_lat > north)
                    }
                    None => true,
                }
            })
            .cloned()
            .collect()
    }
}

pub fn tile_lon_lat_bounds(tile: TileKey) -> (f64, f64, f64, f64) {
    let (west, south, east, north) = tile.world_bounds();
    let (min_lon, min_lat) = world_to_lon_lat(west, south);
    let (max_lon, max_lat) = world_to_lon_lat(east, north);
    // The root tile reaches the poles as far as GeoJSON is concerned.
    if tile.zoom == 0 {
        return (min_lon, -90.0, max_lon, 90.0);
    }
    (min_lon, min_lat, max_lon, max_lat)
}

#[async_trait]
impl DataProvider for GeoJsonDataProvider {
    async fn get_tile(&self, tile: TileKey) -> Result<Vec<u8>, FetchError> {
        if !tile.is_valid() {
            return Err(FetchError::NotFound(tile.to_string()));
        }
        let features = self.features_for_tile(tile);
        debug!(provider = %self.name, tile = %tile, features = features.len(), "serving tile");
        let bytes = serde_json::to_vec(&FeatureCollection::new(features))
            .map_err(|err| FetchError::Provider(err.to_string()))?;
        encode_tile_payload(&bytes, self.gzip).map_err(|err| FetchError::Provider(err.to_string()))
    }
}
