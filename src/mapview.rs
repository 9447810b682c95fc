use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::camera::{GeoCoordinates, MapCamera};
use crate::decoder::processing::TileDecoder;
use crate::decoder::types::{DecodedTile, TileKey};
use crate::loader::{TileLoader, TileLoaderState};
use crate::pick::{PickResult, resolve_intersections};
use crate::provider::DataProvider;
use crate::scene::{Intersection, Scene, SceneOptions};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapViewOptions {
    pub width: f64,
    pub height: f64,
    pub fov_degrees: f64,
    pub scene: SceneOptions,
}

impl Default for MapViewOptions {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            fov_degrees: 40.0,
            scene: SceneOptions::default(),
        }
    }
}

pub struct DataSource {
    name: String,
    provider: Arc<dyn DataProvider>,
    decoder: Arc<dyn TileDecoder>,
    loaders: BTreeMap<TileKey, Arc<TileLoader>>,
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name)
            .field("loaders", &self.loaders)
            .finish()
    }
}

impl DataSource {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn DataProvider>,
        decoder: Arc<dyn TileDecoder>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            decoder,
            loaders: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loader(&mut self, tile: TileKey) -> Arc<TileLoader> {
        let provider = &self.provider;
        let decoder = &self.decoder;
        Arc::clone(self.loaders.entry(tile).or_insert_with(|| {
            Arc::new(TileLoader::new(tile, Arc::clone(provider), Arc::clone(decoder)))
        }))
    }

    pub fn existing_loader(&self, tile: TileKey) -> Option<&Arc<TileLoader>> {
        self.loaders.get(&tile)
    }

    pub fn loaders(&self) -> impl Iterator<Item = &Arc<TileLoader>> {
        self.loaders.values()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SceneUpdate {
    pub published: usize,
    pub retracted: usize,
}

#[derive(Debug)]
pub struct MapView {
    camera: MapCamera,
    sources: Vec<DataSource>,
    scene: Scene,
    published: HashMap<(usize, TileKey), Arc<DecodedTile>>,
}

impl MapView {
    pub fn new(options: MapViewOptions) -> Self {
        Self {
            camera: MapCamera::new(options.width, options.height, options.fov_degrees),
            sources: Vec::new(),
            scene: Scene::new(options.scene),
            published: HashMap::new(),
        }
    }

    pub fn camera(&self) -> &MapCamera {
        &self.camera
    }

    pub fn look_at(&mut self, target: GeoCoordinates, zoom_level: f64) {
        self.camera.look_at(target, zoom_level);
    }

    pub fn screen_position(&self, geo: GeoCoordinates) -> Option<Point2<f64>> {
        self.camera.screen_position(geo)
    }

    pub fn add_data_source(&mut self, source: DataSource) -> usize {
        info!(name = source.name(), "added data source");
        self.sources.push(source);
        self.sources.len() - 1
    }

    pub fn data_source(&self, source: usize) -> Option<&DataSource> {
        self.sources.get(source)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn published_tile(&self, source: usize, tile: TileKey) -> Option<&Arc<DecodedTile>> {
        self.published.get(&(source, tile))
    }

    pub async fn load_tile(&mut self, source: usize, tile: TileKey) -> Option<TileLoaderState> {
        let loader = self.sources.get_mut(source)?.loader(tile);
        let state = loader.load_and_decode().await;
        self.update_scene();
        Some(state)
    }

    pub async fn load_tiles(
        &mut self,
        source: usize,
        tiles: &[TileKey],
    ) -> Vec<(TileKey, TileLoaderState)> {
        let Some(data_source) = self.sources.get_mut(source) else {
            return Vec::new();
        };
        let loaders: Vec<Arc<TileLoader>> =
            tiles.iter().map(|tile| data_source.loader(*tile)).collect();
        let states = join_all(loaders.iter().map(|loader| loader.load_and_decode())).await;
        self.update_scene();
        tiles.iter().copied().zip(states).collect()
    }

    pub fn cancel_tile(&mut self, source: usize, tile: TileKey) -> Option<TileLoaderState> {
        let state = self.sources.get(source)?.existing_loader(tile)?.cancel();
        self.update_scene();
        Some(state)
    }

    pub fn update_scene(&mut self) -> SceneUpdate {
        let mut update = SceneUpdate::default();
        let mut wanted: HashMap<(usize, TileKey), Option<Arc<DecodedTile>>> = HashMap::new();
        for (index, source) in self.sources.iter().enumerate() {
            for loader in source.loaders() {
                let key = (index, loader.tile_key());
                match loader.state() {
                    TileLoaderState::Ready => {
                        wanted.insert(key, loader.decoded_tile());
                    }
                    TileLoaderState::Loading | TileLoaderState::Decoding => {
                        wanted.insert(key, self.published.get(&key).cloned());
                    }
                    TileLoaderState::Init | TileLoaderState::Error | TileLoaderState::Cancelled => {}
                }
            }
        }

        let stale: Vec<(usize, TileKey)> = self
            .published
            .iter()
            .filter(|(key, current)| match wanted.get(*key) {
                Some(Some(next)) => !Arc::ptr_eq(current, next),
                _ => true,
            })
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            self.published.remove(&key);
            self.scene.remove_tile(key.0, key.1);
            update.retracted += 1;
        }

        for (key, decoded) in wanted {
            let Some(decoded) = decoded else { continue };
            if self.published.contains_key(&key) {
                continue;
            }
            self.scene.add_tile(key.0, &decoded);
            self.published.insert(key, decoded);
            update.published += 1;
        }

        if update != SceneUpdate::default() {
            debug!(
                published = update.published,
                retracted = update.retracted,
                objects = self.scene.len(),
                "scene updated"
            );
        }
        update
    }

    pub fn intersect_map_objects(&self, x: f64, y: f64) -> Vec<Intersection> {
        self.scene.intersect(&self.camera, x, y)
    }

    pub fn pick(&self, x: f64, y: f64) -> Vec<PickResult> {
        let hits = self.intersect_map_objects(x, y);
        let results = resolve_intersections(&hits, |source, tile| self.published.get(&(source, tile)));
        debug!(x, y, hits = hits.len(), results = results.len(), "pick");
        results
    }
}
