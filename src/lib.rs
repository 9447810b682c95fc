pub mod camera;
pub mod cli;
pub mod decoder;
pub mod error;
pub mod geojson;
pub mod loader;
pub mod mapview;
pub mod output;
pub mod pick;
pub mod provider;
pub mod scene;
pub mod theme;

pub use camera::{Camera, GeoCoordinates, MapCamera};
pub use decoder::{DecodedTile, GeoJsonTileDecoder, GeometryKind, ObjectInfo, TileDecoder, TileKey};
pub use error::{DecodeError, FetchError, GrouperError, IngestError, LoadError};
pub use loader::{TileLoader, TileLoaderState};
pub use mapview::{DataSource, MapView, MapViewOptions};
pub use pick::PickResult;
pub use provider::{DataProvider, GeoJsonDataProvider};
pub use theme::Theme;
