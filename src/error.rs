use thiserror::Error;

use crate::decoder::types::{GeometryKind, TileKey};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("invalid geometry in feature {ordinal}: {message}")]
    InvalidGeometry { ordinal: usize, message: String },
}

impl IngestError {
    pub fn invalid_geometry(ordinal: usize, msg: impl Into<String>) -> Self {
        IngestError::InvalidGeometry {
            ordinal,
            message: msg.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrouperError {
    #[error("cannot add {0:?} primitive: grouper already finalized")]
    Finalized(GeometryKind),

    #[error("grouper already finalized")]
    AlreadyFinalized,

    #[error("{shape} primitive cannot join a {kind:?} geometry")]
    KindMismatch {
        kind: GeometryKind,
        shape: &'static str,
    },

    #[error("degenerate {0}: nothing to render")]
    Degenerate(&'static str),

    #[error("triangulation failed: {0}")]
    Triangulation(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("no data for tile {0}")]
    NotFound(String),

    #[error("data provider failed: {0}")]
    Provider(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("decompress tile payload: {0}")]
    Payload(String),

    #[error("parse GeoJSON: {0}")]
    Parse(String),

    #[error("tile {0} is outside the tile grid")]
    InvalidTile(TileKey),

    #[error(transparent)]
    Grouper(#[from] GrouperError),

    #[error("decode task aborted: {0}")]
    Aborted(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum ThemeError {
    #[error("read theme: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse theme: {0}")]
    Parse(#[from] serde_json::Error),
}
