use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, warn};

use crate::decoder::builder::build_with_stats;
use crate::decoder::grouper::GeometryGrouper;
use crate::decoder::ingest::{Shape, ingest_features};
use crate::decoder::types::{DEFAULT_EXTENT, DecodeStats, DecodedTile, ObjectInfo, TileKey, feature_id};
use crate::error::{DecodeError, GrouperError};
use crate::geojson::{GeoJsonFeature, parse_geojson};
use crate::theme::{Technique, Theme, label_text};

pub trait TileDecoder: Send + Sync {
    fn decode(&self, tile: TileKey, payload: &[u8]) -> Result<DecodedTile, DecodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    pub extent: u32,
    pub gather_feature_attributes: bool,
    pub create_tile_info: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            extent: DEFAULT_EXTENT,
            gather_feature_attributes: true,
            create_tile_info: true,
        }
    }
}

pub fn decode_tile_payload(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if data.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = GzDecoder::new(data);
        let mut decoded = Vec::new();
        decoder
            .read_to_end(&mut decoded)
            .map_err(|err| DecodeError::Payload(err.to_string()))?;
        Ok(decoded)
    } else {
        Ok(data.to_vec())
    }
}

pub fn encode_tile_payload(data: &[u8], gzip: bool) -> std::io::Result<Vec<u8>> {
    if !gzip {
        return Ok(data.to_vec());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn decode_features(
    tile: TileKey,
    features: &[GeoJsonFeature],
    theme: &Theme,
    options: &DecoderOptions,
) -> Result<DecodedTile, DecodeError> {
    if !tile.is_valid() {
        return Err(DecodeError::InvalidTile(tile));
    }
    let (parts, skipped_invalid) = ingest_features(tile, options.extent, features);
    let mut grouper = GeometryGrouper::new(tile, options.extent);
    let mut infos: HashMap<usize, Arc<ObjectInfo>> = HashMap::new();
    let mut ingested = BTreeSet::new();
    let mut styled = BTreeSet::new();
    let mut degenerate = BTreeSet::new();

    for part in parts.iter() {
        ingested.insert(part.ordinal);
        let Some((index, technique)) = theme.match_feature(&part.shape, &part.properties, tile.zoom)
        else {
            debug!(tile = %tile, ordinal = part.ordinal, shape = part.shape.name(), "no style rule");
            continue;
        };
        let info = infos.entry(part.ordinal).or_insert_with(|| {
            Arc::new(ObjectInfo {
                feature_id: feature_id(tile, part.ordinal),
                ordinal: part.ordinal,
                properties: if options.gather_feature_attributes {
                    (*part.properties).clone()
                } else {
                    Default::default()
                },
            })
        });
        match (technique, &part.shape) {
            (Technique::Text { text_property, style }, Shape::Point(anchor)) => {
                let Some(text) = label_text(&part.properties, text_property) else {
                    continue;
                };
                grouper.add_label(index, style, *anchor, text, info)?;
            }
            (technique, shape) => {
                let Some(params) = technique.params() else {
                    continue;
                };
                match grouper.add(technique.kind(), index, &params, shape, info) {
                    Ok(()) => {}
                    Err(err @ GrouperError::Degenerate(_)) => {
                        warn!(tile = %tile, ordinal = part.ordinal, %err, "skipping feature part");
                        degenerate.insert(part.ordinal);
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        styled.insert(part.ordinal);
    }

    let grouped = grouper.finalize()?;
    // A feature counts as invalid only when none of its parts rendered.
    let invalid_after_grouping = degenerate.difference(&styled).count();
    let stats = DecodeStats {
        input_features: features.len(),
        skipped_invalid: skipped_invalid + invalid_after_grouping,
        skipped_unstyled: ingested.difference(&styled).count() - invalid_after_grouping,
    };
    debug!(
        tile = %tile,
        geometries = grouped.geometries.len(),
        text_geometries = grouped.text_geometries.len(),
        features = stats.input_features,
        skipped_invalid = stats.skipped_invalid,
        skipped_unstyled = stats.skipped_unstyled,
        "decoded tile"
    );
    Ok(build_with_stats(
        tile,
        grouped.geometries,
        grouped.text_geometries,
        options.create_tile_info,
        stats,
    ))
}

#[derive(Debug, Clone, Default)]
pub struct GeoJsonTileDecoder {
    theme: Theme,
    options: DecoderOptions,
}

impl GeoJsonTileDecoder {
    pub fn new(theme: Theme, options: DecoderOptions) -> Self {
        Self { theme, options }
    }
}

impl TileDecoder for GeoJsonTileDecoder {
    fn decode(&self, tile: TileKey, payload: &[u8]) -> Result<DecodedTile, DecodeError> {
        let bytes = decode_tile_payload(payload)?;
        let collection = parse_geojson(&bytes).map_err(|err| DecodeError::Parse(err.to_string()))?;
        decode_features(tile, &collection.features, &self.theme, &self.options)
    }
}
