//! Error types for the simulation engine and the world loader

use shared::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

/// Recoverable failure inside a single hook or trigger handler.
///
/// The scheduler logs these and carries on with the next hook; they never
/// escape a tick.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{object} is missing required property '{property}'")]
    MissingProperty { object: String, property: String },

    #[error("reference '{reference}' not found on map '{map}'")]
    ReferenceNotFound { map: String, reference: String },

    #[error("{object} has an invalid '{property}': {reason}")]
    InvalidProperty {
        object: String,
        property: String,
        reason: String,
    },

    #[error("map '{0}' does not exist")]
    UnknownMap(String),

    #[error("object {0:?} is not on map '{1}'")]
    MissingObject(ObjectId, String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read world file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse world file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("map '{map}' references unknown tileset '{tileset}'")]
    UnknownTileset { map: String, tileset: String },

    #[error("gid {gid} on map '{map}' does not belong to any tileset")]
    UnknownGid { map: String, gid: u32 },

    #[error("duplicate map name '{0}'")]
    DuplicateMap(String),

    #[error("map '{map}' has {count} layers, at most 64 are supported")]
    TooManyLayers { map: String, count: usize },
}
