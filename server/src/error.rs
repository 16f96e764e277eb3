//! Error types surfaced by server bootstrap and the map collaborator.
//!
//! Per-datagram and per-tick problems never show up here: those are logged
//! and skipped where they happen so a single bad packet or player cannot stop
//! the simulation.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("map {name} could not be read: {source}")]
    Io {
        name: String,
        source: std::io::Error,
    },

    #[error("map {name} is malformed: {reason}")]
    Malformed { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Map(#[from] MapError),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}
