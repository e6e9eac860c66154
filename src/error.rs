//! Error types for the place-graph localization core.

use thiserror::Error;

use crate::graph::NodeId;

/// Crate-wide error type.
///
/// Lookup misses and degenerate merges are ordinary return values; none of
/// these variants is meant to abort the worker loop.
#[derive(Error, Debug)]
pub enum Error {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("no edge between {start} and {end}")]
    EdgeNotFound { start: NodeId, end: NodeId },

    #[error("cannot merge node {0} into itself")]
    SelfMerge(NodeId),

    #[error("invalid merge: {0}")]
    InvalidMerge(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("graph inconsistency: {0}")]
    GraphInconsistency(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::MalformedInput(format!("evidence blob: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
