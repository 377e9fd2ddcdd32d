use std::io;

use thiserror::Error;

use crate::world::chunk_data::ChunkDimensions;
use crate::world::location::ChunkLocation;

/// Everything that can go wrong while moving a chunk over a connection.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<io::Error> for WireError {
    fn from(error: io::Error) -> Self {
        Self::Transport(TransportError::Io(error))
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed after {received} of {expected} bytes")]
    ConnectionClosed { received: usize, expected: usize },
    #[error("timed out after {received} of {expected} bytes")]
    TimedOut { received: usize, expected: usize },
    #[error("not connected: {0} did not resolve to any address")]
    NotConnected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid block type code {0}")]
    InvalidBlockType(u8),
    #[error("invalid ramp direction code {0}")]
    InvalidRampDirection(u8),
    #[error("chunk dimensions {0:?} contain a zero-sized axis")]
    EmptyDimensions(ChunkDimensions),
    #[error("chunk dimension {0} does not fit into a 16-bit header field")]
    DimensionTooLarge(usize),
    #[error("a payload of {len} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge { len: u64, max: usize },
    #[error("expected a payload of {expected} bytes, got {actual}")]
    PayloadLength { expected: usize, actual: usize },
    #[error("requested chunk {requested:?} but the response carries {received:?}")]
    UnexpectedChunk {
        requested: ChunkLocation,
        received: ChunkLocation,
    },
}
