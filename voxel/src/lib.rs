//! Procedural voxel terrain streamed from an authoritative chunk store to clients that turn it into triangle meshes.

pub mod config;
pub mod error;
pub mod net;
pub mod world;

pub use config::StreamConfig;
pub use error::{ProtocolError, TransportError, WireError};
