use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};

use crate::error::{ProtocolError, TransportError, WireError};
use crate::net::protocol::{read_response, write_request, ChunkPayload, ChunkRequest};
use crate::world::chunk_loader::ChunkFetcher;
use crate::world::location::ChunkLocation;

/// Requests chunks over any byte stream, one request at a time.
pub struct ChunkClient<S> {
    stream: S,
}

impl<S: Read + Write> ChunkClient<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn request_chunk(&mut self, location: ChunkLocation) -> Result<ChunkPayload, WireError> {
        write_request(&mut self.stream, ChunkRequest::for_location(location))?;
        let payload = read_response(&mut self.stream)?;

        if payload.header.location() != location {
            return Err(ProtocolError::UnexpectedChunk {
                requested: location,
                received: payload.header.location(),
            }
            .into());
        }

        Ok(payload)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write + Send> ChunkFetcher for ChunkClient<S> {
    fn fetch_chunk(&mut self, location: ChunkLocation) -> Result<ChunkPayload, WireError> {
        self.request_chunk(location)
    }
}

/// [ChunkFetcher] over TCP that connects on first use and reconnects after any failure.
/// A kept connection the server closed while idle is replaced transparently.
pub struct TcpChunkFetcher {
    address: String,
    timeout: Option<Duration>,
    client: Option<ChunkClient<TcpStream>>,
}

impl TcpChunkFetcher {
    /// `timeout` applies to connecting, reading and writing. A zero timeout is rejected by the socket.
    pub fn new(address: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            address: address.into(),
            timeout,
            client: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn client(&mut self) -> Result<&mut ChunkClient<TcpStream>, WireError> {
        let client = match self.client.take() {
            Some(client) => client,
            None => {
                let stream = connect(&self.address, self.timeout)?;
                info!("Connected to chunk server {}", self.address);
                ChunkClient::new(stream)
            }
        };

        Ok(self.client.insert(client))
    }

    fn request(&mut self, location: ChunkLocation) -> Result<ChunkPayload, WireError> {
        let result = self.client()?.request_chunk(location);

        // the stream may be stuck in the middle of a frame
        if result.is_err() && self.client.take().is_some() {
            debug!("Dropped connection to {}", self.address);
        }

        result
    }
}

impl ChunkFetcher for TcpChunkFetcher {
    fn fetch_chunk(&mut self, location: ChunkLocation) -> Result<ChunkPayload, WireError> {
        let reused = self.is_connected();

        match self.request(location) {
            Err(WireError::Transport(
                e @ (TransportError::ConnectionClosed { received: 0, .. } | TransportError::Io(_)),
            )) if reused => {
                debug!("Reconnecting to {} after a stale connection: {}", self.address, e);
                self.request(location)
            }
            result => result,
        }
    }
}

fn connect(address: &str, timeout: Option<Duration>) -> Result<TcpStream, WireError> {
    let mut last_error = None;

    for addr in address.to_socket_addrs()? {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };

        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => e.into(),
        None => TransportError::NotConnected(address.to_owned()).into(),
    })
}
