use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use threadpool::ThreadPool;

use crate::error::{ProtocolError, WireError};
use crate::net::protocol::{read_request, write_response, ChunkPayload, ChunkRequest};
use crate::world::chunk_store::ChunkStore;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Connections served at the same time, further ones wait in the pool's queue
    pub workers: usize,
    /// Connections idle for longer are closed so their worker can pick up queued ones.
    /// `None` lets idle clients hold a worker forever.
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            read_timeout: Some(Duration::from_secs(1)),
            write_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Answers chunk requests from a shared [ChunkStore].
#[derive(Clone)]
pub struct ChunkServer {
    store: Arc<ChunkStore>,
}

impl ChunkServer {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    /// Generates the chunk if needed and encodes it. The header echoes the request's reserved `chunk_y`.
    pub fn respond(&self, request: ChunkRequest) -> Result<ChunkPayload, ProtocolError> {
        let chunk = self.store.ensure_generated(request.location());

        let mut payload = ChunkPayload::from_chunk(&chunk)?;
        payload.header.chunk_y = request.chunk_y;
        Ok(payload)
    }

    /// Serves requests until the peer hangs up or idles past the read timeout and returns how many were answered.
    pub fn serve_connection<S: Read + Write>(&self, mut stream: S) -> Result<usize, WireError> {
        let mut served = 0;

        while let Some(request) = read_request(&mut stream)? {
            let payload = self.respond(request)?;
            write_response(&mut stream, &payload.header, &payload.bytes)?;
            served += 1;
        }

        Ok(served)
    }

    /// Accepts connections on a background thread and serves each one on a pooled worker.
    pub fn spawn(self, listener: TcpListener, config: ServerConfig) -> io::Result<ServerHandle> {
        let local_addr = listener.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));

        let acceptor = {
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("chunk-acceptor".to_owned())
                .spawn(move || self.accept_loop(listener, config, running))?
        };

        info!("Chunk server listening on {}", local_addr);

        Ok(ServerHandle {
            local_addr,
            running,
            acceptor: Some(acceptor),
        })
    }

    fn accept_loop(self, listener: TcpListener, config: ServerConfig, running: Arc<AtomicBool>) {
        let pool = ThreadPool::with_name("chunk-connection".to_owned(), config.workers.max(1));

        for stream in listener.incoming() {
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let peer = stream
                .peer_addr()
                .map_or_else(|_| "unknown peer".to_owned(), |addr| addr.to_string());
            if let Err(e) = configure_stream(&stream, &config) {
                warn!("Dropping connection from {}: {}", peer, e);
                continue;
            }

            debug!("Accepted connection from {}", peer);
            let server = self.clone();
            pool.execute(move || match server.serve_connection(stream) {
                Ok(served) => debug!("{} disconnected after {} requests", peer, served),
                Err(e) => warn!("Connection to {} failed: {}", peer, e),
            });
        }

        info!("Chunk server stopped accepting connections");
    }
}

fn configure_stream(stream: &TcpStream, config: &ServerConfig) -> io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(config.read_timeout)?;
    stream.set_write_timeout(config.write_timeout)
}

/// Running accept loop. Stopping it leaves already accepted connections to finish on their own.
pub struct ServerHandle {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&mut self) {
        let Some(acceptor) = self.acceptor.take() else {
            return;
        };

        self.running.store(false, Ordering::SeqCst);

        // unblock the pending accept
        let mut wake_addr = self.local_addr;
        if wake_addr.ip().is_unspecified() {
            wake_addr.set_ip(match wake_addr {
                SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }
        if let Err(e) = TcpStream::connect(wake_addr) {
            warn!("Failed to wake the chunk acceptor: {}", e);
        }

        if acceptor.join().is_err() {
            error!("Chunk acceptor thread panicked");
        }
    }

    /// Blocks until the accept loop ends.
    pub fn join(mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            if acceptor.join().is_err() {
                error!("Chunk acceptor thread panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
