use std::mem::size_of;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cgmath::Vector3;
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use voxel_stream::config::{DEFAULT_CHUNK_DIMENSIONS, DEFAULT_PORT};
use voxel_stream::net::client::TcpChunkFetcher;
use voxel_stream::net::protocol::{BYTES_PER_VOXEL, MAX_PAYLOAD_LEN};
use voxel_stream::net::server::{ChunkServer, ServerConfig, ServerHandle};
use voxel_stream::world::chunk_data::ChunkDimensions;
use voxel_stream::world::chunk_loader::{ChunkFetcher, ChunkLoader, LoaderConfig, SharedPosition};
use voxel_stream::world::chunk_store::ChunkStore;
use voxel_stream::world::location::ChunkLocation;
use voxel_stream::world::mesh::Vertex;
use voxel_stream::world::worldgen::TerrainPreset;
use voxel_stream::StreamConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Streams procedurally generated voxel chunks over TCP")]
struct Args {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run a chunk server
    Serve {
        #[arg(long, default_value_t = format!("0.0.0.0:{DEFAULT_PORT}"))]
        bind: String,
        /// Radius of chunks generated around the origin before accepting connections
        #[arg(long, default_value_t = 2)]
        pregenerate: i32,
        #[arg(long, default_value_t = 8)]
        workers: usize,
        #[command(flatten)]
        world: WorldArgs,
    },
    /// Stream chunks from a server while flying along the x axis
    Client {
        #[arg(long, default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
        server: String,
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        #[command(flatten)]
        viewer: ViewerArgs,
    },
    /// Run a server and a client in one process, connected over loopback
    Local {
        #[command(flatten)]
        world: WorldArgs,
        #[command(flatten)]
        viewer: ViewerArgs,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Preset {
    Gentle,
    Rugged,
}

#[derive(clap::Args, Debug)]
struct WorldArgs {
    #[arg(long, default_value_t = 0)]
    seed: u32,
    #[arg(long, value_enum, default_value_t = Preset::Gentle)]
    preset: Preset,
    #[arg(long, default_value_t = DEFAULT_CHUNK_DIMENSIONS.width)]
    chunk_width: usize,
    #[arg(long, default_value_t = DEFAULT_CHUNK_DIMENSIONS.height)]
    chunk_height: usize,
    #[arg(long, default_value_t = DEFAULT_CHUNK_DIMENSIONS.depth)]
    chunk_depth: usize,
}

impl WorldArgs {
    fn stream_config(&self) -> Result<StreamConfig> {
        let chunk_dimensions = ChunkDimensions::new(self.chunk_width, self.chunk_height, self.chunk_depth);
        if chunk_dimensions.is_empty() {
            bail!("chunk dimensions must not be zero: {:?}", chunk_dimensions);
        }
        if [self.chunk_width, self.chunk_height, self.chunk_depth]
            .iter()
            .any(|&size| size > u16::MAX as usize)
        {
            bail!("chunk dimensions must fit into 16 bits: {:?}", chunk_dimensions);
        }
        if chunk_dimensions.volume() * BYTES_PER_VOXEL > MAX_PAYLOAD_LEN {
            bail!("chunk dimensions {:?} exceed the {} byte payload limit", chunk_dimensions, MAX_PAYLOAD_LEN);
        }

        let preset = match self.preset {
            Preset::Gentle => TerrainPreset::GENTLE,
            Preset::Rugged => TerrainPreset::RUGGED,
        };

        Ok(StreamConfig {
            seed: self.seed,
            chunk_dimensions,
            preset,
        })
    }
}

#[derive(clap::Args, Debug)]
struct ViewerArgs {
    #[arg(long, default_value_t = 4)]
    render_distance: i32,
    /// Drop chunks farther away than this
    #[arg(long)]
    unload_distance: Option<i32>,
    /// World units of chunks, matching the server's chunk width
    #[arg(long, default_value_t = DEFAULT_CHUNK_DIMENSIONS.width)]
    chunk_size: usize,
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Flying speed in blocks per second
    #[arg(long, default_value_t = 8.0)]
    speed: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    match Args::parse().mode {
        Mode::Serve {
            bind,
            pregenerate,
            workers,
            world,
        } => {
            let server = start_server(&world, &bind, pregenerate, workers)?;
            server.join();
            Ok(())
        }
        Mode::Client {
            server,
            timeout_ms,
            viewer,
        } => fly(TcpChunkFetcher::new(server, Some(Duration::from_millis(timeout_ms))), &viewer),
        Mode::Local { world, viewer } => {
            let mut server = start_server(&world, "127.0.0.1:0", 0, 2)?;
            let fetcher = TcpChunkFetcher::new(server.local_addr().to_string(), Some(Duration::from_secs(5)));

            let result = fly(fetcher, &viewer);
            server.stop();
            result
        }
    }
}

fn start_server(world: &WorldArgs, bind: &str, pregenerate: i32, workers: usize) -> Result<ServerHandle> {
    let config = world.stream_config()?;
    info!("Starting chunk server with seed {} and {:?} chunks", config.seed, config.chunk_dimensions);

    let store = Arc::new(ChunkStore::new(config.generator()));
    if pregenerate > 0 {
        store.ensure_area(ChunkLocation::new(0, 0), pregenerate);
    }

    let listener = TcpListener::bind(bind).with_context(|| format!("Failed to bind {bind}"))?;

    ChunkServer::new(store)
        .spawn(
            listener,
            ServerConfig {
                workers,
                ..ServerConfig::default()
            },
        )
        .context("Failed to start the chunk server")
}

fn fly<F: ChunkFetcher + 'static>(fetcher: F, viewer: &ViewerArgs) -> Result<()> {
    let start = Vector3::new(0.0, 40.0, 0.0);
    let position = Arc::new(SharedPosition::new(start, viewer.chunk_size));

    let mut loader = ChunkLoader::new(LoaderConfig {
        chunk_size: viewer.chunk_size,
        render_distance: viewer.render_distance,
        unload_distance: viewer.unload_distance,
        ..LoaderConfig::default()
    });
    position.attach(loader.handle());
    loader.start(fetcher, position.clone())?;

    let started = Instant::now();
    let duration = Duration::from_secs(viewer.seconds);
    let mut next_report = Duration::ZERO;

    while started.elapsed() < duration {
        let elapsed = started.elapsed();
        position.set(start + Vector3::unit_x() * viewer.speed * elapsed.as_secs_f32());

        if elapsed >= next_report {
            let mesh = loader.combined_mesh();
            info!(
                "t={:.1}s chunks={} pending={} vertices={} ({} KiB)",
                elapsed.as_secs_f32(),
                loader.loaded_count(),
                loader.pending_count(),
                mesh.len(),
                mesh.len() * size_of::<Vertex>() / 1024
            );
            next_report += Duration::from_secs(1);
        }

        thread::sleep(Duration::from_millis(50));
    }

    loader.stop();

    if !loader.has_chunks() {
        bail!("no chunks arrived within {} seconds", viewer.seconds);
    }

    Ok(())
}
