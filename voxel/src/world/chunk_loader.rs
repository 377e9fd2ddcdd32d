use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cgmath::Vector3;
use hashbrown::{HashMap, HashSet};
use log::{debug, error, info, warn};

use crate::error::WireError;
use crate::net::protocol::ChunkPayload;
use crate::world::location::ChunkLocation;
use crate::world::mesh::Vertex;
use crate::world::meshing::MeshBuilder;

/// Fetches one chunk from wherever chunks come from, usually a server connection.
pub trait ChunkFetcher: Send {
    fn fetch_chunk(&mut self, location: ChunkLocation) -> Result<ChunkPayload, WireError>;
}

/// Where the viewer currently is, in world space.
pub trait PositionSource: Send + Sync {
    fn current_position(&self) -> Vector3<f32>;
}

#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// World units per chunk along x and z, used for viewer lookups and mesh placement
    pub chunk_size: usize,
    pub render_distance: i32,
    /// Loaded chunks farther away than this are dropped after each sweep
    pub unload_distance: Option<i32>,
    /// Pause after every request
    pub request_delay: Duration,
    /// Pause after every sweep
    pub sweep_delay: Duration,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Upper bound for how long a position change can go unnoticed without a wake
    pub position_poll: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            render_distance: 4,
            unload_distance: None,
            request_delay: Duration::from_millis(10),
            sweep_delay: Duration::from_millis(50),
            retry_delay: Duration::from_millis(250),
            max_retry_delay: Duration::from_secs(5),
            position_poll: Duration::from_millis(100),
        }
    }
}

/// A location is in at most one of the two sets.
#[derive(Default)]
struct LoaderState {
    loaded: HashMap<ChunkLocation, Vec<Vertex>>,
    pending: HashSet<ChunkLocation>,
}

#[derive(Default)]
struct Control {
    running: bool,
    woken: bool,
}

#[derive(Default)]
struct LoaderShared {
    state: Mutex<LoaderState>,
    control: Mutex<Control>,
    wakeup: Condvar,
}

impl LoaderShared {
    fn state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.control().running
    }

    fn set_running(&self, running: bool) {
        let mut control = self.control();
        control.running = running;
        control.woken = false;
        drop(control);

        self.wakeup.notify_all();
    }

    fn wake(&self) {
        self.control().woken = true;
        self.wakeup.notify_all();
    }

    /// Blocks until woken, stopped or `timeout` passed. Returns whether a wake arrived and consumes it.
    fn wait_for_wake(&self, timeout: Duration) -> bool {
        let control = self.control();
        let (mut control, _) = self
            .wakeup
            .wait_timeout_while(control, timeout, |control| control.running && !control.woken)
            .unwrap_or_else(PoisonError::into_inner);

        mem::take(&mut control.woken)
    }

    /// Like [Self::wait_for_wake] but leaves wakes for the next call and only returns early on stop.
    fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }

        let control = self.control();
        let _ = self
            .wakeup
            .wait_timeout_while(control, duration, |control| control.running)
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn try_mark_pending(&self, location: ChunkLocation) -> bool {
        let mut state = self.state();
        if state.loaded.contains_key(&location) {
            return false;
        }

        state.pending.insert(location)
    }

    fn finish(&self, location: ChunkLocation, vertices: Vec<Vertex>) {
        let mut state = self.state();
        state.pending.remove(&location);
        state.loaded.insert(location, vertices);
    }

    fn abandon(&self, location: ChunkLocation) {
        self.state().pending.remove(&location);
    }

    fn unload_outside(&self, center: ChunkLocation, distance: i32) -> usize {
        let mut state = self.state();
        let before = state.loaded.len();
        state
            .loaded
            .retain(|location, _| location.chebyshev_distance(center) <= distance.max(0) as u32);

        before - state.loaded.len()
    }
}

/// Lets other threads trigger a sweep of a running [ChunkLoader].
#[derive(Clone)]
pub struct LoaderHandle {
    shared: Arc<LoaderShared>,
}

impl LoaderHandle {
    pub fn wake(&self) {
        self.shared.wake();
    }
}

/// Keeps the chunks around a moving viewer loaded and meshed on a background thread.
pub struct ChunkLoader {
    config: LoaderConfig,
    shared: Arc<LoaderShared>,
    worker: Option<JoinHandle<()>>,
}

impl ChunkLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            shared: Arc::new(LoaderShared::default()),
            worker: None,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn start<F: ChunkFetcher + 'static>(&mut self, fetcher: F, position: Arc<dyn PositionSource>) -> Result<()> {
        if self.worker.is_some() {
            bail!("chunk loader is already running");
        }

        self.shared.set_running(true);

        let worker = LoaderWorker {
            retry: RetryBackoff::new(self.config.retry_delay, self.config.max_retry_delay),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            fetcher,
            position,
        };

        let handle = thread::Builder::new()
            .name("chunk-loader".to_owned())
            .spawn(move || worker.run())
            .inspect_err(|_| self.shared.set_running(false))
            .context("Failed to spawn the chunk loader thread")?;
        self.worker = Some(handle);

        Ok(())
    }

    /// Stops the background thread and waits for it. The current request finishes or times out first.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.shared.set_running(false);
        if worker.join().is_err() {
            error!("Chunk loader thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn handle(&self) -> LoaderHandle {
        LoaderHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Copy of all loaded chunk meshes, concatenated.
    pub fn combined_mesh(&self) -> Vec<Vertex> {
        let state = self.shared.state();
        let mut vertices = Vec::with_capacity(state.loaded.values().map(Vec::len).sum());
        state
            .loaded
            .values()
            .for_each(|mesh| vertices.extend_from_slice(mesh));

        vertices
    }

    pub fn is_loaded(&self, location: ChunkLocation) -> bool {
        self.shared.state().loaded.contains_key(&location)
    }

    pub fn is_pending(&self, location: ChunkLocation) -> bool {
        self.shared.state().pending.contains(&location)
    }

    pub fn loaded_count(&self) -> usize {
        self.shared.state().loaded.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state().pending.len()
    }

    pub fn has_chunks(&self) -> bool {
        !self.shared.state().loaded.is_empty()
    }
}

impl Drop for ChunkLoader {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RetryBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    due: Option<Instant>,
}

impl RetryBackoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
            due: None,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.due.is_some_and(|due| now >= due)
    }

    fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.due.map(|due| due.saturating_duration_since(now))
    }

    fn schedule(&mut self, now: Instant) -> Duration {
        let delay = self.current;
        self.due = Some(now + delay);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }

    fn clear(&mut self) {
        self.due = None;
    }
}

struct LoaderWorker<F> {
    config: LoaderConfig,
    shared: Arc<LoaderShared>,
    fetcher: F,
    position: Arc<dyn PositionSource>,
    retry: RetryBackoff,
}

impl<F: ChunkFetcher> LoaderWorker<F> {
    fn run(mut self) {
        info!("Chunk loader started (render distance {})", self.config.render_distance);

        let mut tracked = None;
        let mut woken = true;

        while self.shared.is_running() {
            let center = self.current_center();

            if woken || tracked != Some(center) || self.retry.is_due(Instant::now()) {
                tracked = Some(center);
                self.sweep(center);

                if let Some(distance) = self.config.unload_distance {
                    let unloaded = self.shared.unload_outside(center, distance);
                    if unloaded > 0 {
                        debug!("Unloaded {} chunks farther than {} from {:?}", unloaded, distance, center);
                    }
                }

                self.shared.pause(self.config.sweep_delay);
            }

            let timeout = self
                .retry
                .time_until_due(Instant::now())
                .map_or(self.config.position_poll, |until_retry| until_retry.min(self.config.position_poll));
            woken = self.shared.wait_for_wake(timeout);
        }

        info!("Chunk loader stopped");
    }

    fn current_center(&self) -> ChunkLocation {
        ChunkLocation::from_world_position(self.position.current_position(), self.config.chunk_size)
    }

    fn sweep(&mut self, center: ChunkLocation) {
        let (mut loaded, mut failed) = (0, 0);

        for location in center.neighborhood(self.config.render_distance) {
            if !self.shared.is_running() || self.current_center() != center {
                break;
            }

            if !self.shared.try_mark_pending(location) {
                continue;
            }

            match self.load(location) {
                Ok(vertices) => {
                    self.shared.finish(location, vertices);
                    loaded += 1;
                }
                Err(e) => {
                    warn!("Failed to load chunk {:?}: {}", location, e);
                    self.shared.abandon(location);
                    failed += 1;
                }
            }

            self.shared.pause(self.config.request_delay);
        }

        if loaded > 0 {
            self.retry.reset();
            debug!("Loaded {} chunks around {:?}", loaded, center);
        }

        if failed > 0 {
            let delay = self.retry.schedule(Instant::now());
            warn!("{} chunks around {:?} failed to load, retrying in {:?}", failed, center, delay);
        } else {
            self.retry.clear();
        }
    }

    fn load(&mut self, location: ChunkLocation) -> Result<Vec<Vertex>, WireError> {
        let chunk = self.fetcher.fetch_chunk(location)?.decode_chunk()?;

        Ok(MeshBuilder::build_chunk_mesh(&chunk, self.config.chunk_size))
    }
}

/// Mutex-backed [PositionSource] that wakes attached loaders whenever the viewer enters another chunk.
pub struct SharedPosition {
    chunk_size: usize,
    position: Mutex<Vector3<f32>>,
    listeners: Mutex<Vec<LoaderHandle>>,
}

impl SharedPosition {
    pub fn new(position: Vector3<f32>, chunk_size: usize) -> Self {
        Self {
            chunk_size,
            position: Mutex::new(position),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn attach(&self, handle: LoaderHandle) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    pub fn set(&self, position: Vector3<f32>) {
        let previous = mem::replace(&mut *self.position.lock().unwrap_or_else(PoisonError::into_inner), position);

        if ChunkLocation::from_world_position(previous, self.chunk_size) != ChunkLocation::from_world_position(position, self.chunk_size) {
            self.listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .for_each(LoaderHandle::wake);
        }
    }
}

impl PositionSource for SharedPosition {
    fn current_position(&self) -> Vector3<f32> {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
