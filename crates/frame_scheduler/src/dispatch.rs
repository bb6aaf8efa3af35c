use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, unbounded};
use model::Rect;
use tiles::{ContentSource, LayerId, RasterFlags, Tile, TileKey, TileReadiness, TileStore};

/// Everything a backend needs to raster one tile, owned so it can cross
/// to the worker thread.
#[derive(Debug, Clone)]
pub struct RasterJob {
    pub tile: TileKey,
    pub layer_id: LayerId,
    pub content_rect: Rect,
    pub contents_scale: f32,
    pub source_frame_number: u64,
    pub flags: RasterFlags,
    pub source: Arc<dyn ContentSource>,
}

impl RasterJob {
    pub fn new(key: TileKey, tile: &Tile, source: Arc<dyn ContentSource>) -> Self {
        Self {
            tile: key,
            layer_id: tile.layer_id(),
            content_rect: tile.content_rect(),
            contents_scale: tile.contents_scale(),
            source_frame_number: tile.source_frame_number(),
            flags: tile.flags(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterCompletion {
    pub tile: TileKey,
    pub readiness: TileReadiness,
}

/// Turns recorded content into something drawable. Runs on the worker thread.
pub trait RasterBackend: Send + 'static {
    fn raster(&mut self, job: &RasterJob) -> TileReadiness;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterDispatchError {
    QueueFull,
    Disconnected,
}

impl fmt::Display for RasterDispatchError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterDispatchError::QueueFull => write!(formatter, "raster job queue is full"),
            RasterDispatchError::Disconnected => {
                write!(formatter, "raster worker thread disconnected")
            }
        }
    }
}

impl std::error::Error for RasterDispatchError {}

/// Owns the raster worker thread and both ends of its channels.
///
/// Dropping the dispatcher disconnects the job channel; the worker exits once
/// it notices and is joined.
#[derive(Debug)]
pub struct RasterDispatcher {
    jobs: Option<Sender<RasterJob>>,
    completions: Receiver<RasterCompletion>,
    worker: Option<JoinHandle<()>>,
    in_flight: usize,
}

impl RasterDispatcher {
    pub fn spawn<B: RasterBackend>(mut backend: B, job_capacity: usize) -> Self {
        let (job_sender, job_receiver) = bounded::<RasterJob>(job_capacity);
        let (completion_sender, completion_receiver) = unbounded();
        let worker = thread::spawn(move || {
            for job in job_receiver.iter() {
                let readiness = backend.raster(&job);
                let completion = RasterCompletion {
                    tile: job.tile,
                    readiness,
                };
                if completion_sender.send(completion).is_err() {
                    break;
                }
            }
        });
        Self {
            jobs: Some(job_sender),
            completions: completion_receiver,
            worker: Some(worker),
            in_flight: 0,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Sends jobs in order and marks each sent tile as in flight. Stops at the
    /// first job the channel refuses; returns how many were sent.
    pub fn dispatch(
        &mut self,
        store: &mut TileStore,
        jobs: impl IntoIterator<Item = RasterJob>,
    ) -> Result<usize, RasterDispatchError> {
        let sender = self.jobs.as_ref().ok_or(RasterDispatchError::Disconnected)?;
        let mut sent = 0;
        for job in jobs {
            let key = job.tile;
            if !store.contains(key) {
                continue;
            }
            match sender.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) if sent > 0 => break,
                Err(TrySendError::Full(_)) => return Err(RasterDispatchError::QueueFull),
                Err(TrySendError::Disconnected(_)) => return Err(RasterDispatchError::Disconnected),
            }
            store.begin_raster(key);
            self.in_flight += 1;
            sent += 1;
        }
        Ok(sent)
    }

    /// Applies every completion that has already arrived. Returns how many
    /// landed on a live tile.
    pub fn drain_completions(&mut self, store: &mut TileStore) -> Result<usize, RasterDispatchError> {
        let mut applied = 0;
        loop {
            match self.completions.try_recv() {
                Ok(completion) => applied += self.apply(store, completion),
                Err(TryRecvError::Empty) => return Ok(applied),
                Err(TryRecvError::Disconnected) => return Err(RasterDispatchError::Disconnected),
            }
        }
    }

    /// Blocks until every dispatched job has completed.
    pub fn wait_for_idle(&mut self, store: &mut TileStore) -> Result<usize, RasterDispatchError> {
        let mut applied = 0;
        while self.in_flight > 0 {
            let completion = self
                .completions
                .recv()
                .map_err(|_| RasterDispatchError::Disconnected)?;
            applied += self.apply(store, completion);
        }
        Ok(applied)
    }

    fn apply(&mut self, store: &mut TileStore, completion: RasterCompletion) -> usize {
        self.in_flight = self.in_flight.saturating_sub(1);
        if store.complete_raster(completion.tile, completion.readiness) {
            return 1;
        }
        log::debug!(
            target: "frame_scheduler",
            "dropped raster result for destroyed tile {:?}",
            completion.tile
        );
        0
    }
}

impl Drop for RasterDispatcher {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!(target: "frame_scheduler", "raster worker thread panicked");
            }
        }
    }
}
