// THEORY:
// Every frame is read three times: as itself and as a neighbor of the frames either
// side. Decoding a full-resolution 16-bit TIFF is expensive, so decoded frames are
// shared through this cache.
//
// Key architectural principles:
// 1.  **One decode per frame in flight**: the first request for a frame starts the
//     decode and publishes it as a shared future. Concurrent requests for the same
//     frame await that future instead of decoding again.
// 2.  **Live-handle tracking**: once loaded, the cache only keeps a `Weak` handle. A
//     frame stays resident while some task holds its `Arc`, plus a short ring of the
//     most recently loaded frames kept strongly so neighbors are not decoded twice
//     in quick succession.
// 3.  **Pressure relief**: a loader may report resource exhaustion. The cache then
//     drops its retained frames and retries, a bounded number of times. It never
//     skips a frame.
// 4.  **Blocking work off the runtime**: the loader is synchronous and runs on the
//     blocking pool.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core_modules::frame::PixelBuffer;
use crate::error::Result;

/// Source of decoded frames, indexed from 0.
pub trait FrameLoader: Send + Sync + 'static {
    fn frame_count(&self) -> usize;

    /// Decodes one frame. Called from the blocking pool.
    fn load(&self, frame_index: usize) -> Result<PixelBuffer>;
}

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<PixelBuffer>>>>;

enum Slot {
    Loading(SharedLoad),
    Loaded(Weak<PixelBuffer>),
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<usize, Slot>,
    retained: VecDeque<Arc<PixelBuffer>>,
}

pub struct FrameCache {
    loader: Arc<dyn FrameLoader>,
    state: Mutex<CacheState>,
    retain: usize,
    retries: usize,
    decodes: Arc<AtomicUsize>,
}

impl FrameCache {
    pub fn new(loader: Arc<dyn FrameLoader>, retain: usize, retries: usize) -> Self {
        Self {
            loader,
            state: Mutex::new(CacheState::default()),
            retain,
            retries,
            decodes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.loader.frame_count()
    }

    /// Decodes started so far.
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }

    /// The decoded frame at `frame_index`, shared with any other holder.
    pub async fn get(&self, frame_index: usize) -> Result<Arc<PixelBuffer>> {
        let mut attempt = 0;
        loop {
            match self.load_once(frame_index).await {
                Err(err) if err.is_recoverable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(frame = frame_index, attempt, error = %err, "frame load failed, evicting and retrying");
                    self.evict().await;
                }
                result => return result,
            }
        }
    }

    /// Drops every retained frame and forgets entries nobody holds any more.
    pub async fn evict(&self) {
        let mut state = self.state.lock().await;
        let released = state.retained.len();
        state.retained.clear();
        state
            .slots
            .retain(|_, slot| !matches!(slot, Slot::Loaded(weak) if weak.strong_count() == 0));
        debug!(released, remaining = state.slots.len(), "frame cache evicted");
    }

    async fn load_once(&self, frame_index: usize) -> Result<Arc<PixelBuffer>> {
        let load = {
            let mut state = self.state.lock().await;
            let pending = match state.slots.get(&frame_index) {
                Some(Slot::Loaded(weak)) => match weak.upgrade() {
                    Some(frame) => return Ok(frame),
                    None => None,
                },
                Some(Slot::Loading(load)) => Some(load.clone()),
                None => None,
            };
            match pending {
                Some(load) => load,
                None => {
                    let load = self.start_load(frame_index);
                    state.slots.insert(frame_index, Slot::Loading(load.clone()));
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut state = self.state.lock().await;
        let still_ours = matches!(state.slots.get(&frame_index), Some(Slot::Loading(current)) if current.ptr_eq(&load));
        match &result {
            Ok(frame) if still_ours => {
                state.slots.insert(frame_index, Slot::Loaded(Arc::downgrade(frame)));
                if self.retain > 0 {
                    state.retained.push_back(Arc::clone(frame));
                    while state.retained.len() > self.retain {
                        state.retained.pop_front();
                    }
                }
            }
            Err(_) if still_ours => {
                state.slots.remove(&frame_index);
            }
            _ => {}
        }
        result
    }

    fn start_load(&self, frame_index: usize) -> SharedLoad {
        let loader = Arc::clone(&self.loader);
        let decodes = Arc::clone(&self.decodes);
        async move {
            decodes.fetch_add(1, Ordering::Relaxed);
            let frame = tokio::task::spawn_blocking(move || loader.load(frame_index))
                .await?
                .map_err(|err| err.for_frame(frame_index))?;
            Ok(Arc::new(frame))
        }
        .boxed()
        .shared()
    }
}
