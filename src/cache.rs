//! Single-slot cache of the most recent camera frame.
//!
//! The cache is shared between the capture callback, which calls
//! [`FrameCache::accept`] for every delivered frame, and request handlers
//! that read [`FrameCache::current_frame`] or export a JPEG. Accepting runs
//! under one lock covering the throttle check, the generation swap and the
//! timestamp update. Readers only clone an `Arc` out of the slot, so they
//! always observe a whole generation and never block each other.

use core::time::Duration;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::frame::{Frame, Timestamp};
use crate::normalize::{PixelLayout, normalize};
use crate::preview::PreviewDescriptor;
use crate::reconstruct::YuvConversion;
use crate::types::{CaptureMetadata, Size};

/// Minimum interval between accepted frames unless configured otherwise.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// A normalized frame held by the cache. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFrame {
    pub layout: PixelLayout,
    pub size: Size,
    /// Presentation timestamp of the source frame.
    pub capture_time_ns: u64,
}

/// Monotonic time source used for throttling.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// How preview descriptors reach the listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListenerDispatch {
    /// Call the listener on the capture context, inside `accept`. A slow
    /// listener directly lowers the effective capture rate, and the listener
    /// must not call `accept` itself.
    #[default]
    Inline,
    /// Hand descriptors to a worker thread through a bounded queue.
    /// Descriptors are dropped while the queue is full.
    Queued { capacity: usize },
}

/// Configuration for a [`FrameCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub min_interval: Duration,
    /// Include capture metadata keys in preview descriptors.
    pub embed_metadata: bool,
    /// Color conversion applied to biplanar frames on export.
    ///
    /// Cached frames do not remember whether they arrived as video or full
    /// range (previews tag every biplanar frame as full range), so this one
    /// setting applies to all of them. Set `ColorRange::Video` when the
    /// capture output delivers `'420v'`.
    pub color: YuvConversion,
    pub dispatch: ListenerDispatch,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            min_interval: DEFAULT_MIN_INTERVAL,
            embed_metadata: true,
            color: YuvConversion::default(),
            dispatch: ListenerDispatch::Inline,
        }
    }
}

impl CacheConfig {
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_embed_metadata(mut self, embed_metadata: bool) -> Self {
        self.embed_metadata = embed_metadata;
        self
    }

    pub fn with_color(mut self, color: YuvConversion) -> Self {
        self.color = color;
        self
    }

    pub fn with_dispatch(mut self, dispatch: ListenerDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }
}

type Listener = Arc<dyn Fn(PreviewDescriptor) + Send + Sync + 'static>;

#[derive(Clone)]
enum ListenerSlot {
    Inline(Listener),
    Queued(Sender<PreviewDescriptor>),
}

#[derive(Debug, Default)]
struct ThrottleState {
    last_accept: Option<Duration>,
}

/// Holds the latest accepted frame plus capture metadata.
pub struct FrameCache {
    config: CacheConfig,
    clock: Box<dyn Clock>,
    throttle: Mutex<ThrottleState>,
    frame: RwLock<Option<Arc<StoredFrame>>>,
    metadata: Mutex<CaptureMetadata>,
    listener: Mutex<Option<ListenerSlot>>,
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl FrameCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, MonotonicClock::default())
    }

    pub fn with_clock(config: CacheConfig, clock: impl Clock + 'static) -> Self {
        FrameCache {
            config,
            clock: Box::new(clock),
            throttle: Mutex::new(ThrottleState::default()),
            frame: RwLock::new(None),
            metadata: Mutex::new(CaptureMetadata::default()),
            listener: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Offer a frame using the configured minimum interval.
    ///
    /// Returns `false` when the frame was throttled or could not be
    /// normalized; the previous frame stays cached in either case.
    pub fn accept<F: Frame + ?Sized>(&self, frame: &F) -> bool {
        self.accept_with_interval(frame, None)
    }

    /// Like [`accept`](Self::accept) with a per-call minimum interval.
    pub fn accept_with_interval<F: Frame + ?Sized>(
        &self,
        frame: &F,
        min_interval: Option<Duration>,
    ) -> bool {
        match self.try_accept(frame, min_interval) {
            Ok(()) => true,
            Err(Error::Throttled) => false,
            Err(e) => {
                warn!("dropping frame: {e}");
                false
            }
        }
    }

    /// Offer a frame, reporting why it was not stored.
    pub fn try_accept<F: Frame + ?Sized>(
        &self,
        frame: &F,
        min_interval: Option<Duration>,
    ) -> Result<()> {
        let mut throttle = lock(&self.throttle);
        let now = self.clock.now();
        let min_interval = min_interval.unwrap_or(self.config.min_interval);

        if let Some(last) = throttle.last_accept
            && now.saturating_sub(last) < min_interval
        {
            trace!("frame throttled, {:?} since last accept", now.saturating_sub(last));
            return Err(Error::Throttled);
        }

        let layout = normalize(frame)?;
        let stored = Arc::new(StoredFrame {
            layout,
            size: frame.size(),
            capture_time_ns: frame.timestamp().as_nanos(),
        });

        *self.frame.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&stored));
        throttle.last_accept = Some(now);
        debug!(
            "cached {}x{} frame ({} bytes)",
            stored.size.width,
            stored.size.height,
            stored.layout.byte_len()
        );

        self.deliver(&stored);
        Ok(())
    }

    /// Overwrite all three metadata fields at once.
    pub fn update_metadata(
        &self,
        aperture: Option<f64>,
        exposure_time_ns: Option<i64>,
        iso: Option<f64>,
    ) {
        *lock(&self.metadata) = CaptureMetadata {
            aperture,
            exposure_time_ns,
            iso,
        };
    }

    pub fn metadata(&self) -> CaptureMetadata {
        *lock(&self.metadata)
    }

    /// Snapshot of the current generation, `None` until a frame is accepted.
    pub fn current_frame(&self) -> Option<Arc<StoredFrame>> {
        self.frame
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Describe the current frame for the plugin transport.
    ///
    /// Pass `copy_bytes = true` whenever the descriptor is handed off
    /// asynchronously.
    pub fn preview(&self, copy_bytes: bool) -> Option<PreviewDescriptor> {
        let frame = self.current_frame()?;
        Some(PreviewDescriptor::build(
            &frame,
            self.embedded_metadata(),
            copy_bytes,
        ))
    }

    /// Register the listener notified with a preview of every accepted frame.
    /// Replaces any previous listener.
    pub fn set_listener<L>(&self, listener: L)
    where
        L: Fn(PreviewDescriptor) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let slot = match self.config.dispatch {
            ListenerDispatch::Inline => ListenerSlot::Inline(listener),
            ListenerDispatch::Queued { capacity } => spawn_listener_worker(listener, capacity),
        };
        *lock(&self.listener) = Some(slot);
    }

    pub fn clear_listener(&self) {
        *lock(&self.listener) = None;
    }

    fn embedded_metadata(&self) -> Option<CaptureMetadata> {
        self.config.embed_metadata.then(|| self.metadata())
    }

    fn deliver(&self, frame: &StoredFrame) {
        let Some(slot) = lock(&self.listener).clone() else {
            return;
        };
        let descriptor = PreviewDescriptor::build(frame, self.embedded_metadata(), true);
        match slot {
            ListenerSlot::Inline(listener) => call_listener(&listener, descriptor),
            ListenerSlot::Queued(tx) => match tx.try_send(descriptor) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("listener queue full, preview dropped"),
                Err(TrySendError::Disconnected(_)) => debug!("listener worker gone"),
            },
        }
    }
}

fn spawn_listener_worker(listener: Listener, capacity: usize) -> ListenerSlot {
    let (tx, rx) = crossbeam_channel::bounded::<PreviewDescriptor>(capacity.max(1));
    let worker_listener = Arc::clone(&listener);
    let spawned = std::thread::Builder::new()
        .name("frame-cache-listener".into())
        .spawn(move || {
            // Ends once the cache drops or replaces the sender.
            for descriptor in rx {
                call_listener(&worker_listener, descriptor);
            }
        });
    match spawned {
        Ok(_) => ListenerSlot::Queued(tx),
        Err(e) => {
            warn!("could not spawn listener worker, delivering inline: {e}");
            ListenerSlot::Inline(listener)
        }
    }
}

fn call_listener(listener: &Listener, descriptor: PreviewDescriptor) {
    if catch_unwind(AssertUnwindSafe(|| listener(descriptor))).is_err() {
        warn!("preview listener panicked");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
