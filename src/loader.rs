//! Single-flight feed loading.
//!
//! [`FeedLoader`] owns the load state machine (`Idle` → `Loading` → `Loaded`)
//! and runs each fetch+parse unit as a tokio task. Completed units post a
//! [`LoaderEvent`] on a channel; the controlling context hands every event
//! back to [`FeedLoader::handle_event`], which is the only place results are
//! cached and delivered. This keeps all state mutation on one context and lets
//! stale results be dropped by comparing generation counters.
//!
//! ```ignore
//! let (mut loader, mut events) = FeedLoader::new(Arc::new(fetcher), ParseOptions::default());
//! loader.set_observer(|result: &LoadResult| render(result));
//! loader.start(url);
//! while let Some(event) = events.recv().await {
//!     loader.handle_event(event);
//! }
//! ```

use crate::feed::{parse_feed, FeedRecord, FeedSource, LoadError, LoadResult, ParseOptions, ParsedFeed};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Receives exactly one [`LoadResult`] per completed load episode.
pub trait LoadObserver: Send {
    fn on_load_finished(&mut self, result: &LoadResult);
}

impl<F> LoadObserver for F
where
    F: FnMut(&LoadResult) + Send,
{
    fn on_load_finished(&mut self, result: &LoadResult) {
        self(result)
    }
}

/// Externally visible loader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStatus {
    /// Nothing cached, nothing in flight
    Idle,
    /// One fetch+parse unit is in flight
    Loading,
    /// A successful result is cached
    Loaded,
}

enum LoaderState {
    Idle,
    Loading { url: String },
    Loaded { url: String, records: Arc<[FeedRecord]> },
}

/// Completion message from a background load unit.
///
/// Opaque to hosts: pass it straight to [`FeedLoader::handle_event`].
#[derive(Debug)]
pub struct LoaderEvent {
    generation: u64,
    url: String,
    result: LoadResult,
}

impl LoaderEvent {
    pub fn url(&self) -> &str {
        &self.url
    }
}

pub struct FeedLoader {
    source: Arc<dyn FeedSource>,
    options: Arc<ParseOptions>,
    state: LoaderState,

    /// Generation counter for load units.
    ///
    /// Incremented on every start and on reset. Each spawned unit carries the
    /// value current at spawn time; events whose generation no longer matches
    /// were superseded and are dropped without delivery.
    generation: u64,

    /// Handle to the in-flight unit, aborted when superseded or reset.
    handle: Option<JoinHandle<()>>,

    event_tx: mpsc::Sender<LoaderEvent>,
    observer: Option<Box<dyn LoadObserver>>,
}

impl FeedLoader {
    /// Creates an idle loader and the receiver its background units report on.
    ///
    /// The caller must feed every received event into [`handle_event`](Self::handle_event).
    pub fn new(
        source: Arc<dyn FeedSource>,
        options: ParseOptions,
    ) -> (Self, mpsc::Receiver<LoaderEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let loader = Self {
            source,
            options: Arc::new(options),
            state: LoaderState::Idle,
            generation: 0,
            handle: None,
            event_tx,
            observer: None,
        };
        (loader, event_rx)
    }

    /// Registers the observer, replacing any previous one.
    pub fn set_observer(&mut self, observer: impl LoadObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn status(&self) -> LoaderStatus {
        match self.state {
            LoaderState::Idle => LoaderStatus::Idle,
            LoaderState::Loading { .. } => LoaderStatus::Loading,
            LoaderState::Loaded { .. } => LoaderStatus::Loaded,
        }
    }

    /// Records from the last successful load, if still cached.
    pub fn cached(&self) -> Option<Arc<[FeedRecord]>> {
        match &self.state {
            LoaderState::Loaded { records, .. } => Some(Arc::clone(records)),
            _ => None,
        }
    }

    /// Starts a load episode for `url`.
    ///
    /// If the cached result came from the same URL it is delivered to the
    /// observer immediately and nothing is fetched. Otherwise any in-flight
    /// unit is aborted and a new one is spawned.
    ///
    /// Returns true if a background unit was spawned. Must be called from
    /// within a tokio runtime.
    pub fn start(&mut self, url: &str) -> bool {
        let cached = match &self.state {
            LoaderState::Loaded { url: cached_url, records } if cached_url == url => {
                Some(Arc::clone(records))
            }
            _ => None,
        };

        if let Some(records) = cached {
            tracing::debug!(url, records = records.len(), "Delivering cached feed");
            self.deliver(&Ok(records));
            return false;
        }

        self.begin(url);
        true
    }

    /// Discards any cached result and starts a fresh load of `url`.
    pub fn force_load(&mut self, url: &str) {
        if matches!(self.state, LoaderState::Loaded { .. }) {
            tracing::debug!(url, "Discarding cached feed for forced load");
        }
        self.state = LoaderState::Idle;
        self.begin(url);
    }

    /// Clears the cache, aborts any in-flight unit and returns to `Idle`.
    ///
    /// Nothing is delivered as a result of a reset.
    pub fn reset(&mut self) {
        self.cancel_in_flight();
        // Invalidates events already sitting in the channel
        self.generation += 1;
        self.state = LoaderState::Idle;
        tracing::debug!(generation = self.generation, "Loader reset");
    }

    /// Applies a completion event from a background unit.
    ///
    /// Returns true if the result was current and delivered to the observer.
    /// Successful results are cached; failures leave the loader `Idle`.
    pub fn handle_event(&mut self, event: LoaderEvent) -> bool {
        if event.generation != self.generation {
            tracing::debug!(
                expected = self.generation,
                got = event.generation,
                url = %event.url,
                "Ignoring stale feed load (generation mismatch)"
            );
            return false;
        }

        if !matches!(self.state, LoaderState::Loading { .. }) {
            tracing::debug!(url = %event.url, "Ignoring feed load result while not loading");
            return false;
        }

        self.handle = None;
        match &event.result {
            Ok(records) => {
                tracing::info!(url = %event.url, records = records.len(), "Feed loaded");
                self.state = LoaderState::Loaded {
                    url: event.url,
                    records: Arc::clone(records),
                };
            }
            Err(e) => {
                tracing::warn!(url = %event.url, error = %e, "Feed load failed");
                self.state = LoaderState::Idle;
            }
        }

        self.deliver(&event.result);
        true
    }

    fn begin(&mut self, url: &str) {
        self.cancel_in_flight();

        self.generation += 1;
        let generation = self.generation;
        tracing::debug!(url, generation, "Starting feed load");

        self.state = LoaderState::Loading {
            url: url.to_string(),
        };
        self.handle = Some(spawn_load(
            generation,
            url.to_string(),
            Arc::clone(&self.source),
            Arc::clone(&self.options),
            self.event_tx.clone(),
        ));
    }

    fn cancel_in_flight(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("Aborted previous feed load task");
        }
    }

    fn deliver(&mut self, result: &LoadResult) {
        match self.observer.as_mut() {
            Some(observer) => observer.on_load_finished(result),
            None => tracing::debug!("No observer registered, result not delivered"),
        }
    }
}

/// Abort any in-flight unit when the loader goes away.
impl Drop for FeedLoader {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("Aborted feed load task on loader drop");
        }
    }
}

/// Spawns one fetch+parse unit. Always posts exactly one event unless aborted.
fn spawn_load(
    generation: u64,
    url: String,
    source: Arc<dyn FeedSource>,
    options: Arc<ParseOptions>,
    tx: mpsc::Sender<LoaderEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = match catch_task_panic(run_load(source.as_ref(), &url, &options)).await {
            Ok(result) => result,
            Err(panic_msg) => {
                tracing::error!(task = "feed_load", generation, error = %panic_msg, "Background task panicked");
                Err(LoadError::WorkerPanicked(panic_msg))
            }
        };

        if let Err(e) = tx
            .send(LoaderEvent {
                generation,
                url,
                result,
            })
            .await
        {
            tracing::warn!(error = %e, event = "LoaderEvent", "Channel send failed (receiver dropped)");
        }
    })
}

async fn run_load(source: &dyn FeedSource, url: &str, options: &ParseOptions) -> LoadResult {
    let payload = source.fetch(url).await?;
    let ParsedFeed { records, skipped } = parse_feed(&payload, options)?;

    if skipped > 0 {
        tracing::warn!(url, skipped, "Malformed features skipped");
    }

    Ok(records.into())
}

/// Runs a future, converting a panic into its message.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        }
    })
}
