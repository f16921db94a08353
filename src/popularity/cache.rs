//! Time-bounded cache over the popularity ranking.
//!
//! Holds one ranked snapshot of every catalog product. Reads inside the TTL
//! are served from memory without touching the record store. A stale or
//! absent snapshot is rebuilt by exactly one in-flight recomputation that
//! every concurrent caller shares. The recomputation runs on its own task and
//! completes even when every caller waiting on it goes away. Write paths
//! clear the snapshot through [`PopularityCache::invalidate`]; the next read
//! rebuilds it.

use crate::error::CakeRankError;
use crate::metrics::SharedMetrics;
use crate::model::ProductSignal;
use crate::popularity::aggregator::Aggregator;
use crate::popularity::clock::Clock;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default staleness window: 5 minutes
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age of a snapshot that may still be served
    pub ttl: Duration,
    /// Upper bound on a single recomputation, `None` for unbounded
    pub recompute_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            recompute_timeout: None,
        }
    }
}

/// Full ranked result set at a point in time. Never mutated once built.
#[derive(Debug)]
pub struct RankedSnapshot {
    pub entries: Vec<ProductSignal>,
    /// Freshness reference, taken from the cache's clock
    pub computed_at: Instant,
    pub built_at: DateTime<Utc>,
    pub build_duration: Duration,
}

/// A top-N slice of a snapshot
#[derive(Debug, Clone)]
pub struct TopN {
    snapshot: Arc<RankedSnapshot>,
    len: usize,
    /// Served from a fresh snapshot without waiting on a recomputation
    pub cached: bool,
}

impl TopN {
    fn new(snapshot: Arc<RankedSnapshot>, n: usize, cached: bool) -> Self {
        let len = n.min(snapshot.entries.len());
        Self {
            snapshot,
            len,
            cached,
        }
    }

    pub fn entries(&self) -> &[ProductSignal] {
        &self.snapshot.entries[..self.len]
    }

    pub fn snapshot(&self) -> &Arc<RankedSnapshot> {
        &self.snapshot
    }
}

/// Write-side events that change at least one popularity signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEvent {
    OrderPlaced,
    OrderStatusChanged,
    CommentAdded,
    CommentUpdated,
    CommentDeleted,
}

impl WriteEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteEvent::OrderPlaced => "order_placed",
            WriteEvent::OrderStatusChanged => "order_status_changed",
            WriteEvent::CommentAdded => "comment_added",
            WriteEvent::CommentUpdated => "comment_updated",
            WriteEvent::CommentDeleted => "comment_deleted",
        }
    }
}

impl fmt::Display for WriteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type FlightResult = Result<Arc<RankedSnapshot>, CakeRankError>;
type Flight = Shared<BoxFuture<'static, FlightResult>>;

struct InFlight {
    id: u64,
    /// Invalidation generation the recomputation was started under
    generation: u64,
    flight: Flight,
}

enum Lookup {
    Fresh(Arc<RankedSnapshot>),
    Pending(Flight),
}

struct SnapshotState {
    current: RwLock<Option<Arc<RankedSnapshot>>>,
    /// Bumped by every invalidation
    generation: AtomicU64,
    inflight: Mutex<Option<InFlight>>,
}

impl SnapshotState {
    /// Install a finished snapshot unless an invalidation happened since the
    /// recomputation started.
    fn install(&self, snapshot: Arc<RankedSnapshot>, generation: u64) -> bool {
        let mut current = self.current.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        *current = Some(snapshot);
        true
    }

    fn finish_flight(&self, id: u64) {
        let mut inflight = self.inflight.lock();
        if inflight.as_ref().is_some_and(|f| f.id == id) {
            *inflight = None;
        }
    }
}

/// Popularity cache with injected TTL and clock
pub struct PopularityCache {
    aggregator: Aggregator,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    state: Arc<SnapshotState>,
    next_flight: AtomicU64,
    metrics: SharedMetrics,
}

impl PopularityCache {
    pub fn new(
        aggregator: Aggregator,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            aggregator,
            clock,
            config,
            state: Arc::new(SnapshotState {
                current: RwLock::new(None),
                generation: AtomicU64::new(0),
                inflight: Mutex::new(None),
            }),
            next_flight: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The first `min(n, catalog size)` products by popularity.
    ///
    /// A fresh snapshot is served synchronously. Otherwise the caller joins the
    /// current recomputation, or starts one, and gets its result or its error.
    pub async fn get_top_n(&self, n: usize) -> Result<TopN, CakeRankError> {
        if n == 0 {
            return Err(CakeRankError::Validation(
                "At least one entry must be requested".to_string(),
            ));
        }

        if let Some(snapshot) = self.fresh_snapshot() {
            self.metrics.record_cache_lookup("hit");
            debug!(n, entries = snapshot.entries.len(), "Popularity cache HIT");
            return Ok(TopN::new(snapshot, n, true));
        }

        match self.join_or_start_flight() {
            Lookup::Fresh(snapshot) => {
                self.metrics.record_cache_lookup("hit");
                Ok(TopN::new(snapshot, n, true))
            }
            Lookup::Pending(flight) => {
                let snapshot = flight.await?;
                Ok(TopN::new(snapshot, n, false))
            }
        }
    }

    /// Drop the snapshot so the next read recomputes, regardless of TTL.
    /// Never triggers a recomputation by itself.
    pub fn invalidate(&self) {
        let (generation, had_snapshot) = {
            let mut current = self.state.current.write();
            let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, current.take().is_some())
        };
        self.metrics.update_snapshot_metrics(None);
        debug!(generation, had_snapshot, "Popularity cache invalidated");
    }

    /// Invalidation hook for write paths, called after the write has committed
    pub fn invalidate_after(&self, event: WriteEvent) {
        self.invalidate();
        self.metrics.record_invalidation(event.as_str());
        info!(event = %event, "Popularity ranking invalidated by write");
    }

    /// Current snapshot regardless of freshness
    pub fn snapshot(&self) -> Option<Arc<RankedSnapshot>> {
        self.state.current.read().clone()
    }

    /// Age of the current snapshot, if one exists
    pub fn snapshot_age(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.snapshot()
            .map(|s| now.saturating_duration_since(s.computed_at))
    }

    fn fresh_snapshot(&self) -> Option<Arc<RankedSnapshot>> {
        let now = self.clock.now();
        self.state
            .current
            .read()
            .as_ref()
            .filter(|s| now.saturating_duration_since(s.computed_at) < self.config.ttl)
            .cloned()
    }

    fn join_or_start_flight(&self) -> Lookup {
        let mut inflight = self.state.inflight.lock();

        // A flight may have finished between the first check and taking the lock
        if let Some(snapshot) = self.fresh_snapshot() {
            return Lookup::Fresh(snapshot);
        }

        let generation = self.state.generation.load(Ordering::SeqCst);
        if let Some(current) = inflight.as_ref() {
            if current.generation == generation {
                self.metrics.record_cache_lookup("coalesced");
                debug!(flight = current.id, "Joining in-flight popularity recomputation");
                return Lookup::Pending(current.flight.clone());
            }
        }

        // Anything still in flight predates an invalidation: let it finish
        // first so recomputations never overlap, but do not reuse its result.
        let superseded = inflight.take().map(|f| f.flight);
        let id = self.next_flight.fetch_add(1, Ordering::SeqCst);
        // Runs in its own task so a dropped caller never stalls the flight
        let task = tokio::spawn(self.recompute(id, generation, superseded));
        let state = self.state.clone();
        let flight = task
            .map(move |joined| match joined {
                Ok(result) => result,
                Err(e) => {
                    state.finish_flight(id);
                    Err(CakeRankError::Internal(format!(
                        "Recomputation task failed: {}",
                        e
                    )))
                }
            })
            .boxed()
            .shared();

        *inflight = Some(InFlight {
            id,
            generation,
            flight: flight.clone(),
        });

        self.metrics.record_cache_lookup("miss");
        info!(flight = id, generation, "Popularity cache MISS, recomputing ranking");
        Lookup::Pending(flight)
    }

    fn recompute(
        &self,
        id: u64,
        generation: u64,
        superseded: Option<Flight>,
    ) -> impl Future<Output = FlightResult> + Send + 'static {
        let aggregator = self.aggregator.clone();
        let clock = self.clock.clone();
        let state = self.state.clone();
        let metrics = self.metrics.clone();
        let timeout = self.config.recompute_timeout;

        async move {
            if let Some(previous) = superseded {
                let _ = previous.await;
            }

            let start = Instant::now();
            let computed = match timeout {
                Some(limit) => tokio::time::timeout(limit, aggregator.compute())
                    .await
                    .unwrap_or_else(|_| Err(CakeRankError::Timeout(limit))),
                None => aggregator.compute().await,
            };
            let elapsed = start.elapsed();

            let result = match computed {
                Ok(entries) => {
                    let snapshot = Arc::new(RankedSnapshot {
                        entries,
                        computed_at: clock.now(),
                        built_at: Utc::now(),
                        build_duration: elapsed,
                    });

                    metrics.record_recompute("success", elapsed.as_secs_f64());
                    if state.install(snapshot.clone(), generation) {
                        metrics.update_snapshot_metrics(Some(snapshot.as_ref()));
                        info!(
                            flight = id,
                            entries = snapshot.entries.len(),
                            duration_ms = elapsed.as_millis() as u64,
                            "Popularity snapshot rebuilt"
                        );
                    } else {
                        warn!(
                            flight = id,
                            generation,
                            "Cache invalidated during recomputation, result not cached"
                        );
                    }
                    Ok(snapshot)
                }
                Err(e) => {
                    metrics.record_recompute("failure", elapsed.as_secs_f64());
                    error!(flight = id, error = %e, "Popularity recomputation failed");
                    Err(e)
                }
            };

            state.finish_flight(id);
            result
        }
    }
}
