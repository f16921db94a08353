//! Popularity scoring and its time-bounded cache.
//!
//! - `aggregator`: per-product signals and the popularity score
//! - `cache`: ranked snapshot with TTL, single-flight rebuild and invalidation
//! - `clock`: injectable time source for freshness checks

pub mod aggregator;
pub mod cache;
pub mod clock;

pub use aggregator::Aggregator;
pub use cache::{CacheConfig, PopularityCache, RankedSnapshot, WriteEvent};
pub use clock::SystemClock;
