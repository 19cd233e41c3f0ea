pub mod cache;
pub mod coalescer;
pub mod controller;
pub mod promise;
pub mod range;

use tokio::time::Duration;

/// How long a quiet period must last before a coalesced fetch is issued.
pub const STATE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Hard ceiling on how long repeated triggers may keep postponing the
/// fetch.
pub const STATE_DEBOUNCE_MAX_WAIT: Duration = Duration::from_millis(1500);

/// How long a remote read stays trustworthy. Matches the default cloud
/// polling cadence (60s) plus slack, so a poll cycle normally refreshes
/// the cache before it expires.
pub const CACHE_TTL: Duration = Duration::from_secs(65);

/// Quiet period before a combined write window flushes upstream.
pub const WRITE_DEBOUNCE: Duration = Duration::from_millis(100);

/// Hard ceiling on how long successive fragments may keep postponing a
/// combined write.
pub const WRITE_DEBOUNCE_MAX_WAIT: Duration = Duration::from_millis(500);

pub use cache::StateCache;
pub use coalescer::RequestCoalescer;
pub use controller::{AccessoryController, CombineFn};
pub use promise::DebouncedPromise;
pub use range::RangeMap;
