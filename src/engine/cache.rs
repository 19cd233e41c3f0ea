use tokio::time::Instant;
use tuya::DeviceState;

use crate::engine::CACHE_TTL;

/// TTL-bounded store of the last-known device state bag.
///
/// An entry past its expiry is never served unless the caller explicitly
/// asks for it (`get(true)`), which is only valid as the last-resort
/// fallback under upstream rate limiting. An unexpired snapshot is still
/// only as complete as the keys it holds; callers must treat missing keys
/// as unknown.
#[derive(Debug, Default)]
pub struct StateCache {
    value: Option<DeviceState>,
    valid_until: Option<Instant>,
}

impl StateCache {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: None,
            valid_until: None,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
            && self
                .valid_until
                .is_some_and(|deadline| Instant::now() < deadline)
    }

    /// Merge `data` into the snapshot and extend the expiry to now + TTL.
    pub fn set(&mut self, data: &DeviceState) {
        self.valid_until = Some(Instant::now() + CACHE_TTL);
        self.merge(data);
    }

    /// Merge without touching the expiry. Used for optimistic write
    /// fragments: a confirmed write updates the keys it changed but does
    /// not make the rest of a stale snapshot trustworthy again.
    pub fn merge(&mut self, data: &DeviceState) {
        match &mut self.value {
            Some(value) => value.merge(data),
            None => self.value = Some(data.clone()),
        }
    }

    /// Re-set the current snapshot, extending its expiry without new data.
    /// Last-resort fallback while the upstream is throttling us.
    pub fn renew(&mut self) {
        if let Some(value) = self.value.clone() {
            self.set(&value);
        }
    }

    /// The stored snapshot, or `None` once expired. `always` bypasses the
    /// expiry check ("return stale").
    #[must_use]
    pub fn get(&self, always: bool) -> Option<&DeviceState> {
        if !always && !self.is_valid() {
            return None;
        }
        self.value.as_ref()
    }
}
