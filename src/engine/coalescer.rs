use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tuya::{DeviceState, TuyaError, TuyaResult};

use crate::backend::DeviceTransport;
use crate::engine::{
    DebouncedPromise, STATE_DEBOUNCE, STATE_DEBOUNCE_MAX_WAIT, StateCache,
};

/// Per-accessory debounced fetch.
///
/// Collapses a burst of concurrent state reads into at most one upstream
/// call. The state machine per accessory is Idle -> Coalescing ->
/// Fetching: the first read opens a debounce window, every further read
/// pushes the window's deadline (capped at a hard maximum wait) and
/// attaches to the same pending outcome. When the window fires, a live
/// cache entry settles it without a network call; otherwise exactly one
/// fetch runs and its result (or failure) fans out to every waiter.
///
/// Rate-limit failures degrade to the stale cache snapshot when one exists
/// and reports the device reachable; a payload reporting the device
/// offline is a failure for all callers, never a value.
///
/// Clones share the same cache and pending window.
#[derive(Clone)]
pub struct RequestCoalescer {
    device_id: String,
    transport: Arc<dyn DeviceTransport>,
    shared: Arc<Mutex<Shared>>,
}

#[derive(Default)]
struct Shared {
    cache: StateCache,
    pending: Option<PendingFetch>,
}

/// The next coalesced fetch. Exactly one exists per accessory at a time;
/// it is unset immediately after settlement so the next read opens a
/// fresh window.
struct PendingFetch {
    promise: DebouncedPromise<DeviceState>,
    started: Instant,
    deadline: Instant,
    fetching: bool,
}

impl RequestCoalescer {
    #[must_use]
    pub fn new(device_id: String, transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            device_id,
            transport,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Request the current device state, joining the open debounce window
    /// if there is one.
    pub async fn request(&self) -> TuyaResult<DeviceState> {
        let rx = {
            let mut shared = self.shared.lock().await;
            let now = Instant::now();
            if let Some(pending) = shared.pending.as_mut() {
                if !pending.fetching {
                    pending.deadline = (now + STATE_DEBOUNCE)
                        .min(pending.started + STATE_DEBOUNCE_MAX_WAIT);
                }
                pending.promise.subscribe()
            } else {
                let mut promise = DebouncedPromise::new();
                let rx = promise.subscribe();
                shared.pending = Some(PendingFetch {
                    promise,
                    started: now,
                    deadline: now + STATE_DEBOUNCE,
                    fetching: false,
                });
                self.spawn_driver();
                rx
            }
        };

        rx.await
            .map_err(|_| TuyaError::api("state request dropped before settling"))?
    }

    /// Snapshot of the cache, bypassing the expiry check if `always`.
    pub async fn cached_state(&self, always: bool) -> Option<DeviceState> {
        self.shared.lock().await.cache.get(always).cloned()
    }

    /// Merge a fresh upstream state bag, extending the cache TTL.
    pub async fn set_cache(&self, state: &DeviceState) {
        self.shared.lock().await.cache.set(state);
    }

    /// Merge an optimistic write fragment without extending the TTL.
    pub async fn merge_cache(&self, fragment: &DeviceState) {
        self.shared.lock().await.cache.merge(fragment);
    }

    fn spawn_driver(&self) {
        let device_id = self.device_id.clone();
        let transport = Arc::clone(&self.transport);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            Self::drive(&device_id, transport.as_ref(), &shared).await;
        });
    }

    async fn drive(
        device_id: &str,
        transport: &dyn DeviceTransport,
        shared: &Mutex<Shared>,
    ) {
        // Coalescing: wait out the debounce window. Each wakeup re-checks
        // the deadline, since callers keep pushing it while we sleep.
        loop {
            let deadline = {
                let shared = shared.lock().await;
                match &shared.pending {
                    Some(pending) => pending.deadline,
                    None => return,
                }
            };
            sleep_until(deadline).await;

            let mut guard = shared.lock().await;
            let Some(pending) = guard.pending.as_mut() else {
                return;
            };
            if Instant::now() < pending.deadline {
                continue;
            }
            pending.fetching = true;

            // A live cache entry settles the window without a network call.
            if let Some(state) = guard.cache.get(false).cloned() {
                log::debug!("[{device_id}] state request served from cache");
                if let Some(mut pending) = guard.pending.take() {
                    Self::settle(&mut pending.promise, state);
                }
                return;
            }
            break;
        }

        let result = transport.fetch_device_state(device_id).await;

        let mut guard = shared.lock().await;
        let Some(mut pending) = guard.pending.take() else {
            return;
        };

        match result {
            Ok(state) => {
                guard.cache.set(&state);
                log::debug!("[{device_id}] state request served from remote");
                Self::settle(&mut pending.promise, state);
            }
            Err(err) if err.is_rate_limit() => match guard.cache.get(true) {
                Some(stale) if stale.is_online() => {
                    let stale = stale.clone();
                    guard.cache.renew();
                    log::debug!("[{device_id}] rate limited, renewing stale state");
                    pending.promise.resolve(stale);
                }
                _ => pending.promise.reject(TuyaError::DeviceOffline),
            },
            Err(err) => pending.promise.reject(err),
        }
    }

    /// A payload that reports the device unreachable is a failure for all
    /// callers, not a value.
    fn settle(promise: &mut DebouncedPromise<DeviceState>, state: DeviceState) {
        if state.is_online() {
            promise.resolve(state);
        } else {
            promise.reject(TuyaError::DeviceOffline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CACHE_TTL;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{self, Duration};
    use tuya::{ApiMethod, DeviceConfig};

    struct ScriptedTransport {
        responses: std::sync::Mutex<VecDeque<TuyaResult<DeviceState>>>,
        fetches: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<TuyaResult<DeviceState>>) -> Arc<Self> {
            Arc::new(Self {
                responses: std::sync::Mutex::new(responses.into()),
                fetches: AtomicUsize::new(0),
            })
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeviceTransport for ScriptedTransport {
        async fn fetch_device_state(&self, _device_id: &str) -> TuyaResult<DeviceState> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TuyaError::api("no scripted response left")))
        }

        async fn send_device_command(
            &self,
            _device_id: &str,
            _method: ApiMethod,
            _payload: Value,
        ) -> TuyaResult<()> {
            Ok(())
        }

        async fn fetch_all_devices(&self) -> TuyaResult<Vec<DeviceConfig>> {
            Ok(Vec::new())
        }
    }

    fn online_state(brightness: i64) -> DeviceState {
        DeviceState::new()
            .with("online", json!(true))
            .with("brightness", json!(brightness))
    }

    fn coalescer(transport: &Arc<ScriptedTransport>) -> Arc<RequestCoalescer> {
        Arc::new(RequestCoalescer::new(
            "dev1".to_string(),
            Arc::clone(transport) as Arc<dyn DeviceTransport>,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_reads_coalesces_into_one_fetch() {
        let transport = ScriptedTransport::new(vec![Ok(online_state(42))]);
        let coalescer = coalescer(&transport);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&coalescer);
            handles.push(tokio::spawn(async move { c.request().await }));
        }

        for handle in handles {
            let state = handle.await.unwrap().unwrap();
            assert_eq!(state.number("brightness"), Some(42.0));
        }
        assert_eq!(transport.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_within_ttl_is_served_from_cache() {
        let transport = ScriptedTransport::new(vec![Ok(online_state(1))]);
        let coalescer = coalescer(&transport);

        coalescer.request().await.unwrap();
        time::advance(Duration::from_secs(10)).await;
        let state = coalescer.request().await.unwrap();

        assert_eq!(state.number("brightness"), Some(1.0));
        assert_eq!(transport.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_after_ttl_triggers_new_fetch() {
        let transport =
            ScriptedTransport::new(vec![Ok(online_state(1)), Ok(online_state(2))]);
        let coalescer = coalescer(&transport);

        coalescer.request().await.unwrap();
        time::advance(CACHE_TTL).await;
        let state = coalescer.request().await.unwrap();

        assert_eq!(state.number("brightness"), Some(2.0));
        assert_eq!(transport.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_payload_rejects_every_waiter() {
        let offline = DeviceState::new().with("online", json!(false));
        let transport = ScriptedTransport::new(vec![Ok(offline)]);
        let coalescer = coalescer(&transport);

        let mut handles = Vec::new();
        for _ in 0..3 {
            let c = Arc::clone(&coalescer);
            handles.push(tokio::spawn(async move { c.request().await }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err(TuyaError::DeviceOffline));
        }
        // The payload is still cached, so the offline flag survives for
        // the stale-fallback path.
        assert!(coalescer.cached_state(true).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_serves_renewed_stale_state() {
        let transport = ScriptedTransport::new(vec![
            Ok(online_state(7)),
            Err(TuyaError::RateLimit("Requesting too quickly.".into())),
        ]);
        let coalescer = coalescer(&transport);

        coalescer.request().await.unwrap();
        time::advance(CACHE_TTL).await;

        let state = coalescer.request().await.unwrap();
        assert_eq!(state.number("brightness"), Some(7.0));
        assert_eq!(transport.fetch_count(), 2);

        // renew() extended the expiry, so the next read needs no fetch.
        let state = coalescer.request().await.unwrap();
        assert_eq!(state.number("brightness"), Some(7.0));
        assert_eq!(transport.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_without_snapshot_rejects_offline() {
        let transport = ScriptedTransport::new(vec![Err(TuyaError::RateLimit(
            "Requesting too quickly.".into(),
        ))]);
        let coalescer = coalescer(&transport);

        assert_eq!(coalescer.request().await, Err(TuyaError::DeviceOffline));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_with_offline_snapshot_rejects_offline() {
        let offline = DeviceState::new().with("online", json!(false));
        let transport = ScriptedTransport::new(vec![
            Ok(offline),
            Err(TuyaError::RateLimit("Requesting too quickly.".into())),
        ]);
        let coalescer = coalescer(&transport);

        assert_eq!(coalescer.request().await, Err(TuyaError::DeviceOffline));
        time::advance(CACHE_TTL).await;
        assert_eq!(coalescer.request().await, Err(TuyaError::DeviceOffline));
        assert_eq!(transport.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_propagate_unchanged() {
        let transport = ScriptedTransport::new(vec![Err(TuyaError::Authentication(
            "token expired".into(),
        ))]);
        let coalescer = coalescer(&transport);

        assert_eq!(
            coalescer.request().await,
            Err(TuyaError::Authentication("token expired".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn max_wait_caps_repeated_debouncing() {
        // First window fails with an auth error (which does not populate
        // the cache), so a second window must fetch again.
        let transport = ScriptedTransport::new(vec![
            Err(TuyaError::Authentication("no session".into())),
            Ok(online_state(9)),
        ]);
        let coalescer = coalescer(&transport);

        // Trigger every 400ms; without the max-wait cap all six calls
        // would keep one window open forever and coalesce into one fetch.
        let mut handles = Vec::new();
        for _ in 0..6 {
            let c = Arc::clone(&coalescer);
            handles.push(tokio::spawn(async move { c.request().await }));
            time::advance(Duration::from_millis(400)).await;
        }

        let mut failures = 0;
        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(state) => {
                    assert_eq!(state.number("brightness"), Some(9.0));
                    successes += 1;
                }
                Err(TuyaError::Authentication(_)) => failures += 1,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }

        assert_eq!(transport.fetch_count(), 2);
        assert_eq!(failures, 4);
        assert_eq!(successes, 2);
    }
}
