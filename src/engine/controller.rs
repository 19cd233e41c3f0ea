use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tokio::time::{Instant, sleep_until};
use tuya::{ApiMethod, DeviceState, TuyaError, TuyaResult};

use crate::backend::DeviceTransport;
use crate::engine::{
    DebouncedPromise, RequestCoalescer, WRITE_DEBOUNCE, WRITE_DEBOUNCE_MAX_WAIT,
};

/// Callback invoked whenever a fresh device state bag arrives, from
/// polling or from a write's side effect.
pub type PushHandler = Box<dyn Fn(&DeviceState) + Send + Sync>;

/// Builds the final payload and optimistic cache fragment for a combined
/// write, from the merged fragment set and the cached snapshot (for the
/// components no fragment supplied).
pub type CombineFn = fn(&Map<String, Value>, Option<&DeviceState>) -> (Value, DeviceState);

/// A combined write waiting for its debounce window to fire. Fragments
/// from successive callers shallow-merge; every caller shares the one
/// upstream outcome.
struct PendingWrite {
    method: ApiMethod,
    fragments: Map<String, Value>,
    combine: CombineFn,
    promise: DebouncedPromise<()>,
    started: Instant,
    deadline: Instant,
}

/// The single sanctioned access path to one device's state.
///
/// Owns the per-device coalescer (which in turn owns the cache and the
/// pending fetch) and a synchronous dispatch table of push handlers keyed
/// by characteristic name. Characteristic adapters never touch the cache
/// directly; reads go through the coalescer, writes go upstream first and
/// merge their optimistic fragment only after the upstream confirms.
pub struct AccessoryController {
    device_id: String,
    transport: Arc<dyn DeviceTransport>,
    coalescer: RequestCoalescer,
    handlers: Arc<Mutex<HashMap<&'static str, PushHandler>>>,
    pending_write: Arc<tokio::sync::Mutex<Option<PendingWrite>>>,
}

impl AccessoryController {
    #[must_use]
    pub fn new(device_id: String, transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            coalescer: RequestCoalescer::new(device_id.clone(), Arc::clone(&transport)),
            device_id,
            transport,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            pending_write: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Current device state, coalesced and cached.
    pub async fn get_device_state(&self) -> TuyaResult<DeviceState> {
        self.coalescer.request().await
    }

    /// Issue an upstream write, then merge the optimistic `cache` fragment
    /// and fan the merged state out to every registered handler, so
    /// dependent characteristics stay consistent without a round trip.
    ///
    /// The fragment is merged post-confirmation: a failed write never
    /// reaches the cache.
    pub async fn set_device_state(
        &self,
        method: ApiMethod,
        payload: Value,
        cache: DeviceState,
    ) -> TuyaResult<()> {
        self.transport
            .send_device_command(&self.device_id, method, payload)
            .await?;

        self.coalescer.merge_cache(&cache).await;
        if let Some(merged) = self.coalescer.cached_state(true).await {
            Self::dispatch_to(&self.handlers, &merged);
        }
        Ok(())
    }

    /// A write that joins a per-accessory debounce window instead of going
    /// upstream on its own: near-simultaneous fragments for the same
    /// method shallow-merge and flush as one upstream call, with `combine`
    /// filling in the components no fragment supplied. Used for the color
    /// triple, where hue and saturation arrive as separate protocol writes
    /// but the API only accepts a complete color.
    pub async fn set_device_state_combined(
        &self,
        method: ApiMethod,
        fragment: Value,
        combine: CombineFn,
    ) -> TuyaResult<()> {
        let Value::Object(fragment) = fragment else {
            return Err(TuyaError::api("combined write fragment must be an object"));
        };

        let rx = {
            let mut pending = self.pending_write.lock().await;
            let now = Instant::now();
            match pending.as_mut() {
                Some(open) if open.method == method => {
                    for (key, value) in fragment {
                        open.fragments.insert(key, value);
                    }
                    open.deadline =
                        (now + WRITE_DEBOUNCE).min(open.started + WRITE_DEBOUNCE_MAX_WAIT);
                    open.promise.subscribe()
                }
                Some(_) => {
                    // The open window belongs to another method; send this
                    // write directly rather than flushing someone else's.
                    drop(pending);
                    let cached = self.coalescer.cached_state(true).await;
                    let (payload, cache) = combine(&fragment, cached.as_ref());
                    return self.set_device_state(method, payload, cache).await;
                }
                None => {
                    let mut promise = DebouncedPromise::new();
                    let rx = promise.subscribe();
                    *pending = Some(PendingWrite {
                        method,
                        fragments: fragment,
                        combine,
                        promise,
                        started: now,
                        deadline: now + WRITE_DEBOUNCE,
                    });
                    self.spawn_write_driver();
                    rx
                }
            }
        };

        rx.await
            .map_err(|_| TuyaError::api("combined write dropped before settling"))?
    }

    /// Entry point for the polling collaborator: merge a freshly fetched
    /// state bag (extending the cache TTL) and fan it out.
    pub async fn push_state(&self, state: &DeviceState) {
        self.coalescer.set_cache(state).await;
        if let Some(merged) = self.coalescer.cached_state(true).await {
            Self::dispatch_to(&self.handlers, &merged);
        }
    }

    /// Last-known snapshot; `always` returns it even when expired.
    pub async fn cached_state(&self, always: bool) -> Option<DeviceState> {
        self.coalescer.cached_state(always).await
    }

    /// Add an entry to the push-dispatch table. One handler per
    /// characteristic; re-registering replaces the old one.
    pub fn register_adapter(&self, key: &'static str, handler: PushHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.insert(key, handler);
        }
    }

    fn dispatch_to(handlers: &Mutex<HashMap<&'static str, PushHandler>>, state: &DeviceState) {
        if let Ok(handlers) = handlers.lock() {
            for handler in handlers.values() {
                handler(state);
            }
        }
    }

    fn spawn_write_driver(&self) {
        let device_id = self.device_id.clone();
        let transport = Arc::clone(&self.transport);
        let coalescer = self.coalescer.clone();
        let handlers = Arc::clone(&self.handlers);
        let pending = Arc::clone(&self.pending_write);
        tokio::spawn(async move {
            Self::drive_write(&device_id, transport.as_ref(), &coalescer, &handlers, &pending)
                .await;
        });
    }

    async fn drive_write(
        device_id: &str,
        transport: &dyn DeviceTransport,
        coalescer: &RequestCoalescer,
        handlers: &Mutex<HashMap<&'static str, PushHandler>>,
        pending: &tokio::sync::Mutex<Option<PendingWrite>>,
    ) {
        // Wait out the debounce window; each wakeup re-checks the deadline
        // since late fragments keep pushing it.
        let mut write = loop {
            let deadline = {
                let pending = pending.lock().await;
                match &*pending {
                    Some(open) => open.deadline,
                    None => return,
                }
            };
            sleep_until(deadline).await;

            let mut guard = pending.lock().await;
            let Some(open) = guard.as_ref() else {
                return;
            };
            if Instant::now() < open.deadline {
                continue;
            }
            // Take the window: fragments arriving from here on open a new
            // one instead of racing into an in-flight send.
            match guard.take() {
                Some(open) => break open,
                None => return,
            }
        };

        let cached = coalescer.cached_state(true).await;
        let (payload, cache) = (write.combine)(&write.fragments, cached.as_ref());
        log::debug!("[{device_id}] flushing combined {} write", write.method.name());

        match transport
            .send_device_command(device_id, write.method, payload)
            .await
        {
            Ok(()) => {
                coalescer.merge_cache(&cache).await;
                if let Some(merged) = coalescer.cached_state(true).await {
                    Self::dispatch_to(handlers, &merged);
                }
                write.promise.resolve(());
            }
            Err(err) => write.promise.reject(err),
        }
    }
}
