use std::collections::HashMap;
use std::sync::Arc;

use futures::future;
use log::{debug, info, warn};
use tokio::time::{self, Duration, MissedTickBehavior};

use tuya::{DeviceConfig, DeviceState, TuyaError, TuyaResult};

use crate::backend::DeviceTransport;
use crate::characteristics::{
    CharacteristicAdapter, CharacteristicKind, CharacteristicValue, descriptors_for,
};
use crate::config::AppConfig;
use crate::engine::AccessoryController;

/// One bridged device: its controller plus the characteristic adapters
/// its data shape supports.
pub struct Accessory {
    device: DeviceConfig,
    controller: Arc<AccessoryController>,
    adapters: HashMap<CharacteristicKind, Arc<CharacteristicAdapter>>,
}

impl Accessory {
    /// Build the adapter set from the descriptor table and seed the cache
    /// with the state bag discovery reported, so the first protocol read
    /// does not need a round trip.
    pub async fn new(device: DeviceConfig, transport: Arc<dyn DeviceTransport>) -> Self {
        let controller = Arc::new(AccessoryController::new(device.id.clone(), transport));

        let mut adapters = HashMap::new();
        for descriptor in descriptors_for(&device) {
            let adapter = Arc::new(CharacteristicAdapter::new(
                descriptor,
                device.clone(),
                Arc::clone(&controller),
            ));

            let push_adapter = Arc::clone(&adapter);
            let name = device.name.clone();
            controller.register_adapter(
                descriptor.kind.name(),
                Box::new(move |state| {
                    if let Some(value) = push_adapter.translate(state) {
                        debug!("[{name}] {} = {value:?}", push_adapter.kind().name());
                    }
                }),
            );

            adapters.insert(descriptor.kind, adapter);
        }

        controller.push_state(&device.data).await;

        Self {
            device,
            controller,
            adapters,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.device.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.device.name
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<CharacteristicKind> {
        self.adapters.keys().copied().collect()
    }

    #[must_use]
    pub fn adapter(&self, kind: CharacteristicKind) -> Option<&Arc<CharacteristicAdapter>> {
        self.adapters.get(&kind)
    }

    pub async fn read(&self, kind: CharacteristicKind) -> TuyaResult<CharacteristicValue> {
        self.adapter(kind)
            .ok_or_else(|| {
                TuyaError::UnsupportedOperation(format!("{} not supported", kind.name()))
            })?
            .get_remote()
            .await
    }

    pub async fn write(&self, kind: CharacteristicKind, value: CharacteristicValue) -> TuyaResult<()> {
        self.adapter(kind)
            .ok_or_else(|| {
                TuyaError::UnsupportedOperation(format!("{} not supported", kind.name()))
            })?
            .set_remote(value)
            .await
    }

    /// Fold one bulk-poll snapshot into the cache and notify adapters.
    /// An offline bag is not pushed: unreachable devices must surface as
    /// errors on the next read, not as a stale-but-fresh-looking cache.
    pub async fn handle_poll_update(&self, state: &DeviceState) {
        if !state.is_online() {
            warn!("[{}] reported offline by poll", self.device.name);
            return;
        }
        self.controller.push_state(state).await;
    }
}

/// The full accessory set plus the polling loop that keeps it current
/// with one bulk request per cycle.
pub struct Platform {
    transport: Arc<dyn DeviceTransport>,
    accessories: HashMap<String, Arc<Accessory>>,
    poll_interval: Duration,
}

impl Platform {
    pub async fn discover(
        config: &AppConfig,
        transport: Arc<dyn DeviceTransport>,
    ) -> TuyaResult<Self> {
        let mut devices = transport.fetch_all_devices().await?;

        let mut accessories = HashMap::new();
        for device in &mut devices {
            if config.is_hidden(&device.id) {
                debug!("[{}] hidden by config, skipping", device.name);
                continue;
            }
            config.apply_overrides(device);

            let supported = descriptors_for(device);
            if supported.is_empty() {
                warn!(
                    "[{}] unsupported device (type {:?}), skipping",
                    device.name, device.dev_type
                );
                continue;
            }

            let accessory = Accessory::new(device.clone(), Arc::clone(&transport)).await;
            info!(
                "[{}] registering {:?} accessory with {:?}",
                device.name,
                device.dev_type,
                accessory.kinds()
            );
            accessories.insert(device.id.clone(), Arc::new(accessory));
        }

        Ok(Self {
            transport,
            accessories,
            poll_interval: Duration::from_secs(u64::from(config.platform.poll_interval_secs.get())),
        })
    }

    #[must_use]
    pub fn accessory(&self, device_id: &str) -> Option<&Arc<Accessory>> {
        self.accessories.get(device_id)
    }

    #[must_use]
    pub fn accessories(&self) -> impl Iterator<Item = &Arc<Accessory>> {
        self.accessories.values()
    }

    /// Periodic bulk refresh. A slow upstream skips ticks instead of
    /// letting them pile up.
    pub async fn run(&self) -> TuyaResult<()> {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.poll_once().await;
        }
    }

    pub async fn poll_once(&self) {
        match self.transport.fetch_all_devices().await {
            Ok(devices) => {
                let updates = devices.iter().filter_map(|device| {
                    self.accessories
                        .get(&device.id)
                        .map(|accessory| accessory.handle_poll_update(&device.data))
                });
                future::join_all(updates).await;
            }
            Err(err) => warn!("device poll failed: {err}"),
        }
    }
}
