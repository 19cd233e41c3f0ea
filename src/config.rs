use std::collections::BTreeMap;
use std::num::NonZeroU32;

use camino::Utf8Path;
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

use tuya::{DeviceConfig, DeviceOverrides};

use crate::backend::tuya::Credentials;

/// Cloud account and polling settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlatformConfig {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub poll_interval_secs: NonZeroU32,
}

/// Per-device entry in the config file, keyed by device id. Everything
/// is optional; devices not listed here use discovery data as-is.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DeviceEntry {
    pub name: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(flatten)]
    pub overrides: DeviceOverrides,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AppConfig {
    pub platform: PlatformConfig,
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,
}

impl AppConfig {
    #[must_use]
    pub fn is_hidden(&self, device_id: &str) -> bool {
        self.devices.get(device_id).is_some_and(|entry| entry.hidden)
    }

    /// Apply the file entry for this device onto its discovery record.
    pub fn apply_overrides(&self, device: &mut DeviceConfig) {
        let Some(entry) = self.devices.get(&device.id) else {
            return;
        };
        if let Some(name) = &entry.name {
            device.name.clone_from(name);
        }
        device.overrides = entry.overrides.clone();
    }
}

pub fn parse(filename: &Utf8Path) -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .set_default("platform.country_code", "1")?
        .set_default("platform.poll_interval_secs", 60)?
        .add_source(config::File::with_name(filename.as_str()))
        .build()?;

    settings.try_deserialize()
}
