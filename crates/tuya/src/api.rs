use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::DeviceState;

/// Control methods accepted by the `/homeassistant/skill` endpoint.
///
/// Serialized names are the wire names the cloud API expects in the
/// request header.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ApiMethod {
    #[serde(rename = "turnOnOff")]
    TurnOnOff,
    #[serde(rename = "brightnessSet")]
    BrightnessSet,
    #[serde(rename = "windSpeedSet")]
    WindSpeedSet,
    #[serde(rename = "colorSet")]
    ColorSet,
    #[serde(rename = "colorTemperatureSet")]
    ColorTemperatureSet,
    #[serde(rename = "modeSet")]
    ModeSet,
    #[serde(rename = "temperatureSet")]
    TemperatureSet,
    #[serde(rename = "startStop")]
    StartStop,
}

impl ApiMethod {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TurnOnOff => "turnOnOff",
            Self::BrightnessSet => "brightnessSet",
            Self::WindSpeedSet => "windSpeedSet",
            Self::ColorSet => "colorSet",
            Self::ColorTemperatureSet => "colorTemperatureSet",
            Self::ModeSet => "modeSet",
            Self::TemperatureSet => "temperatureSet",
            Self::StartStop => "startStop",
        }
    }
}

/// Device category as reported by discovery.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Light,
    Fan,
    Dimmer,
    Switch,
    Outlet,
    Cover,
    Garage,
    Climate,
    Scene,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Per-device tuning from the bridge configuration file.
///
/// Devices frequently misreport their native ranges; these overrides let
/// the user pin them. All fields are optional and fall back to the
/// characteristic defaults.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DeviceOverrides {
    pub min_brightness: Option<f64>,
    pub max_brightness: Option<f64>,
    pub min_kelvin: Option<f64>,
    pub max_kelvin: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub current_temperature_factor: Option<f64>,
    pub target_temperature_factor: Option<f64>,
}

/// One device as returned by discovery: identity, category and the state
/// bag it reported at discovery time. The `data` shape doubles as the
/// capability declaration characteristics probe with their `supports`
/// predicates.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub dev_type: DeviceType,
    #[serde(default)]
    pub data: DeviceState,
    #[serde(default, skip_serializing_if = "is_default_overrides")]
    pub overrides: DeviceOverrides,
}

fn is_default_overrides(overrides: &DeviceOverrides) -> bool {
    *overrides == DeviceOverrides::default()
}

/// Response header codes the API is known to emit.
pub const CODE_SUCCESS: &str = "SUCCESS";
pub const CODE_RATE_LIMIT: &str = "FrequentlyInvoke";

#[derive(Clone, Debug, Deserialize)]
pub struct ResponseHeader {
    pub code: String,
    #[serde(default)]
    pub msg: Option<String>,
}

impl ResponseHeader {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }

    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        self.code == CODE_RATE_LIMIT
    }
}

/// Envelope of every `/homeassistant/skill` response.
#[derive(Clone, Debug, Deserialize)]
pub struct SkillResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryPayload {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Body of `/homeassistant/auth.do` and the token refresh endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default, rename = "responseStatus")]
    pub response_status: Option<String>,
    #[serde(default, rename = "errorMsg")]
    pub error_msg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_wire_names() {
        assert_eq!(
            serde_json::to_value(ApiMethod::TurnOnOff).ok(),
            Some(json!("turnOnOff"))
        );
        assert_eq!(ApiMethod::ColorTemperatureSet.name(), "colorTemperatureSet");
    }

    #[test]
    fn discovery_payload_parses() {
        let raw = json!({
            "header": { "code": "SUCCESS", "payloadVersion": 1 },
            "payload": {
                "devices": [
                    {
                        "id": "abc123",
                        "name": "Desk lamp",
                        "dev_type": "light",
                        "ha_type": "light",
                        "data": { "online": true, "state": "true", "brightness": 90 }
                    }
                ]
            }
        });

        let response: SkillResponse = serde_json::from_value(raw).unwrap();
        assert!(response.header.is_success());

        let payload: DiscoveryPayload =
            serde_json::from_value(response.payload.unwrap()).unwrap();
        assert_eq!(payload.devices.len(), 1);

        let device = &payload.devices[0];
        assert_eq!(device.id, "abc123");
        assert_eq!(device.dev_type, DeviceType::Light);
        assert!(device.data.is_online());
        assert_eq!(device.data.number("brightness"), Some(90.0));
    }

    #[test]
    fn rate_limit_header_detected() {
        let header: ResponseHeader =
            serde_json::from_value(json!({ "code": "FrequentlyInvoke" })).unwrap();
        assert!(header.is_rate_limit());
        assert!(!header.is_success());
    }

    #[test]
    fn unknown_device_type_is_tolerated() {
        let device: DeviceConfig = serde_json::from_value(json!({
            "id": "x",
            "name": "mystery",
            "dev_type": "toaster",
            "data": {}
        }))
        .unwrap();
        assert_eq!(device.dev_type, DeviceType::Unknown);
    }
}
