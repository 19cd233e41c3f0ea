use serde_json::json;
use tuya::{ApiMethod, DeviceConfig, DeviceState, DeviceType, TuyaResult};

use super::{CharacteristicValue, Properties, WriteCommand};

// Protocol heating/cooling codes.
const STATE_OFF: i64 = 0;
const STATE_HEAT: i64 = 1;
const STATE_COOL: i64 = 2;
const STATE_AUTO: i64 = 3;

const DEFAULT_MIN_TEMPERATURE: f64 = 0.0;
const DEFAULT_MAX_TEMPERATURE: f64 = 100.0;

// Protocol display-unit code for Celsius.
const UNITS_CELSIUS: i64 = 0;

/// Some thermostats report temperatures in tenths of a degree; the
/// per-device factor normalizes that.
fn current_factor(device: &DeviceConfig) -> f64 {
    device.overrides.current_temperature_factor.unwrap_or(1.0)
}

fn target_factor(device: &DeviceConfig) -> f64 {
    device.overrides.target_temperature_factor.unwrap_or(1.0)
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(super) fn supports_current_temperature(device: &DeviceConfig) -> bool {
    device.data.contains("current_temperature")
}

pub(super) fn decode_current_temperature(
    state: &DeviceState,
    device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let raw = state.number("current_temperature")?;
    Some(CharacteristicValue::Float(round_tenths(
        raw * current_factor(device),
    )))
}

pub(super) fn current_temperature_properties(_device: &DeviceConfig) -> Properties {
    Properties {
        min_value: Some(-270.0),
        max_value: Some(100.0),
        min_step: Some(0.1),
    }
}

pub(super) fn supports_target_temperature(device: &DeviceConfig) -> bool {
    device.dev_type == DeviceType::Climate && device.data.contains("temperature")
}

pub(super) fn decode_target_temperature(
    state: &DeviceState,
    device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let raw = state.number("temperature")?;
    Some(CharacteristicValue::Float(round_tenths(
        raw * target_factor(device),
    )))
}

pub(super) fn encode_target_temperature(
    value: CharacteristicValue,
    device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    // The wire carries device-native units; the cache fragment matches
    // what the device will report back.
    let native = value.as_f64() / target_factor(device);
    Ok(vec![WriteCommand {
        method: ApiMethod::TemperatureSet,
        payload: json!({ "value": native }),
        cache: DeviceState::new().with("temperature", json!(native)),
        combine: None,
    }])
}

pub(super) fn target_temperature_properties(device: &DeviceConfig) -> Properties {
    let factor = target_factor(device);
    let min = device
        .overrides
        .min_temperature
        .or_else(|| device.data.number("min_temper").map(|t| t * factor))
        .unwrap_or(DEFAULT_MIN_TEMPERATURE);
    let max = device
        .overrides
        .max_temperature
        .or_else(|| device.data.number("max_temper").map(|t| t * factor))
        .unwrap_or(DEFAULT_MAX_TEMPERATURE);
    Properties {
        min_value: Some(min),
        max_value: Some(max),
        min_step: Some(0.5),
    }
}

pub(super) fn supports_heating_cooling(device: &DeviceConfig) -> bool {
    device.dev_type == DeviceType::Climate
}

fn mode<'a>(state: &'a DeviceState, default: &'a str) -> &'a str {
    state
        .get("mode")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(default)
}

pub(super) fn decode_current_heating_cooling(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    if !state.boolean("state") {
        return Some(CharacteristicValue::Int(STATE_OFF));
    }
    // A thermostat that is on but not actively heating is treated as
    // cooling; the API reports no idle state.
    let current = match mode(state, "hot") {
        "hot" => STATE_HEAT,
        _ => STATE_COOL,
    };
    Some(CharacteristicValue::Int(current))
}

pub(super) fn decode_target_heating_cooling(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    if !state.boolean("state") {
        return Some(CharacteristicValue::Int(STATE_OFF));
    }
    let target = match mode(state, "auto") {
        "hot" => STATE_HEAT,
        "cold" => STATE_COOL,
        _ => STATE_AUTO,
    };
    Some(CharacteristicValue::Int(target))
}

/// Off is a plain power-off. Any active target powers the device on and,
/// when the device declares a `mode` field, selects the matching mode
/// with a second command.
pub(super) fn encode_target_heating_cooling(
    value: CharacteristicValue,
    device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    let target = value.as_f64().round() as i64;
    if target == STATE_OFF {
        return Ok(vec![WriteCommand {
            method: ApiMethod::TurnOnOff,
            payload: json!({ "value": 0 }),
            cache: DeviceState::new().with("state", json!(false)),
            combine: None,
        }]);
    }

    let mut commands = vec![WriteCommand {
        method: ApiMethod::TurnOnOff,
        payload: json!({ "value": 1 }),
        cache: DeviceState::new().with("state", json!(true)),
        combine: None,
    }];

    if device.data.contains("mode") {
        let mode = match target {
            STATE_HEAT => "hot",
            STATE_COOL => "cold",
            _ => "auto",
        };
        commands.push(WriteCommand {
            method: ApiMethod::ModeSet,
            payload: json!({ "value": mode }),
            cache: DeviceState::new().with("mode", json!(mode)),
            combine: None,
        });
    }
    Ok(commands)
}

/// The cloud API reports Celsius only.
pub(super) fn decode_display_units(
    _state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    Some(CharacteristicValue::Int(UNITS_CELSIUS))
}
