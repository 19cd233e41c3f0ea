use log::warn;
use serde_json::{json, Map, Value};
use tuya::{ApiMethod, DeviceConfig, DeviceState, TuyaResult};

use super::{CharacteristicValue, Properties, WriteCommand};
use crate::engine::RangeMap;

const DEFAULT_SATURATION: f64 = 0.0;
const DEFAULT_HUE: f64 = 0.0;
const DEFAULT_COLOR_BRIGHTNESS: f64 = 100.0;

// Kelvin bounds chosen so the default mired range is the usual 140..500.
const MIN_KELVIN: f64 = 1_000_000.0 / 500.0;
const MAX_KELVIN: f64 = 1_000_000.0 / 140.0;

/// Lamps in color mode report brightness inside the `color` sub-object on
/// a 1..255 scale; everything else uses the flat `brightness` key on
/// 10..100. The declared data shape decides which scale applies.
fn uses_color_brightness(device: &DeviceConfig) -> bool {
    device.data.contains("color_mode") && device.data.color_field("brightness").is_some()
}

fn brightness_range(device: &DeviceConfig) -> RangeMap {
    let (default_min, default_max) = if uses_color_brightness(device) {
        (1.0, 255.0)
    } else {
        (10.0, 100.0)
    };
    let min = device.overrides.min_brightness.unwrap_or(default_min);
    let max = device.overrides.max_brightness.unwrap_or(default_max);
    RangeMap::new((min, max), (0.0, 100.0))
}

pub(super) fn supports_brightness(device: &DeviceConfig) -> bool {
    device.data.contains("brightness") || device.data.color_field("brightness").is_some()
}

pub(super) fn decode_brightness(
    state: &DeviceState,
    device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let native = if uses_color_brightness(device) {
        state.color_field("brightness")
    } else {
        state.number("brightness")
    }?;

    let percent = brightness_range(device).to_target(native);
    if !(0.0..=100.0).contains(&percent) {
        warn!(
            "device {}: brightness {native} maps outside 0..100 ({percent}), check overrides",
            device.id
        );
    }
    Some(CharacteristicValue::Float(percent.clamp(0.0, 100.0)))
}

pub(super) fn encode_brightness(
    value: CharacteristicValue,
    device: &DeviceConfig,
    cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    let native = brightness_range(device).to_source(value.as_f64()).round();

    let cache = if uses_color_brightness(device) {
        let mut color = json!({ "brightness": native.to_string() });
        if let Some(cached) = cached {
            if let Some(hue) = cached.color_field("hue") {
                color["hue"] = json!(hue.to_string());
            }
            if let Some(saturation) = cached.color_field("saturation") {
                color["saturation"] = json!(saturation.to_string());
            }
        }
        DeviceState::new().with("color", color)
    } else {
        DeviceState::new().with("brightness", json!(native))
    };

    Ok(vec![WriteCommand {
        method: ApiMethod::BrightnessSet,
        payload: json!({ "value": native }),
        cache,
        combine: None,
    }])
}

pub(super) fn brightness_properties(_device: &DeviceConfig) -> Properties {
    Properties {
        min_value: Some(0.0),
        max_value: Some(100.0),
        min_step: Some(1.0),
    }
}

pub(super) fn supports_color(device: &DeviceConfig) -> bool {
    device.data.contains("color_mode")
}

// Hue and saturation fall back to a neutral default when the lamp is in
// white mode; the protocol side always expects a value.
pub(super) fn decode_hue(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let hue = if state.in_color_mode() {
        state.color_field("hue").unwrap_or(DEFAULT_HUE)
    } else {
        DEFAULT_HUE
    };
    Some(CharacteristicValue::Int(hue.round() as i64))
}

pub(super) fn decode_saturation(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let saturation = if state.in_color_mode() {
        state.color_field("saturation").unwrap_or(DEFAULT_SATURATION)
    } else {
        DEFAULT_SATURATION
    };
    Some(CharacteristicValue::Int(saturation.round() as i64))
}

// Hue and saturation writes carry only their own component; the
// controller's combined-write window merges a near-simultaneous pair so
// the upstream sees one complete color instead of two half-stale ones.
pub(super) fn encode_hue(
    value: CharacteristicValue,
    _device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    Ok(vec![color_fragment("hue", value.as_f64())])
}

pub(super) fn encode_saturation(
    value: CharacteristicValue,
    _device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    Ok(vec![color_fragment("saturation", value.as_f64())])
}

fn color_fragment(component: &str, value: f64) -> WriteCommand {
    let mut fragment = Map::new();
    fragment.insert(component.to_string(), json!(value));
    WriteCommand {
        method: ApiMethod::ColorSet,
        payload: Value::Object(fragment),
        cache: DeviceState::new(),
        combine: Some(combine_color),
    }
}

/// The API only takes a complete color triple, so the components no
/// fragment supplied come from the cached snapshot. Wire saturation is
/// 0..1; the cache fragment keeps the string encoding the device reports.
pub(super) fn combine_color(
    fragments: &Map<String, Value>,
    cached: Option<&DeviceState>,
) -> (Value, DeviceState) {
    let component = |field: &str, default: f64| {
        fragments
            .get(field)
            .and_then(Value::as_f64)
            .or_else(|| cached.and_then(|c| c.color_field(field)))
            .unwrap_or(default)
    };
    let hue = component("hue", DEFAULT_HUE);
    let saturation = component("saturation", DEFAULT_SATURATION);
    let brightness = cached
        .and_then(|c| c.color_field("brightness").or_else(|| c.number("brightness")))
        .unwrap_or(DEFAULT_COLOR_BRIGHTNESS);

    let payload = json!({
        "color": {
            "hue": hue,
            "saturation": saturation / 100.0,
            "brightness": brightness,
        }
    });
    let cache = DeviceState::new()
        .with(
            "color",
            json!({
                "hue": hue.to_string(),
                "saturation": saturation.to_string(),
                "brightness": brightness.to_string(),
            }),
        )
        .with("color_mode", json!("color"));
    (payload, cache)
}

fn kelvin_bounds(device: &DeviceConfig) -> (f64, f64) {
    (
        device.overrides.min_kelvin.unwrap_or(MIN_KELVIN),
        device.overrides.max_kelvin.unwrap_or(MAX_KELVIN),
    )
}

/// Kelvin to mired is an inverting map: the warmest kelvin is the largest
/// mired value.
fn color_temperature_range(device: &DeviceConfig) -> RangeMap {
    let (min_kelvin, max_kelvin) = kelvin_bounds(device);
    let min_mired = (1_000_000.0 / max_kelvin).round();
    let max_mired = (1_000_000.0 / min_kelvin).round();
    RangeMap::new((max_kelvin, min_kelvin), (min_mired, max_mired))
}

pub(super) fn supports_color_temperature(device: &DeviceConfig) -> bool {
    device.data.contains("color_temp")
}

pub(super) fn decode_color_temperature(
    state: &DeviceState,
    device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let kelvin = state.number("color_temp")?;
    let mired = color_temperature_range(device).to_target(kelvin).round();
    Some(CharacteristicValue::Int(mired as i64))
}

pub(super) fn encode_color_temperature(
    value: CharacteristicValue,
    device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    let kelvin = color_temperature_range(device)
        .to_source(value.as_f64())
        .round();
    Ok(vec![WriteCommand {
        method: ApiMethod::ColorTemperatureSet,
        payload: json!({ "value": kelvin }),
        cache: DeviceState::new()
            .with("color_temp", json!(kelvin))
            .with("color_mode", json!("white")),
        combine: None,
    }])
}

pub(super) fn color_temperature_properties(device: &DeviceConfig) -> Properties {
    let range = color_temperature_range(device);
    Properties {
        min_value: Some(range.to_target(range.source_start())),
        max_value: Some(range.to_target(range.source_end())),
        min_step: Some(1.0),
    }
}
