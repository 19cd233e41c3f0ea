use serde_json::json;
use tuya::{ApiMethod, DeviceConfig, DeviceState, DeviceType, TuyaResult};

use super::{CharacteristicValue, Properties, WriteCommand};
use crate::engine::RangeMap;

/// Discrete speed levels the fan declares, floored and clamped to at
/// least one. Firmwares have been seen reporting 0 here.
fn max_speed_level(device: &DeviceConfig) -> f64 {
    device
        .data
        .number("speed_level")
        .map(f64::floor)
        .filter(|level| *level >= 1.0)
        .unwrap_or(1.0)
}

fn min_step(device: &DeviceConfig) -> f64 {
    (100.0 / max_speed_level(device)).floor()
}

/// Levels 1..N map onto percent steps `min_step..N * min_step`. A single
/// declared level would make both sides zero-width, so that case maps the
/// lone level onto the full percent scale instead.
fn speed_range(device: &DeviceConfig) -> RangeMap {
    let levels = max_speed_level(device);
    if levels <= 1.0 {
        return RangeMap::new((0.0, 1.0), (0.0, 100.0));
    }
    let step = min_step(device);
    RangeMap::new((1.0, levels), (step, levels * step))
}

pub(super) fn supports_rotation_speed(device: &DeviceConfig) -> bool {
    device.dev_type == DeviceType::Fan
        && (device.data.contains("speed") || device.data.contains("speed_level"))
}

pub(super) fn decode_rotation_speed(
    state: &DeviceState,
    device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let level = state.number("speed")?;
    Some(CharacteristicValue::Float(
        speed_range(device).to_target(level),
    ))
}

pub(super) fn encode_rotation_speed(
    value: CharacteristicValue,
    device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    let levels = max_speed_level(device);
    // Round first, then clamp, so a percent just under a step boundary
    // still lands on the nearer level.
    let level = speed_range(device)
        .to_source(value.as_f64())
        .round()
        .clamp(1.0, levels);

    Ok(vec![WriteCommand {
        method: ApiMethod::WindSpeedSet,
        payload: json!({ "value": level }),
        cache: DeviceState::new().with("speed", json!(level)),
        combine: None,
    }])
}

pub(super) fn rotation_speed_properties(device: &DeviceConfig) -> Properties {
    Properties {
        min_value: Some(0.0),
        max_value: Some(100.0),
        min_step: Some(min_step(device)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::device;
    use super::*;
    use serde_json::json;

    fn fan(speed_level: serde_json::Value) -> DeviceConfig {
        device(
            DeviceType::Fan,
            &[
                ("state", json!(true)),
                ("speed", json!(1)),
                ("speed_level", speed_level),
            ],
        )
    }

    #[test]
    fn four_level_fan_advertises_quarter_steps() {
        let dev = fan(json!(4));
        assert_eq!(rotation_speed_properties(&dev).min_step, Some(25.0));
    }

    #[test]
    fn percent_rounds_to_the_nearest_level() {
        let dev = fan(json!(4));
        let commands =
            encode_rotation_speed(CharacteristicValue::Float(60.0), &dev, None).unwrap();
        assert_eq!(commands[0].method, ApiMethod::WindSpeedSet);
        assert_eq!(commands[0].payload, json!({ "value": 2.0 }));
    }

    #[test]
    fn device_level_maps_back_to_percent() {
        let dev = fan(json!(4));
        let state = DeviceState::new().with("speed", json!(2));
        assert_eq!(
            decode_rotation_speed(&state, &dev),
            Some(CharacteristicValue::Float(50.0))
        );
    }

    #[test]
    fn out_of_range_percent_clamps_to_a_valid_level() {
        let dev = fan(json!(4));
        let low = encode_rotation_speed(CharacteristicValue::Float(1.0), &dev, None).unwrap();
        assert_eq!(low[0].payload, json!({ "value": 1.0 }));

        let high = encode_rotation_speed(CharacteristicValue::Float(100.0), &dev, None).unwrap();
        assert_eq!(high[0].payload, json!({ "value": 4.0 }));
    }

    #[test]
    fn single_level_fan_does_not_collapse_to_a_zero_width_range() {
        let dev = fan(json!(1));
        assert_eq!(rotation_speed_properties(&dev).min_step, Some(100.0));

        let state = DeviceState::new().with("speed", json!(1));
        assert_eq!(
            decode_rotation_speed(&state, &dev),
            Some(CharacteristicValue::Float(100.0))
        );

        let commands =
            encode_rotation_speed(CharacteristicValue::Float(100.0), &dev, None).unwrap();
        assert_eq!(commands[0].payload, json!({ "value": 1.0 }));
    }

    #[test]
    fn missing_speed_level_falls_back_to_one() {
        let dev = device(DeviceType::Fan, &[("speed", json!(1))]);
        assert_eq!(max_speed_level(&dev), 1.0);
        assert_eq!(rotation_speed_properties(&dev).min_step, Some(100.0));
    }
}
