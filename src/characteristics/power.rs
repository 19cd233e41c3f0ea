use serde_json::json;
use tuya::{ApiMethod, DeviceConfig, DeviceState, DeviceType, TuyaResult};

use super::{CharacteristicValue, WriteCommand};

pub(super) fn supports_on(device: &DeviceConfig) -> bool {
    device.data.contains("state")
        && matches!(
            device.dev_type,
            DeviceType::Light
                | DeviceType::Dimmer
                | DeviceType::Switch
                | DeviceType::Outlet
                | DeviceType::Unknown
        )
}

pub(super) fn decode_on(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    state.get("state")?;
    Some(CharacteristicValue::Bool(state.boolean("state")))
}

pub(super) fn encode_on(
    value: CharacteristicValue,
    _device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    let on = value.as_bool();
    Ok(vec![WriteCommand {
        method: ApiMethod::TurnOnOff,
        payload: json!({ "value": i32::from(on) }),
        cache: DeviceState::new().with("state", json!(on)),
        combine: None,
    }])
}

pub(super) fn supports_active(device: &DeviceConfig) -> bool {
    device.dev_type == DeviceType::Fan && device.data.contains("state")
}

// Fans report Active as 0/1 rather than a boolean.
pub(super) fn decode_active(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    state.get("state")?;
    Some(CharacteristicValue::Int(i64::from(state.boolean("state"))))
}

pub(super) fn encode_active(
    value: CharacteristicValue,
    device: &DeviceConfig,
    cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    encode_on(value, device, cached)
}

pub(super) fn supports_momentary(device: &DeviceConfig) -> bool {
    device.dev_type == DeviceType::Scene
}

/// A scene is a stateless trigger; it always reads back "off".
pub(super) fn decode_momentary(
    _state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    Some(CharacteristicValue::Bool(false))
}

pub(super) fn encode_momentary(
    value: CharacteristicValue,
    _device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    if !value.as_bool() {
        return Ok(Vec::new());
    }
    Ok(vec![WriteCommand {
        method: ApiMethod::TurnOnOff,
        payload: json!({ "value": 1 }),
        cache: DeviceState::new(),
        combine: None,
    }])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::device;
    use super::*;
    use serde_json::json;

    #[test]
    fn on_decodes_loose_booleans() {
        let dev = device(DeviceType::Switch, &[("state", json!("true"))]);
        let on = DeviceState::new().with("state", json!("True"));
        let off = DeviceState::new().with("state", json!(false));

        assert_eq!(
            decode_on(&on, &dev),
            Some(CharacteristicValue::Bool(true))
        );
        assert_eq!(
            decode_on(&off, &dev),
            Some(CharacteristicValue::Bool(false))
        );
        assert_eq!(decode_on(&DeviceState::new(), &dev), None);
    }

    #[test]
    fn on_encodes_numeric_wire_value() {
        let dev = device(DeviceType::Switch, &[("state", json!(true))]);
        let commands = encode_on(CharacteristicValue::Bool(true), &dev, None).unwrap();

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].method, ApiMethod::TurnOnOff);
        assert_eq!(commands[0].payload, json!({ "value": 1 }));
        assert!(commands[0].cache.boolean("state"));
    }

    #[test]
    fn active_decodes_as_integer() {
        let dev = device(DeviceType::Fan, &[("state", json!(true))]);
        let state = DeviceState::new().with("state", json!("true"));
        assert_eq!(
            decode_active(&state, &dev),
            Some(CharacteristicValue::Int(1))
        );
    }

    #[test]
    fn momentary_off_issues_no_command() {
        let dev = device(DeviceType::Scene, &[]);
        let commands = encode_momentary(CharacteristicValue::Bool(false), &dev, None).unwrap();
        assert!(commands.is_empty());

        let commands = encode_momentary(CharacteristicValue::Bool(true), &dev, None).unwrap();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].cache.0.is_empty());
    }
}
