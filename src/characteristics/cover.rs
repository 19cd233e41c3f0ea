use serde_json::{json, Value};
use tuya::{ApiMethod, CoverState, DeviceConfig, DeviceState, DeviceType, TuyaResult};

use super::{CharacteristicValue, Properties, WriteCommand};

const POSITION_OPEN: i64 = 100;
const POSITION_HALF: i64 = 50;
const POSITION_CLOSED: i64 = 0;

// Protocol position-state code for "not moving".
const POSITION_STATE_STOPPED: i64 = 2;

// Protocol door-state codes.
const DOOR_OPEN: i64 = 0;
const DOOR_CLOSED: i64 = 1;
const DOOR_OPENING: i64 = 2;
const DOOR_CLOSING: i64 = 3;
const DOOR_STOPPED: i64 = 4;

pub(super) fn supports_cover(device: &DeviceConfig) -> bool {
    device.dev_type == DeviceType::Cover
}

pub(super) fn supports_garage(device: &DeviceConfig) -> bool {
    device.dev_type == DeviceType::Garage
}

/// Some firmwares report movement codes in `state`, others a bare boolean
/// (fully open / fully closed). Anything else is unusable.
enum RawCoverState {
    Moving(Option<CoverState>),
    Boolean(bool),
}

fn raw_state(state: &DeviceState) -> Option<RawCoverState> {
    match state.get("state")? {
        Value::Bool(b) => Some(RawCoverState::Boolean(*b)),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(RawCoverState::Boolean(true)),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(RawCoverState::Boolean(false)),
        _ => state
            .number("state")
            .map(|n| RawCoverState::Moving(CoverState::from_number(n))),
    }
}

fn target_state(state: &DeviceState) -> Option<CoverState> {
    state
        .number("target_cover_state")
        .and_then(CoverState::from_number)
}

pub(super) fn decode_current_position(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let position = match raw_state(state)? {
        RawCoverState::Boolean(open) => {
            if open {
                POSITION_OPEN
            } else {
                POSITION_CLOSED
            }
        }
        // Mid-movement the true position is unknowable; report the middle
        // and let the target drive the direction.
        RawCoverState::Moving(Some(CoverState::Opening | CoverState::Closing)) => POSITION_HALF,
        RawCoverState::Moving(_) => match target_state(state) {
            Some(CoverState::Opening) => POSITION_OPEN,
            Some(CoverState::Stopped) => POSITION_HALF,
            _ => POSITION_CLOSED,
        },
    };
    Some(CharacteristicValue::Int(position))
}

pub(super) fn decode_target_position(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let position = match raw_state(state)? {
        RawCoverState::Boolean(open) => {
            if open {
                POSITION_OPEN
            } else {
                POSITION_CLOSED
            }
        }
        RawCoverState::Moving(Some(CoverState::Opening)) => POSITION_OPEN,
        RawCoverState::Moving(Some(CoverState::Closing)) => POSITION_CLOSED,
        RawCoverState::Moving(_) => match target_state(state) {
            Some(CoverState::Opening) => POSITION_OPEN,
            Some(CoverState::Stopped) => POSITION_HALF,
            _ => POSITION_CLOSED,
        },
    };
    Some(CharacteristicValue::Int(position))
}

/// Covers are binary upstream: anything above fully closed opens them.
pub(super) fn encode_target_position(
    value: CharacteristicValue,
    _device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    let open = value.as_f64() > 0.0;
    let movement = if open {
        CoverState::Opening
    } else {
        CoverState::Closing
    };

    Ok(vec![WriteCommand {
        method: ApiMethod::TurnOnOff,
        payload: json!({ "value": i32::from(open) }),
        cache: DeviceState::new()
            .with("state", json!(movement as u8))
            .with("target_cover_state", json!(movement as u8)),
        combine: None,
    }])
}

/// Movement never surfaces on this characteristic; the cloud API gives no
/// timely transition events, so covers always read as stopped.
pub(super) fn decode_position_state(
    _state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    Some(CharacteristicValue::Int(POSITION_STATE_STOPPED))
}

pub(super) fn position_properties(_device: &DeviceConfig) -> Properties {
    Properties {
        min_value: Some(0.0),
        max_value: Some(100.0),
        min_step: Some(100.0),
    }
}

/// Covers that declare `support_stop` can halt mid-travel.
pub(super) fn supports_hold_position(device: &DeviceConfig) -> bool {
    device.dev_type == DeviceType::Cover && device.data.boolean("support_stop")
}

// HoldPosition is a write-only trigger; it always reads back inactive.
pub(super) fn decode_hold_position(
    _state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    Some(CharacteristicValue::Bool(false))
}

pub(super) fn encode_hold_position(
    _value: CharacteristicValue,
    _device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    Ok(vec![WriteCommand {
        method: ApiMethod::StartStop,
        payload: json!({ "value": 0 }),
        cache: DeviceState::new()
            .with("state", json!(CoverState::Stopped as u8))
            .with("target_cover_state", json!(CoverState::Stopped as u8)),
        combine: None,
    }])
}

pub(super) fn decode_current_door_state(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let door = match raw_state(state)? {
        RawCoverState::Boolean(open) => {
            if open {
                DOOR_OPEN
            } else {
                DOOR_CLOSED
            }
        }
        RawCoverState::Moving(Some(CoverState::Opening)) => DOOR_OPENING,
        RawCoverState::Moving(Some(CoverState::Closing)) => DOOR_CLOSING,
        // Not moving: the last target tells where the door came to rest.
        RawCoverState::Moving(_) => match target_state(state) {
            Some(CoverState::Opening) => DOOR_OPEN,
            Some(CoverState::Stopped) => DOOR_CLOSED,
            _ => DOOR_STOPPED,
        },
    };
    Some(CharacteristicValue::Int(door))
}

pub(super) fn decode_target_door_state(
    state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    let door = match raw_state(state)? {
        RawCoverState::Boolean(open) => {
            if open {
                DOOR_OPEN
            } else {
                DOOR_CLOSED
            }
        }
        RawCoverState::Moving(Some(CoverState::Opening)) => DOOR_OPEN,
        RawCoverState::Moving(Some(CoverState::Closing)) => DOOR_CLOSED,
        RawCoverState::Moving(_) => match target_state(state) {
            Some(CoverState::Closing) => DOOR_CLOSED,
            _ => DOOR_OPEN,
        },
    };
    Some(CharacteristicValue::Int(door))
}

/// Doors share the cover wire protocol: on/off is open/close.
pub(super) fn encode_target_door_state(
    value: CharacteristicValue,
    _device: &DeviceConfig,
    _cached: Option<&DeviceState>,
) -> TuyaResult<Vec<WriteCommand>> {
    let close = value.as_f64().round() as i64 == DOOR_CLOSED;
    let movement = if close {
        CoverState::Closing
    } else {
        CoverState::Opening
    };

    Ok(vec![WriteCommand {
        method: ApiMethod::TurnOnOff,
        payload: json!({ "value": i32::from(!close) }),
        cache: DeviceState::new()
            .with("state", json!(movement as u8))
            .with("target_cover_state", json!(movement as u8)),
        combine: None,
    }])
}

/// The cloud API exposes no obstruction sensor.
pub(super) fn decode_obstruction(
    _state: &DeviceState,
    _device: &DeviceConfig,
) -> Option<CharacteristicValue> {
    Some(CharacteristicValue::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::device;
    use super::*;
    use serde_json::json;

    fn cover() -> DeviceConfig {
        device(DeviceType::Cover, &[("state", json!(1))])
    }

    #[test]
    fn moving_cover_reports_half_position() {
        let dev = cover();
        for code in [1, 2] {
            let state = DeviceState::new().with("state", json!(code));
            assert_eq!(
                decode_current_position(&state, &dev),
                Some(CharacteristicValue::Int(50))
            );
        }
    }

    #[test]
    fn stopped_cover_position_follows_the_last_target() {
        let dev = cover();

        let opened = DeviceState::new()
            .with("state", json!(3))
            .with("target_cover_state", json!(1));
        assert_eq!(
            decode_current_position(&opened, &dev),
            Some(CharacteristicValue::Int(100))
        );

        let closed = DeviceState::new()
            .with("state", json!(3))
            .with("target_cover_state", json!(2));
        assert_eq!(
            decode_current_position(&closed, &dev),
            Some(CharacteristicValue::Int(0))
        );
    }

    #[test]
    fn boolean_firmware_reports_endpoints_only() {
        let dev = cover();
        let open = DeviceState::new().with("state", json!(true));
        let closed = DeviceState::new().with("state", json!("false"));

        assert_eq!(
            decode_current_position(&open, &dev),
            Some(CharacteristicValue::Int(100))
        );
        assert_eq!(
            decode_target_position(&closed, &dev),
            Some(CharacteristicValue::Int(0))
        );
    }

    #[test]
    fn target_position_reflects_movement_direction() {
        let dev = cover();
        let opening = DeviceState::new().with("state", json!(1));
        let closing = DeviceState::new().with("state", json!(2));

        assert_eq!(
            decode_target_position(&opening, &dev),
            Some(CharacteristicValue::Int(100))
        );
        assert_eq!(
            decode_target_position(&closing, &dev),
            Some(CharacteristicValue::Int(0))
        );
    }

    #[test]
    fn any_nonzero_target_opens_the_cover() {
        let dev = cover();

        let commands =
            encode_target_position(CharacteristicValue::Int(40), &dev, None).unwrap();
        assert_eq!(commands[0].payload, json!({ "value": 1 }));
        assert_eq!(commands[0].cache.number("state"), Some(1.0));
        assert_eq!(commands[0].cache.number("target_cover_state"), Some(1.0));

        let commands =
            encode_target_position(CharacteristicValue::Int(0), &dev, None).unwrap();
        assert_eq!(commands[0].payload, json!({ "value": 0 }));
        assert_eq!(commands[0].cache.number("state"), Some(2.0));
    }

    #[test]
    fn position_state_is_always_stopped() {
        let dev = cover();
        assert_eq!(
            decode_position_state(&DeviceState::new(), &dev),
            Some(CharacteristicValue::Int(2))
        );
    }

    #[test]
    fn unusable_state_yields_no_position() {
        let dev = cover();
        let state = DeviceState::new().with("state", json!({ "weird": 1 }));
        assert_eq!(decode_current_position(&state, &dev), None);
        assert_eq!(decode_target_position(&state, &dev), None);
    }

    fn garage() -> DeviceConfig {
        device(DeviceType::Garage, &[("state", json!(1))])
    }

    #[test]
    fn moving_door_reports_its_direction() {
        let dev = garage();

        let opening = DeviceState::new().with("state", json!(1));
        assert_eq!(
            decode_current_door_state(&opening, &dev),
            Some(CharacteristicValue::Int(2))
        );
        assert_eq!(
            decode_target_door_state(&opening, &dev),
            Some(CharacteristicValue::Int(0))
        );

        let closing = DeviceState::new().with("state", json!(2));
        assert_eq!(
            decode_current_door_state(&closing, &dev),
            Some(CharacteristicValue::Int(3))
        );
        assert_eq!(
            decode_target_door_state(&closing, &dev),
            Some(CharacteristicValue::Int(1))
        );
    }

    #[test]
    fn resting_door_state_follows_the_last_target() {
        let dev = garage();

        let opened = DeviceState::new()
            .with("state", json!(3))
            .with("target_cover_state", json!(1));
        assert_eq!(
            decode_current_door_state(&opened, &dev),
            Some(CharacteristicValue::Int(0))
        );

        let halted = DeviceState::new()
            .with("state", json!(3))
            .with("target_cover_state", json!(3));
        assert_eq!(
            decode_current_door_state(&halted, &dev),
            Some(CharacteristicValue::Int(1))
        );

        let unknown = DeviceState::new().with("state", json!(3));
        assert_eq!(
            decode_current_door_state(&unknown, &dev),
            Some(CharacteristicValue::Int(4))
        );
        assert_eq!(
            decode_target_door_state(&unknown, &dev),
            Some(CharacteristicValue::Int(0))
        );
    }

    #[test]
    fn boolean_firmware_door_reports_endpoints() {
        let dev = garage();
        let open = DeviceState::new().with("state", json!("true"));
        let closed = DeviceState::new().with("state", json!(false));

        assert_eq!(
            decode_current_door_state(&open, &dev),
            Some(CharacteristicValue::Int(0))
        );
        assert_eq!(
            decode_target_door_state(&closed, &dev),
            Some(CharacteristicValue::Int(1))
        );
    }

    #[test]
    fn door_target_writes_map_to_cover_movement() {
        let dev = garage();

        let commands =
            encode_target_door_state(CharacteristicValue::Int(1), &dev, None).unwrap();
        assert_eq!(commands[0].method, ApiMethod::TurnOnOff);
        assert_eq!(commands[0].payload, json!({ "value": 0 }));
        assert_eq!(commands[0].cache.number("state"), Some(2.0));
        assert_eq!(commands[0].cache.number("target_cover_state"), Some(2.0));

        let commands =
            encode_target_door_state(CharacteristicValue::Int(0), &dev, None).unwrap();
        assert_eq!(commands[0].payload, json!({ "value": 1 }));
        assert_eq!(commands[0].cache.number("state"), Some(1.0));
    }

    #[test]
    fn obstruction_is_never_detected() {
        let dev = garage();
        assert_eq!(
            decode_obstruction(&DeviceState::new(), &dev),
            Some(CharacteristicValue::Bool(false))
        );
    }

    #[test]
    fn hold_position_requires_stop_support() {
        let plain = cover();
        assert!(!supports_hold_position(&plain));

        let stoppable = device(
            DeviceType::Cover,
            &[("state", json!(1)), ("support_stop", json!("true"))],
        );
        assert!(supports_hold_position(&stoppable));

        // Garage doors never advertise hold position.
        let dev = device(DeviceType::Garage, &[("support_stop", json!(true))]);
        assert!(!supports_hold_position(&dev));
    }

    #[test]
    fn hold_position_issues_a_stop_command() {
        let dev = device(
            DeviceType::Cover,
            &[("state", json!(1)), ("support_stop", json!(true))],
        );

        let commands =
            encode_hold_position(CharacteristicValue::Bool(true), &dev, None).unwrap();
        assert_eq!(commands[0].method, ApiMethod::StartStop);
        assert_eq!(commands[0].payload, json!({ "value": 0 }));
        assert_eq!(commands[0].cache.number("state"), Some(3.0));
        assert_eq!(commands[0].cache.number("target_cover_state"), Some(3.0));

        assert_eq!(
            decode_hold_position(&DeviceState::new(), &dev),
            Some(CharacteristicValue::Bool(false))
        );
    }
}
