mod climate;
mod cover;
mod fan;
mod light;
mod power;

use std::sync::Arc;

use serde_json::Value;
use tuya::{ApiMethod, DeviceConfig, DeviceState, TuyaError, TuyaResult};

use crate::engine::{AccessoryController, CombineFn};

/// Identity of one characteristic within an accessory.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CharacteristicKind {
    On,
    Active,
    MomentaryOn,
    Brightness,
    Hue,
    Saturation,
    ColorTemperature,
    RotationSpeed,
    CurrentPosition,
    TargetPosition,
    PositionState,
    HoldPosition,
    CurrentDoorState,
    TargetDoorState,
    ObstructionDetected,
    CurrentTemperature,
    TargetTemperature,
    CurrentHeatingCoolingState,
    TargetHeatingCoolingState,
    TemperatureDisplayUnits,
}

impl CharacteristicKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::Active => "Active",
            Self::MomentaryOn => "MomentaryOn",
            Self::Brightness => "Brightness",
            Self::Hue => "Hue",
            Self::Saturation => "Saturation",
            Self::ColorTemperature => "ColorTemperature",
            Self::RotationSpeed => "RotationSpeed",
            Self::CurrentPosition => "CurrentPosition",
            Self::TargetPosition => "TargetPosition",
            Self::PositionState => "PositionState",
            Self::HoldPosition => "HoldPosition",
            Self::CurrentDoorState => "CurrentDoorState",
            Self::TargetDoorState => "TargetDoorState",
            Self::ObstructionDetected => "ObstructionDetected",
            Self::CurrentTemperature => "CurrentTemperature",
            Self::TargetTemperature => "TargetTemperature",
            Self::CurrentHeatingCoolingState => "CurrentHeatingCoolingState",
            Self::TargetHeatingCoolingState => "TargetHeatingCoolingState",
            Self::TemperatureDisplayUnits => "TemperatureDisplayUnits",
        }
    }
}

/// A protocol-native characteristic value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CharacteristicValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl CharacteristicValue {
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(b) => f64::from(u8::from(b)),
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    #[must_use]
    pub fn as_bool(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
            Self::Float(f) => f != 0.0,
        }
    }
}

/// Protocol-level property constraints a characteristic advertises
/// (valid range and step). `None` means "protocol default".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Properties {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
}

/// One upstream mutation plus the optimistic cache fragment describing
/// the expected post-write device state.
///
/// A command with `combine` set carries only a payload fragment; it joins
/// the controller's combined-write window, and the combine function builds
/// the final payload and cache fragment when the window flushes.
#[derive(Clone, Debug)]
pub struct WriteCommand {
    pub method: ApiMethod,
    pub payload: Value,
    pub cache: DeviceState,
    pub combine: Option<CombineFn>,
}

type SupportsFn = fn(&DeviceConfig) -> bool;
type DecodeFn = fn(&DeviceState, &DeviceConfig) -> Option<CharacteristicValue>;
type EncodeFn = fn(CharacteristicValue, &DeviceConfig, Option<&DeviceState>)
    -> TuyaResult<Vec<WriteCommand>>;
type PropertiesFn = fn(&DeviceConfig) -> Properties;

/// The generic contract a characteristic implements, as plain function
/// values: a capability predicate over the device's declared data shape,
/// a pure push translation from the state bag to the protocol value, an
/// optional write conversion, and the protocol property constraints.
///
/// `supports` never performs I/O; `decode` must tolerate a
/// partially-populated bag (`None` means "skip") and never panic on a
/// well-formed but irrelevant one. Read-only characteristics leave
/// `encode` unset.
pub struct Descriptor {
    pub kind: CharacteristicKind,
    pub supports: SupportsFn,
    pub decode: DecodeFn,
    pub encode: Option<EncodeFn>,
    pub properties: PropertiesFn,
}

fn default_properties(_device: &DeviceConfig) -> Properties {
    Properties::default()
}

/// Every characteristic the bridge knows how to drive. Accessory
/// construction filters this table with each entry's `supports`
/// predicate; there is no per-device special casing anywhere else.
pub static DESCRIPTORS: &[Descriptor] = &[
    Descriptor {
        kind: CharacteristicKind::On,
        supports: power::supports_on,
        decode: power::decode_on,
        encode: Some(power::encode_on),
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::Active,
        supports: power::supports_active,
        decode: power::decode_active,
        encode: Some(power::encode_active),
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::MomentaryOn,
        supports: power::supports_momentary,
        decode: power::decode_momentary,
        encode: Some(power::encode_momentary),
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::Brightness,
        supports: light::supports_brightness,
        decode: light::decode_brightness,
        encode: Some(light::encode_brightness),
        properties: light::brightness_properties,
    },
    Descriptor {
        kind: CharacteristicKind::Hue,
        supports: light::supports_color,
        decode: light::decode_hue,
        encode: Some(light::encode_hue),
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::Saturation,
        supports: light::supports_color,
        decode: light::decode_saturation,
        encode: Some(light::encode_saturation),
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::ColorTemperature,
        supports: light::supports_color_temperature,
        decode: light::decode_color_temperature,
        encode: Some(light::encode_color_temperature),
        properties: light::color_temperature_properties,
    },
    Descriptor {
        kind: CharacteristicKind::RotationSpeed,
        supports: fan::supports_rotation_speed,
        decode: fan::decode_rotation_speed,
        encode: Some(fan::encode_rotation_speed),
        properties: fan::rotation_speed_properties,
    },
    Descriptor {
        kind: CharacteristicKind::CurrentPosition,
        supports: cover::supports_cover,
        decode: cover::decode_current_position,
        encode: None,
        properties: cover::position_properties,
    },
    Descriptor {
        kind: CharacteristicKind::TargetPosition,
        supports: cover::supports_cover,
        decode: cover::decode_target_position,
        encode: Some(cover::encode_target_position),
        properties: cover::position_properties,
    },
    Descriptor {
        kind: CharacteristicKind::PositionState,
        supports: cover::supports_cover,
        decode: cover::decode_position_state,
        encode: None,
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::HoldPosition,
        supports: cover::supports_hold_position,
        decode: cover::decode_hold_position,
        encode: Some(cover::encode_hold_position),
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::CurrentDoorState,
        supports: cover::supports_garage,
        decode: cover::decode_current_door_state,
        encode: None,
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::TargetDoorState,
        supports: cover::supports_garage,
        decode: cover::decode_target_door_state,
        encode: Some(cover::encode_target_door_state),
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::ObstructionDetected,
        supports: cover::supports_garage,
        decode: cover::decode_obstruction,
        encode: None,
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::CurrentTemperature,
        supports: climate::supports_current_temperature,
        decode: climate::decode_current_temperature,
        encode: None,
        properties: climate::current_temperature_properties,
    },
    Descriptor {
        kind: CharacteristicKind::TargetTemperature,
        supports: climate::supports_target_temperature,
        decode: climate::decode_target_temperature,
        encode: Some(climate::encode_target_temperature),
        properties: climate::target_temperature_properties,
    },
    Descriptor {
        kind: CharacteristicKind::CurrentHeatingCoolingState,
        supports: climate::supports_heating_cooling,
        decode: climate::decode_current_heating_cooling,
        encode: None,
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::TargetHeatingCoolingState,
        supports: climate::supports_heating_cooling,
        decode: climate::decode_target_heating_cooling,
        encode: Some(climate::encode_target_heating_cooling),
        properties: default_properties,
    },
    Descriptor {
        kind: CharacteristicKind::TemperatureDisplayUnits,
        supports: climate::supports_heating_cooling,
        decode: climate::decode_display_units,
        encode: None,
        properties: default_properties,
    },
];

/// The descriptors applicable to one device, by its declared data shape.
#[must_use]
pub fn descriptors_for(device: &DeviceConfig) -> Vec<&'static Descriptor> {
    DESCRIPTORS
        .iter()
        .filter(|descriptor| (descriptor.supports)(device))
        .collect()
}

/// One characteristic bound to one accessory.
///
/// Stateless beyond the device configuration it was built with; the read
/// path goes through the controller's coalesced fetch, the write path
/// converts to device-native encoding and issues the upstream mutation
/// with its optimistic cache fragment.
pub struct CharacteristicAdapter {
    descriptor: &'static Descriptor,
    device: DeviceConfig,
    controller: Arc<AccessoryController>,
}

impl CharacteristicAdapter {
    #[must_use]
    pub const fn new(
        descriptor: &'static Descriptor,
        device: DeviceConfig,
        controller: Arc<AccessoryController>,
    ) -> Self {
        Self {
            descriptor,
            device,
            controller,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> CharacteristicKind {
        self.descriptor.kind
    }

    #[must_use]
    pub fn properties(&self) -> Properties {
        (self.descriptor.properties)(&self.device)
    }

    /// Pure push translation; `None` when the bag holds no usable value.
    #[must_use]
    pub fn translate(&self, state: &DeviceState) -> Option<CharacteristicValue> {
        (self.descriptor.decode)(state, &self.device)
    }

    /// Read the characteristic through the coalesced state fetch.
    pub async fn get_remote(&self) -> TuyaResult<CharacteristicValue> {
        let state = self.controller.get_device_state().await?;
        self.translate(&state).ok_or_else(|| {
            TuyaError::api(format!(
                "no usable {} value in device state",
                self.kind().name()
            ))
        })
    }

    /// Convert and write the characteristic upstream.
    pub async fn set_remote(&self, value: CharacteristicValue) -> TuyaResult<()> {
        let Some(encode) = self.descriptor.encode else {
            return Err(TuyaError::UnsupportedOperation(format!(
                "{} is read-only",
                self.kind().name()
            )));
        };

        let cached = self.controller.cached_state(true).await;
        for command in encode(value, &self.device, cached.as_ref())? {
            match command.combine {
                Some(combine) => {
                    self.controller
                        .set_device_state_combined(command.method, command.payload, combine)
                        .await?;
                }
                None => {
                    self.controller
                        .set_device_state(command.method, command.payload, command.cache)
                        .await?;
                }
            }
        }
        Ok(())
    }
}
