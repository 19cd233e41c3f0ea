use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Movement state reported by covers, garage doors and windows.
///
/// The cloud API encodes these as bare numbers in the `state` field; some
/// firmwares report a boolean instead (fully open / fully closed).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum CoverState {
    Opening = 1,
    Closing = 2,
    Stopped = 3,
}

impl CoverState {
    #[must_use]
    pub const fn from_number(value: f64) -> Option<Self> {
        match value as u8 {
            1 => Some(Self::Opening),
            2 => Some(Self::Closing),
            3 => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// The state bag the cloud API reports for one device.
///
/// This is deliberately schemaless: a device only populates the keys
/// relevant to its capabilities, and different firmwares encode the same
/// key differently (booleans as `true` or `"true"`, numbers as numbers or
/// strings). Typed accessors below normalize those encodings.
///
/// Updates are applied by shallow merge, never by replacement, so partial
/// fragments from different characteristics accumulate without clobbering
/// unrelated keys.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DeviceState(pub Map<String, Value>);

impl DeviceState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow key overwrite: commutative for disjoint key sets,
    /// last-write-wins for overlapping keys.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Builder-style insert, mostly useful for constructing write fragments.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Loose boolean: `true`, `"true"` and `"True"` are truthy, everything
    /// else (including a missing key) is falsy.
    #[must_use]
    pub fn boolean(&self, key: &str) -> bool {
        Self::truthy(self.0.get(key))
    }

    /// Loose number: accepts a JSON number or a numeric string.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        Self::as_number(self.0.get(key)?)
    }

    /// A device is reachable only when it explicitly reports `online` as
    /// truthy. Missing keys mean "unknown", which callers must treat as
    /// unreachable rather than assume liveness.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.boolean("online")
    }

    /// Whether the device is currently in a color mode (as opposed to
    /// white/temperature mode). The API spells it both ways.
    #[must_use]
    pub fn in_color_mode(&self) -> bool {
        matches!(
            self.0.get("color_mode").and_then(Value::as_str),
            Some("color" | "colour")
        )
    }

    /// Numeric field of the nested `color` sub-object. Hue, saturation and
    /// brightness live there as strings.
    #[must_use]
    pub fn color_field(&self, field: &str) -> Option<f64> {
        let color = self.0.get("color")?.as_object()?;
        Self::as_number(color.get(field)?)
    }

    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn truthy(value: Option<&Value>) -> bool {
        match value {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

impl FromIterator<(String, Value)> for DeviceState {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
