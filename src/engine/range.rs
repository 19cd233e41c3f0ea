/// Bidirectional linear interpolation between a device-native scale and
/// the protocol-native scale.
///
/// Both directions are pure. A zero-width source interval would divide by
/// zero; callers constructing a mapper from device-reported ranges must
/// substitute a width of 1 first (see the rotation-speed characteristic).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeMap {
    source_start: f64,
    source_end: f64,
    target_start: f64,
    target_end: f64,
}

impl RangeMap {
    #[must_use]
    pub const fn new(source: (f64, f64), target: (f64, f64)) -> Self {
        Self {
            source_start: source.0,
            source_end: source.1,
            target_start: target.0,
            target_end: target.1,
        }
    }

    /// Device-native to protocol-native.
    #[must_use]
    pub fn to_target(&self, value: f64) -> f64 {
        (value - self.source_start) * (self.target_end - self.target_start)
            / (self.source_end - self.source_start)
            + self.target_start
    }

    /// Protocol-native to device-native.
    #[must_use]
    pub fn to_source(&self, value: f64) -> f64 {
        (value - self.target_start) * (self.source_end - self.source_start)
            / (self.target_end - self.target_start)
            + self.source_start
    }

    #[must_use]
    pub const fn source_start(&self) -> f64 {
        self.source_start
    }

    #[must_use]
    pub const fn source_end(&self) -> f64 {
        self.source_end
    }
}
