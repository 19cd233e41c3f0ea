use thiserror::Error;

/// Error taxonomy for the Tuya cloud API.
///
/// The variants are `Clone` on purpose: a single coalesced fetch outcome is
/// fanned out to every waiter, so the error must be duplicable. Transport
/// failures are carried as their rendered message in [`TuyaError::Api`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TuyaError {
    /// Upstream throttling ("FrequentlyInvoke"). Recoverable locally by
    /// falling back to a stale cache snapshot.
    #[error("Rate limit exceeded - {0}")]
    RateLimit(String),

    /// The API answered, but reports the device as unreachable.
    #[error("Device offline")]
    DeviceOffline,

    /// Credential or session failure. The caller must stop issuing requests
    /// until the session layer re-authenticates.
    #[error("Authentication failed - {0}")]
    Authentication(String),

    /// The requested write is not valid for this device.
    #[error("Operation not supported - {0}")]
    UnsupportedOperation(String),

    /// Anything else, surfaced unchanged.
    #[error("Tuya API error - {0}")]
    Api(String),
}

impl TuyaError {
    #[must_use]
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// True if the error should be handled by serving stale cached state.
    #[must_use]
    pub const fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit(_))
    }
}

pub type TuyaResult<T> = Result<T, TuyaError>;
