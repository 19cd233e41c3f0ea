pub mod api;
pub mod error;
pub mod state;

pub use api::{
    ApiMethod, AuthResponse, CODE_RATE_LIMIT, CODE_SUCCESS, DeviceConfig, DeviceOverrides,
    DeviceType, DiscoveryPayload, ResponseHeader, SkillResponse,
};
pub use error::{TuyaError, TuyaResult};
pub use state::{CoverState, DeviceState};
