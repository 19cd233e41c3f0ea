pub mod tuya;

use async_trait::async_trait;
use serde_json::Value;
use ::tuya::{ApiMethod, DeviceConfig, DeviceState, TuyaResult};

/// The upstream cloud API, as seen by the synchronization engine.
///
/// Exactly one read and one write primitive, plus the bulk discovery call
/// the polling loop consumes. Implementations own timeouts and
/// authentication; the engine treats a transport timeout as any other
/// fetch failure.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// One upstream read of a single device's state.
    async fn fetch_device_state(&self, device_id: &str) -> TuyaResult<DeviceState>;

    /// One upstream write.
    async fn send_device_command(
        &self,
        device_id: &str,
        method: ApiMethod,
        payload: Value,
    ) -> TuyaResult<()>;

    /// Bulk read of every device on the account, used at discovery time
    /// and by the periodic poll.
    async fn fetch_all_devices(&self) -> TuyaResult<Vec<DeviceConfig>>;
}
