use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use url::Url;

use ::tuya::{
    ApiMethod, DeviceConfig, DeviceState, DiscoveryPayload, SkillResponse, TuyaError, TuyaResult,
};

use super::session::{self, Credentials, Session};
use crate::backend::DeviceTransport;

fn http_error(err: &reqwest::Error) -> TuyaError {
    TuyaError::api(format!("http request failed: {err}"))
}

/// Cloud API client. All state and control traffic goes through the
/// area frontend's `/homeassistant/skill` endpoint; the session lease is
/// renewed transparently when it lapses.
pub struct TuyaClient {
    http: reqwest::Client,
    credentials: Credentials,
    session: Mutex<Session>,
}

impl TuyaClient {
    const DEFAULT_TIMEOUT_SECS: u64 = 10;

    pub async fn login(credentials: Credentials) -> TuyaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TuyaError::api(format!("http client setup failed: {e}")))?;

        let session = session::login(&http, &credentials).await?;
        debug!("authenticated against {}", session.base_url());

        Ok(Self {
            http,
            credentials,
            session: Mutex::new(session),
        })
    }

    /// Current frontend and token, renewing the lease first if needed.
    /// A failed refresh falls back to a full password login.
    async fn lease(&self) -> TuyaResult<(Url, String)> {
        let mut session = self.session.lock().await;
        if session.is_expired() {
            *session = match session::refresh(&self.http, &session).await {
                Ok(renewed) => renewed,
                Err(err) => {
                    warn!("token refresh failed ({err}), retrying with password login");
                    session::login(&self.http, &self.credentials).await?
                }
            };
        }
        Ok((
            session.base_url().clone(),
            session.access_token().to_string(),
        ))
    }

    async fn skill_request(
        &self,
        name: &str,
        namespace: &str,
        fields: Map<String, Value>,
    ) -> TuyaResult<Option<Value>> {
        let (base_url, token) = self.lease().await?;
        let url = base_url
            .join("/homeassistant/skill")
            .map_err(|e| TuyaError::api(format!("bad skill url: {e}")))?;
        let body = skill_body(name, namespace, &token, fields);

        debug!("{namespace}/{name} request to {url}");
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| http_error(&e))?;
        let response: SkillResponse = response.json().await.map_err(|e| http_error(&e))?;

        let header = &response.header;
        if header.is_rate_limit() {
            return Err(TuyaError::RateLimit(
                header
                    .msg
                    .clone()
                    .unwrap_or_else(|| "request throttled".to_string()),
            ));
        }
        if !header.is_success() {
            return Err(TuyaError::api(format!(
                "{name} failed: {} {}",
                header.code,
                header.msg.as_deref().unwrap_or("")
            )));
        }
        Ok(response.payload)
    }

    pub async fn discover_devices(&self) -> TuyaResult<Vec<DeviceConfig>> {
        let payload = self
            .skill_request("Discovery", "discovery", Map::new())
            .await?
            .ok_or_else(|| TuyaError::api("discovery returned no payload"))?;
        let payload: DiscoveryPayload = serde_json::from_value(payload)
            .map_err(|e| TuyaError::api(format!("malformed discovery payload: {e}")))?;
        Ok(payload.devices)
    }
}

fn skill_body(name: &str, namespace: &str, token: &str, fields: Map<String, Value>) -> Value {
    let mut payload = Map::new();
    payload.insert("accessToken".to_string(), Value::String(token.to_string()));
    payload.extend(fields);

    json!({
        "header": {
            "name": name,
            "namespace": namespace,
            "payloadVersion": 1,
        },
        "payload": payload,
    })
}

#[async_trait]
impl DeviceTransport for TuyaClient {
    // Single-device reads go through the bulk discovery call; it is the
    // only endpoint that reports reachability alongside the state bag.
    async fn fetch_device_state(&self, device_id: &str) -> TuyaResult<DeviceState> {
        self.discover_devices()
            .await?
            .into_iter()
            .find(|device| device.id == device_id)
            .map(|device| device.data)
            .ok_or_else(|| TuyaError::api(format!("device {device_id} not in discovery response")))
    }

    async fn send_device_command(
        &self,
        device_id: &str,
        method: ApiMethod,
        payload: Value,
    ) -> TuyaResult<()> {
        let mut fields = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(TuyaError::api(format!(
                    "command payload must be an object, got {other}"
                )));
            }
        };
        fields.insert("devId".to_string(), Value::String(device_id.to_string()));

        self.skill_request(method.name(), "control", fields).await?;
        Ok(())
    }

    async fn fetch_all_devices(&self) -> TuyaResult<Vec<DeviceConfig>> {
        self.discover_devices().await
    }
}
