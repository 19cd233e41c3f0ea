use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use url::Url;

use ::tuya::{AuthResponse, TuyaError, TuyaResult};

/// Tokens are dropped this long before the server-side expiry so a
/// request never departs with a token about to lapse mid-flight.
const EXPIRY_SLACK: Duration = Duration::from_secs(100);

const DEFAULT_BASE_URL: &str = "https://px1.tuyaus.com";

/// Vendor app the account was registered through. Each app is a separate
/// credential namespace on the same API.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiPlatform {
    #[default]
    Tuya,
    SmartLife,
    JinvooSmart,
}

impl ApiPlatform {
    #[must_use]
    pub const fn biz_type(self) -> &'static str {
        match self {
            Self::Tuya => "tuya",
            Self::SmartLife => "smart_life",
            Self::JinvooSmart => "jinvoo_smart",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub country_code: String,
    #[serde(default)]
    pub platform: ApiPlatform,
}

/// One authenticated lease on the cloud API.
///
/// Immutable once issued; `login` and `refresh` hand back a new session
/// rather than mutating the old one, so a session can never be observed
/// half-updated.
#[derive(Clone, Debug)]
pub struct Session {
    access_token: String,
    refresh_token: String,
    expires_at: Instant,
    base_url: Url,
}

impl Session {
    fn from_auth(auth: AuthResponse) -> TuyaResult<Self> {
        if auth.response_status.as_deref() == Some("error") {
            return Err(TuyaError::Authentication(
                auth.error_msg
                    .unwrap_or_else(|| "authentication rejected".to_string()),
            ));
        }
        let access_token = auth
            .access_token
            .ok_or_else(|| TuyaError::Authentication("no access token in response".to_string()))?;
        let refresh_token = auth
            .refresh_token
            .ok_or_else(|| TuyaError::Authentication("no refresh token in response".to_string()))?;
        let expires_in = Duration::from_secs(auth.expires_in.unwrap_or(0));

        Ok(Self {
            base_url: Self::area_base_url(&access_token)?,
            access_token,
            refresh_token,
            expires_at: Instant::now() + expires_in.saturating_sub(EXPIRY_SLACK),
        })
    }

    /// The token prefix encodes the region whose frontend must serve all
    /// further requests for this account.
    pub fn area_base_url(access_token: &str) -> TuyaResult<Url> {
        let host = match access_token.get(..2) {
            Some("AY") => "https://px1.tuyacn.com",
            Some("EU") => "https://px1.tuyaeu.com",
            _ => DEFAULT_BASE_URL,
        };
        Url::parse(host).map_err(|e| TuyaError::api(format!("bad area url: {e}")))
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

fn http_error(err: &reqwest::Error) -> TuyaError {
    TuyaError::api(format!("http request failed: {err}"))
}

/// Password login against the default frontend; the session that comes
/// back already points at the account's area frontend.
pub async fn login(http: &reqwest::Client, credentials: &Credentials) -> TuyaResult<Session> {
    let url = format!("{DEFAULT_BASE_URL}/homeassistant/auth.do");
    let form = [
        ("userName", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
        ("countryCode", credentials.country_code.as_str()),
        ("bizType", credentials.platform.biz_type()),
        ("from", "tuya"),
    ];

    let response = http
        .post(url)
        .form(&form)
        .send()
        .await
        .map_err(|e| http_error(&e))?;
    let auth: AuthResponse = response.json().await.map_err(|e| http_error(&e))?;
    Session::from_auth(auth)
}

/// Trade the refresh token for a fresh session on the same area frontend.
pub async fn refresh(http: &reqwest::Client, session: &Session) -> TuyaResult<Session> {
    let mut url = session
        .base_url()
        .join("/homeassistant/access.do")
        .map_err(|e| TuyaError::api(format!("bad refresh url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("grant_type", "refresh_token")
        .append_pair("refresh_token", &session.refresh_token);

    let response = http.get(url).send().await.map_err(|e| http_error(&e))?;
    let auth: AuthResponse = response.json().await.map_err(|e| http_error(&e))?;
    Session::from_auth(auth)
}
