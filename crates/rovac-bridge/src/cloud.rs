//! # Cloud REST Client
//!
//! HTTP client for the vacuum cloud: OAuth token grants plus the two
//! resource lookups the bridge needs before it can open an MQTT session
//! (the account's user ID, which doubles as the MQTT username, and the
//! device list).
//!
//! ## Request Conventions
//! - Token grants go to `POST /oauth/token` as a form body, with the OAuth
//!   client credentials as HTTP Basic auth
//! - Resource GETs carry a Bearer token and a vendor-versioned Accept
//!   header (`application/vnd.slamtec.*-v1.0+json`)
//! - A 401 on a resource GET invalidates the cached credential and retries
//!   exactly once with a fresh token

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{TokenEndpoint, TokenGrant, TokenManager};
use crate::config::CloudConfig;
use crate::error::{BridgeError, BridgeResult};

const ACCEPT_USER: &str = "application/vnd.slamtec.user-v1.0+json";
const ACCEPT_DEVICE_LIST: &str = "application/vnd.slamtec.devicelist-v1.0+json";
const ACCEPT_DEVICE: &str = "application/vnd.slamtec.device-v1.0+json";

// =============================================================================
// Response Shapes
// =============================================================================

#[derive(Debug, Deserialize)]
struct OauthResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct DeviceListResponse {
    #[serde(default)]
    content: Vec<DeviceInfo>,
}

/// One device as listed by the cloud.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
}

// =============================================================================
// Cloud API Client
// =============================================================================

/// Cloud REST client. Cheap to clone (shares the inner reqwest pool).
#[derive(Clone)]
pub struct CloudApi {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl CloudApi {
    /// Builds a client from the cloud section of the bridge config.
    pub fn new(config: &CloudConfig) -> BridgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BridgeError::CloudApi(format!("Failed to build HTTP client: {}", e)))?;

        Ok(CloudApi {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Posts one OAuth grant as a form body with Basic client credentials.
    async fn token_request(&self, form: &[(&str, &str)]) -> BridgeResult<TokenGrant> {
        let response = self
            .http
            .post(self.url("/oauth/token"))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED
        {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::AuthFailed(format!(
                "Token grant rejected (HTTP {}): {}",
                status.as_u16(),
                body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::CloudStatus {
                status: status.as_u16(),
                body,
            });
        }

        let oauth: OauthResponse = response.json().await?;
        Ok(TokenGrant {
            access_token: oauth.access_token,
            refresh_token: oauth.refresh_token.unwrap_or_default(),
            expires_in: oauth.expires_in,
        })
    }

    /// Authenticated GET with a vendor Accept header.
    ///
    /// On 401 the cached credential is dropped and the request is retried
    /// once with a fresh token; a second 401 surfaces as [`BridgeError`].
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        tokens: &TokenManager<CloudApi>,
        path: &str,
        accept: &str,
    ) -> BridgeResult<T> {
        let mut token = tokens.get_valid_token().await?;

        for attempt in 0..2 {
            let response = self
                .http
                .get(self.url(path))
                .bearer_auth(&token)
                .header(reqwest::header::ACCEPT, accept)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!(path, "Cloud rejected token, re-authenticating");
                tokens.invalidate().await;
                token = tokens.get_valid_token().await?;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(BridgeError::CloudStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(response.json().await?);
        }

        // Second 401 after a fresh token
        Err(BridgeError::AuthFailed(format!(
            "Cloud kept rejecting a fresh token for {}",
            path
        )))
    }

    /// Fetches the account's user UUID (the MQTT username).
    pub async fn get_user_id(&self, tokens: &TokenManager<CloudApi>) -> BridgeResult<String> {
        let user: UserResponse = self.get_json(tokens, "/api/users", ACCEPT_USER).await?;
        debug!(user_id = %user.user_id, "Resolved cloud user");
        Ok(user.user_id)
    }

    /// Fetches the account's registered devices.
    pub async fn get_devices(&self, tokens: &TokenManager<CloudApi>) -> BridgeResult<Vec<DeviceInfo>> {
        let list: DeviceListResponse = self
            .get_json(tokens, "/api/devices", ACCEPT_DEVICE_LIST)
            .await?;
        debug!(count = list.content.len(), "Fetched device list");
        Ok(list.content)
    }

    /// Fetches a single device.
    pub async fn get_device(
        &self,
        tokens: &TokenManager<CloudApi>,
        device_id: &str,
    ) -> BridgeResult<DeviceInfo> {
        self.get_json(tokens, &format!("/api/devices/{}", device_id), ACCEPT_DEVICE)
            .await
    }
}

impl TokenEndpoint for CloudApi {
    async fn password_grant(&self, email: &str, password: &str) -> BridgeResult<TokenGrant> {
        debug!("Requesting password grant");
        self.token_request(&[
            ("grant_type", "password"),
            ("username", email),
            ("password", password),
        ])
        .await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> BridgeResult<TokenGrant> {
        debug!("Requesting refresh grant");
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloudConfig;

    fn api() -> CloudApi {
        CloudApi::new(&CloudConfig {
            base_url: "https://cloud.example.com/".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = api();
        assert_eq!(
            api.url("/oauth/token"),
            "https://cloud.example.com/oauth/token"
        );
    }

    #[test]
    fn test_device_list_deserialization() {
        let raw = r#"{
            "content": [
                {"device_id": "vac-042", "name": "Living Room", "model": "BW-VC1"},
                {"device_id": "vac-043"}
            ]
        }"#;
        let list: DeviceListResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(list.content.len(), 2);
        assert_eq!(list.content[0].device_id, "vac-042");
        assert_eq!(list.content[0].name.as_deref(), Some("Living Room"));
        assert!(list.content[1].name.is_none());

        // Missing content key means an empty account, not a parse error
        let empty: DeviceListResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.content.is_empty());
    }

    #[test]
    fn test_oauth_response_deserialization() {
        let raw = r#"{"access_token":"at","refresh_token":"rt","expires_in":1800}"#;
        let resp: OauthResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.access_token, "at");
        assert_eq!(resp.expires_in, Some(1800));

        // Minimal response: only the access token is required
        let resp: OauthResponse = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        assert!(resp.refresh_token.is_none());
        assert!(resp.expires_in.is_none());
    }
}
