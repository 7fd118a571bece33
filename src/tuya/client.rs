//! Authenticated client for the Tuya OpenAPI.

use crate::error::{ExporterError, Result};
use crate::metrics::{data::StatusReading, traits::StatusSource};
use crate::tuya::model::{parse_status, ApiResponse, StatusEntry, TokenInfo};
use crate::tuya::sign::{self, SIGN_METHOD};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tokens expiring within this window are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Error code the API returns for an expired or revoked access token.
const TOKEN_INVALID_CODE: i64 = 1010;

/// Project credentials for the Tuya cloud.
#[derive(Clone, Serialize, Deserialize)]
pub struct TuyaCredentials {
    /// Regional API base URL (e.g., "https://openapi.tuyaeu.com")
    pub endpoint: String,
    /// Cloud project access id
    pub access_id: String,
    /// Cloud project access secret
    pub access_secret: String,
}

impl TuyaCredentials {
    pub fn new(
        endpoint: impl Into<String>,
        access_id: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_id: access_id.into(),
            access_secret: access_secret.into(),
        }
    }
}

impl fmt::Debug for TuyaCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TuyaCredentials")
            .field("endpoint", &self.endpoint)
            .field("access_id", &self.access_id)
            .field("access_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn from_token(info: TokenInfo, requested_at: DateTime<Utc>) -> Self {
        Self {
            access_token: info.access_token,
            refresh_token: info.refresh_token,
            expires_at: requested_at + ChronoDuration::seconds(info.expire_time),
        }
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(REFRESH_MARGIN_SECS) >= self.expires_at
    }
}

/// Signs requests and keeps the session token current.
pub struct TuyaClient {
    http: reqwest::Client,
    base_url: String,
    credentials: TuyaCredentials,
    session: Mutex<Option<Session>>,
}

impl TuyaClient {
    /// Create a client; no request is made until [`TuyaClient::connect`].
    ///
    /// Without a `timeout` a hung request blocks its caller indefinitely.
    pub fn new(credentials: TuyaCredentials, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            base_url: credentials.endpoint.trim_end_matches('/').to_string(),
            credentials,
            session: Mutex::new(None),
        })
    }

    /// Obtain a fresh access token with the project credentials.
    pub async fn connect(&self) -> Result<()> {
        let session = self.request_session("/v1.0/token?grant_type=1").await?;
        info!("Connected to Tuya cloud at {}", self.base_url);
        *self.session.lock().await = Some(session);
        Ok(())
    }

    /// Whether a session token is currently held.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn request_session(&self, path: &str) -> Result<Session> {
        let requested_at = Utc::now();
        let info: TokenInfo = self.send(path, None).await?;
        Ok(Session::from_token(info, requested_at))
    }

    /// Current access token, refreshing or reconnecting as needed.
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.session.lock().await;

        let session = match guard.take() {
            Some(session) if !session.needs_refresh(Utc::now()) => session,
            Some(session) => {
                debug!("Access token expires at {}, refreshing", session.expires_at);
                let path = format!("/v1.0/token/{}", session.refresh_token);
                match self.request_session(&path).await {
                    Ok(session) => session,
                    Err(err) => {
                        warn!("Token refresh failed ({}), reconnecting", err);
                        self.request_session("/v1.0/token?grant_type=1").await?
                    }
                }
            }
            None => self.request_session("/v1.0/token?grant_type=1").await?,
        };

        let token = session.access_token.clone();
        *guard = Some(session);
        Ok(token)
    }

    /// Signed GET of a business resource.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let token = self.access_token().await?;
        match self.send(path, Some(&token)).await {
            Err(ExporterError::Api { code, msg }) if code == TOKEN_INVALID_CODE => {
                // Force a new grant on the next call.
                *self.session.lock().await = None;
                Err(ExporterError::api_error(code, msg))
            }
            other => other,
        }
    }

    async fn send<T: DeserializeOwned>(&self, path: &str, access_token: Option<&str>) -> Result<T> {
        let timestamp_ms = Utc::now().timestamp_millis();
        let nonce = uuid::Uuid::new_v4().to_string();
        let string_to_sign = sign::string_to_sign("GET", b"", path);
        let signature = sign::sign(
            &self.credentials.access_secret,
            &self.credentials.access_id,
            access_token,
            timestamp_ms,
            &nonce,
            &string_to_sign,
        )?;

        let mut request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("client_id", &self.credentials.access_id)
            .header("sign", signature)
            .header("sign_method", SIGN_METHOD)
            .header("t", timestamp_ms.to_string())
            .header("nonce", nonce);
        if let Some(token) = access_token {
            request = request.header("access_token", token);
        }

        let response = request.send().await?.error_for_status()?;
        let envelope: ApiResponse<T> = response.json().await?;
        envelope.into_result()
    }

    /// Fetch the current data points of a device.
    pub async fn device_status(&self, device_id: &str) -> Result<StatusReading> {
        let entries: Vec<StatusEntry> = self
            .get(&format!("/v1.0/devices/{}/status", device_id))
            .await?;
        Ok(parse_status(entries))
    }
}

impl StatusSource for TuyaClient {
    async fn fetch_status(&self, device_id: &str) -> Result<StatusReading> {
        self.device_status(device_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn token_body(access: &str, refresh: &str, expire_time: i64) -> String {
        json!({
            "success": true,
            "result": {
                "access_token": access,
                "refresh_token": refresh,
                "expire_time": expire_time,
                "uid": "bay1"
            },
            "t": 1700000000000i64
        })
        .to_string()
    }

    fn client(server: &Server) -> TuyaClient {
        TuyaClient::new(TuyaCredentials::new(server.url(), "test-id", "test-secret"), None)
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_fetch_status() {
        let mut server = Server::new_async().await;

        let token = server
            .mock("GET", "/v1.0/token?grant_type=1")
            .match_header("client_id", "test-id")
            .match_header("sign_method", "HMAC-SHA256")
            .match_header("access_token", Matcher::Missing)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("tok-1", "ref-1", 7200))
            .create_async()
            .await;

        let status = server
            .mock("GET", "/v1.0/devices/dev-1/status")
            .match_header("access_token", "tok-1")
            .match_header("sign", Matcher::Regex("^[0-9A-F]{64}$".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "success": true,
                    "result": [
                        {"code": "switch_1", "value": true},
                        {"code": "cur_power", "value": 1234},
                        {"code": "add_ele", "value": 150}
                    ],
                    "t": 1700000000000i64
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client(&server);
        client.connect().await.unwrap();
        assert!(client.is_connected().await);

        let reading = client.fetch_status("dev-1").await.unwrap();
        assert_eq!(reading.get("cur_power"), Some(1234.0));
        assert_eq!(reading.get("add_ele"), Some(150.0));
        assert_eq!(reading.get("switch_1"), None);

        token.assert_async().await;
        status.assert_async().await;
    }

    #[tokio::test]
    async fn test_unsuccessful_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1.0/token?grant_type=1")
            .with_body(token_body("tok", "ref", 7200))
            .create_async()
            .await;
        let _mock = server
            .mock("GET", "/v1.0/devices/dev-1/status")
            .with_body(r#"{"success":false,"code":2008,"msg":"command or value not support","t":1}"#)
            .create_async()
            .await;

        let client = client(&server);
        client.connect().await.unwrap();

        let err = client.fetch_status("dev-1").await.unwrap_err();
        assert!(matches!(err, ExporterError::Api { code: 2008, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1.0/token?grant_type=1")
            .with_body(token_body("tok", "ref", 7200))
            .create_async()
            .await;
        let _mock = server
            .mock("GET", "/v1.0/devices/dev-1/status")
            .with_body("<html>gateway timeout</html>")
            .create_async()
            .await;

        let client = client(&server);
        client.connect().await.unwrap();
        assert!(client.fetch_status("dev-1").await.is_err());
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed() {
        let mut server = Server::new_async().await;
        let grant = server
            .mock("GET", "/v1.0/token?grant_type=1")
            .with_body(token_body("old", "ref-old", 30))
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("GET", "/v1.0/token/ref-old")
            .match_header("access_token", Matcher::Missing)
            .with_body(token_body("new", "ref-new", 7200))
            .expect(1)
            .create_async()
            .await;
        let status = server
            .mock("GET", "/v1.0/devices/dev-1/status")
            .match_header("access_token", "new")
            .with_body(r#"{"success":true,"result":[],"t":1}"#)
            .create_async()
            .await;

        let client = client(&server);
        client.connect().await.unwrap();
        let reading = client.fetch_status("dev-1").await.unwrap();
        assert!(reading.is_empty());

        grant.assert_async().await;
        refresh.assert_async().await;
        status.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_token_forces_new_grant() {
        let mut server = Server::new_async().await;
        let grant = server
            .mock("GET", "/v1.0/token?grant_type=1")
            .with_body(token_body("tok", "ref", 7200))
            .expect(2)
            .create_async()
            .await;
        let _mock = server
            .mock("GET", "/v1.0/devices/dev-1/status")
            .with_body(r#"{"success":false,"code":1010,"msg":"token invalid","t":1}"#)
            .create_async()
            .await;

        let client = client(&server);
        client.connect().await.unwrap();

        assert!(client.fetch_status("dev-1").await.is_err());
        assert!(!client.is_connected().await);

        // The next call grants a new token before fetching.
        assert!(client.fetch_status("dev-1").await.is_err());
        grant.assert_async().await;
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1.0/token?grant_type=1")
            .with_body(r#"{"success":false,"code":1004,"msg":"sign invalid","t":1}"#)
            .create_async()
            .await;

        let client = client(&server);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, ExporterError::Api { code: 1004, .. }));
        assert!(!client.is_connected().await);
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = TuyaCredentials::new("https://openapi.tuyaeu.com", "id", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("openapi.tuyaeu.com"));
    }
}
