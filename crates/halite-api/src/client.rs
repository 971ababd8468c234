// Vendor cloud HTTP client.
//
// Wraps `reqwest::Client` with envelope unwrapping, bearer-token
// injection from the shared TokenCache, and 401/403 -> InvalidToken
// mapping. Retry/backoff lives one level up in the poll orchestrator —
// this client makes exactly one request per call.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{AuthEnvelope, StatusEnvelope};
use crate::token::TokenCache;
use crate::transport::TransportConfig;

const LOGIN_PATH: &str = "login";
const CHECK_TOKEN_PATH: &str = "check-token";
const DEVICE_STATUS_PATH: &str = "device-status";
const DEVICE_UPDATE_PATH: &str = "device-update";

/// Raw HTTP client for the vendor cloud API.
///
/// All methods return unwrapped payloads — the `{ success, data }`
/// envelope is stripped before the caller sees it. The bearer token is
/// read from (and written to) the shared [`TokenCache`] so the poll
/// orchestrator can invalidate it between attempts.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: TokenCache,
}

impl RestClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the vendor API root; a trailing slash is appended
    /// if missing so `Url::join` keeps the final path segment.
    pub fn new(
        base_url: Url,
        transport: &TransportConfig,
        tokens: TokenCache,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let base_url = if base_url.path().ends_with('/') {
            base_url
        } else {
            Url::parse(&format!("{base_url}/"))?
        };
        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    /// The shared token cache.
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// The vendor API root.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Auth ─────────────────────────────────────────────────────────

    /// Authenticate with email/password and cache the session token.
    ///
    /// The `fcmToken` field is required by the endpoint but unused here
    /// (the official app registers for push notifications with it).
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthEnvelope, Error> {
        let url = self.base_url.join(LOGIN_PATH)?;
        debug!("logging in at {}", url);

        let body = json!({
            "email": email,
            "password": password.expose_secret(),
            "fcmToken": "",
        });

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let envelope: AuthEnvelope = parse_body(resp).await?;

        if !status.is_success() || !envelope.success {
            return Err(Error::Login {
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("login rejected (HTTP {status})")),
            });
        }

        match envelope.token.as_deref() {
            Some(token) => self.tokens.set(SecretString::from(token)).await,
            None => {
                return Err(Error::Login {
                    message: "login succeeded but no token returned".into(),
                })
            }
        }

        debug!("login successful");
        Ok(envelope)
    }

    /// Validate the cached token against the lightweight check endpoint.
    ///
    /// Returns the account payload (same shape as login, minus the
    /// token) so callers can refresh the device list from it.
    pub async fn check_token(&self) -> Result<AuthEnvelope, Error> {
        let envelope: AuthEnvelope = self.get(CHECK_TOKEN_PATH, &[]).await?;

        if !envelope.success {
            return Err(Error::InvalidToken {
                context: envelope.message.unwrap_or_else(|| "check-token".into()),
            });
        }

        Ok(envelope)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Fetch the raw telemetry map for one device.
    ///
    /// Returns `None` when the vendor reports `success: false` for the
    /// device (typically offline) — that is per-device state, not a
    /// cycle failure.
    pub async fn device_status(&self, device_id: u64) -> Result<Option<Map<String, Value>>, Error> {
        let envelope: StatusEnvelope = self
            .get(DEVICE_STATUS_PATH, &[("_deviceId", device_id.to_string())])
            .await?;

        if envelope.success {
            Ok(envelope.data)
        } else {
            debug!(
                device_id,
                message = envelope.message.as_deref().unwrap_or(""),
                "device status unavailable"
            );
            Ok(None)
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write a single config/action value to a device.
    ///
    /// `key` is a vendor telemetry key; it is split on `-` into the
    /// nested payload the update endpoint expects.
    pub async fn set_value(&self, device_id: u64, key: &str, value: Value) -> Result<(), Error> {
        let payload = build_update_payload(device_id, &[(key, value)]);
        self.set_direct_request(key, payload).await
    }

    /// Write several values in one request (e.g. power + turbo state,
    /// which the vendor requires together).
    pub async fn set_values(
        &self,
        device_id: u64,
        entries: &[(&str, Value)],
    ) -> Result<(), Error> {
        let operation = entries
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(",");
        let payload = build_update_payload(device_id, entries);
        self.set_direct_request(&operation, payload).await
    }

    /// Post a caller-supplied body to the update endpoint.
    ///
    /// Escape hatch for payload shapes the typed helpers don't cover;
    /// `operation` only labels errors and logs.
    pub async fn set_direct_request(&self, operation: &str, body: Value) -> Result<(), Error> {
        let envelope: StatusEnvelope = self.post(DEVICE_UPDATE_PATH, &body).await?;

        if !envelope.success {
            return Err(Error::OperationFailed {
                operation: operation.to_owned(),
                message: envelope.message.unwrap_or_else(|| "rejected".into()),
            });
        }

        Ok(())
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send an authenticated GET and unwrap the response body.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.base_url.join(path)?;
        debug!("GET {}", url);

        let mut request = self.http.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(bearer) = self.tokens.bearer().await {
            request = request.header(reqwest::header::AUTHORIZATION, bearer);
        }

        let resp = request.send().await.map_err(Error::Transport)?;
        check_auth_status(&resp, path)?;
        parse_body(resp).await
    }

    /// Send an authenticated POST with a JSON body and unwrap the response.
    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, Error> {
        let url = self.base_url.join(path)?;
        debug!("POST {}", url);

        let mut request = self.http.post(url).json(body);
        if let Some(bearer) = self.tokens.bearer().await {
            request = request.header(reqwest::header::AUTHORIZATION, bearer);
        }

        let resp = request.send().await.map_err(Error::Transport)?;
        check_auth_status(&resp, path)?;
        parse_body(resp).await
    }
}

/// Map 401/403 to `InvalidToken` before the body is consumed.
fn check_auth_status(resp: &reqwest::Response, context: &str) -> Result<(), Error> {
    match resp.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::InvalidToken {
            context: context.to_owned(),
        }),
        _ => Ok(()),
    }
}

/// Deserialize a response body, keeping the raw text on failure.
async fn parse_body<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let body = resp.text().await.map_err(Error::Transport)?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

/// Build the nested update payload from dash-separated telemetry keys.
///
/// `config-user-ph` with value `725` becomes
/// `{ "_deviceId": N, "data": { "config": { "user": { "ph": 725 } } } }`.
/// Multiple entries merge into the same tree.
pub fn build_update_payload(device_id: u64, entries: &[(&str, Value)]) -> Value {
    let mut data = Map::new();

    for (key, value) in entries {
        let parts: Vec<&str> = key.split('-').collect();
        insert_path(&mut data, &parts, value);
    }

    json!({
        "_deviceId": device_id,
        "data": data,
    })
}

fn insert_path(node: &mut Map<String, Value>, parts: &[&str], value: &Value) {
    match parts {
        [] => {}
        [leaf] => {
            node.insert((*leaf).to_owned(), value.clone());
        }
        [head, rest @ ..] => {
            let child = node
                .entry((*head).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = child {
                insert_path(map, rest, value);
            } else {
                let mut map = Map::new();
                insert_path(&mut map, rest, value);
                *child = Value::Object(map);
            }
        }
    }
}
