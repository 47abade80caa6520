use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-waypoint-signature";
pub const NAVIGATE_HEADER: &str = "x-waypoint-navigate";
pub const SESSION_HEADER: &str = "x-waypoint-session";
pub const REPLACE_HEADER: &str = "x-waypoint-replace";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed frame: {0}")]
    Decode(String),
}

/// One `l`/`e` record for a matched route, in chain order.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteData {
    pub id: String,
    pub data: Option<Value>,
    pub ctx: Option<Value>,
    pub error: Option<String>,
}

/// One deferred chunk delivered after the ready marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub key: String,
    pub result: Result<Value, String>,
}

/// A fully decoded navigation payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationPayload {
    pub routes: Vec<RouteData>,
    pub head: Option<Value>,
    pub query_entries: Vec<Value>,
    pub chunks: Vec<Chunk>,
    /// The eager payload arrived (`r` frame).
    pub ready: bool,
    /// The stream finished (`d` frame).
    pub complete: bool,
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, PartialEq)]
pub enum NavResponse {
    Payload(NavigationPayload),
    Redirect { to: String, replace: bool },
    Superseded,
}

/// Client for a waypoint navigation endpoint.
pub struct NavClient {
    client: reqwest::Client,
    base_url: String,
    secret: Option<String>,
    session: Option<String>,
}

impl NavClient {
    pub fn new(base_url: &str) -> Self {
        // Redirects stay visible to the caller instead of being followed.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .expect("default client configuration is valid");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: None,
            session: None,
        }
    }

    /// Sign every request with this shared secret.
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    /// Tag requests with a logical session for supersede tracking.
    pub fn with_session(mut self, session: &str) -> Self {
        self.session = Some(session.to_string());
        self
    }

    /// Fetch and decode the navigation payload for `path` (path plus query).
    pub async fn navigate(&self, path: &str) -> Result<NavResponse, ClientError> {
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(NAVIGATE_HEADER, "1");
        if let Some(session) = &self.session {
            request = request.header(SESSION_HEADER, session);
        }
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign(path, secret, unix_now()));
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 204 {
            return Ok(NavResponse::Superseded);
        }
        if status.is_redirection() {
            let to = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let replace = response.headers().contains_key(REPLACE_HEADER);
            return Ok(NavResponse::Redirect { to, replace });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(NavResponse::Payload(parse_lines(&body)?))
    }
}

/// Assemble a payload from newline-delimited frames.
///
/// Unknown tags are skipped so payloads from newer servers stay decodable;
/// lines that are not JSON or carry no tag are errors.
pub fn parse_lines(body: &str) -> Result<NavigationPayload, ClientError> {
    let mut payload = NavigationPayload::default();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(line).map_err(|e| ClientError::Decode(e.to_string()))?;
        let Some(tag) = value.get("t").and_then(Value::as_str) else {
            return Err(ClientError::Decode(format!("frame without tag: {line}")));
        };

        match tag {
            "l" => payload.routes.push(RouteData {
                id: str_field(&value, "id")?,
                data: non_null(value.get("data")),
                ctx: non_null(value.get("ctx")),
                error: None,
            }),
            "e" => {
                let id = str_field(&value, "id")?;
                let message = value
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                match value.get("key").and_then(Value::as_str) {
                    // Keyed errors belong to a deferred chunk.
                    Some(key) => payload.chunks.push(Chunk {
                        id,
                        key: key.to_string(),
                        result: Err(message),
                    }),
                    None => payload.routes.push(RouteData {
                        id,
                        data: None,
                        ctx: None,
                        error: Some(message),
                    }),
                }
            }
            "c" => payload.chunks.push(Chunk {
                id: str_field(&value, "id")?,
                key: str_field(&value, "key")?,
                result: Ok(value.get("data").cloned().unwrap_or(Value::Null)),
            }),
            "h" => payload.head = value.get("head").cloned(),
            "q" => {
                payload.query_entries = value
                    .get("entries")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
            }
            "r" => payload.ready = true,
            "d" => payload.complete = true,
            _ => {}
        }
    }

    Ok(payload)
}

fn str_field(value: &Value, field: &str) -> Result<String, ClientError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClientError::Decode(format!("frame missing {field}")))
}

fn non_null(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.clone()),
    }
}

/// Sign a request target the way the server verifies it:
/// `<hex hmac-sha256 of "target.timestamp">.<timestamp>`.
pub fn sign(target: &str, secret: &str, timestamp: u64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(target.as_bytes());
    mac.update(b".");
    mac.update(timestamp.to_string().as_bytes());
    format!("{}.{}", hex::encode(mac.finalize().into_bytes()), timestamp)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}
