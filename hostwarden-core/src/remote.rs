//! Remote client: the handful of calls the agent makes to the collector
//! API, wrapped over [`reqwest::Client`]. Every call returns [`ApiError`]
//! so it can be driven through [`crate::backoff::with_backoff`] uniformly.
//!
//! Every per-host endpoint is namespaced under `server/{id}/...`; `id` is
//! this host's collector-assigned identity, carried in [`crate::settings::Settings::server_id`]
//! and passed in explicitly by the caller rather than cached here, since the
//! client itself is stateless.

use crate::diff::Change;
use crate::error::ApiError;
use crate::plugin::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SYNC_TIMEOUT: Duration = Duration::from_secs(600);

/// One entry in an `upload_changes` batch. Serialized as a 2-element array
/// `[kind, payload]` rather than an internally-tagged object, matching the
/// collector API's wire shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusPayload {
    Sync(Snapshot),
    Diff(Vec<Change>),
    Error(crate::error::ErrorRecord),
    Events(Vec<serde_json::Value>),
}

impl Serialize for StatusPayload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeTuple;
        let mut tuple = serializer.serialize_tuple(2)?;
        match self {
            StatusPayload::Sync(snapshot) => {
                tuple.serialize_element("SYNC")?;
                tuple.serialize_element(snapshot)?;
            }
            StatusPayload::Diff(changes) => {
                tuple.serialize_element("DIFF")?;
                let wire: Vec<WireChange> = changes.iter().map(WireChange::from).collect();
                tuple.serialize_element(&wire)?;
            }
            StatusPayload::Error(record) => {
                tuple.serialize_element("ERROR")?;
                tuple.serialize_element(record)?;
            }
            StatusPayload::Events(events) => {
                tuple.serialize_element("EVENTS")?;
                tuple.serialize_element(events)?;
            }
        }
        tuple.end()
    }
}

/// On-wire shape of a [`Change`]: `field_diff`'s `(Option, Option)` tuples
/// become two-element arrays since serde_json has no native tuple type.
#[derive(Serialize)]
struct WireChange<'a> {
    plugin: &'a str,
    kind: crate::diff::ChangeKind,
    key: &'a str,
    field_diff: std::collections::BTreeMap<&'a str, [&'a Option<crate::value::Value>; 2]>,
}

impl<'a> From<&'a Change> for WireChange<'a> {
    fn from(change: &'a Change) -> Self {
        WireChange {
            plugin: &change.plugin,
            kind: change.kind,
            key: &change.key,
            field_diff: change
                .field_diff
                .iter()
                .map(|(field, (old, new))| (field.as_str(), [old, new]))
                .collect(),
        }
    }
}

/// A full batch handed to `upload_changes`: plugin name -> the payloads
/// produced for it this tick. A `Vec` rather than a single payload because a
/// plugin can legitimately emit both a `DIFF` and an `EVENTS` payload in the
/// same tick, and a JSON object can't hold two values under one key.
pub type UploadBatch = HashMap<String, Vec<StatusPayload>>;

/// Server responses for `sync`/`upload_changes` wrap the settings patch
/// under a `settings` key rather than being the patch map directly.
#[derive(Deserialize)]
struct SettingsPatchResponse {
    #[serde(default)]
    settings: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct PingResponse {
    ping: String,
}

#[derive(Deserialize)]
struct RegisterResponse {
    server_id: String,
}

#[derive(Serialize)]
struct HostIdentity<'a> {
    hostname: &'a str,
    agent_version: &'a str,
}

/// HTTP client for the collector API.
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    hostname: String,
    agent_version: String,
}

impl RemoteClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        hostname: impl Into<String>,
        agent_version: impl Into<String>,
    ) -> Self {
        RemoteClient {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("reqwest client builds with static configuration"),
            base_url: base_url.into(),
            api_key,
            hostname: hostname.into(),
            agent_version: agent_version.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// URL for a per-host endpoint, namespaced under `server/{id}/...`.
    fn server_url(&self, server_id: &str, suffix: &str) -> String {
        self.url(&format!("server/{server_id}/{suffix}"))
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.basic_auth("api", Some(key)),
            None => builder,
        }
    }

    async fn send_json<T: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        body: &T,
    ) -> Result<R, ApiError> {
        let response = self.authed(request).json(body).send().await?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from)?;

        if !status.is_success() {
            return Err(ApiError {
                status_code: status.as_u16(),
                name: status.canonical_reason().unwrap_or("HTTPError").to_string(),
                message: Some(text.clone()),
                body: serde_json::from_str(&text).ok(),
            });
        }

        serde_json::from_str(&text).map_err(|_| ApiError::invalid_json(status.as_u16(), text))
    }

    /// Post a request whose successful response is a settings patch wrapped
    /// as `{"settings": {...}}`. An empty body (no patch) deserializes to
    /// `None` rather than failing, since the server isn't required to return
    /// a patch every time.
    async fn send_settings_patch<T: Serialize + ?Sized>(
        &self,
        request: reqwest::RequestBuilder,
        body: &T,
    ) -> Result<Option<HashMap<String, String>>, ApiError> {
        let response = self.authed(request).json(body).send().await?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from)?;

        if !status.is_success() {
            return Err(ApiError {
                status_code: status.as_u16(),
                name: status.canonical_reason().unwrap_or("HTTPError").to_string(),
                message: Some(text.clone()),
                body: serde_json::from_str(&text).ok(),
            });
        }

        if text.trim().is_empty() {
            return Ok(None);
        }

        let parsed: SettingsPatchResponse =
            serde_json::from_str(&text).map_err(|_| ApiError::invalid_json(status.as_u16(), text))?;
        Ok(parsed.settings)
    }

    /// Liveness check, used before the first sync and to probe recovery
    /// while backing off.
    pub async fn ping(&self, server_id: &str) -> Result<(), ApiError> {
        let response = self
            .authed(self.http.get(self.server_url(server_id, "ping")))
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from)?;

        if !status.is_success() {
            return Err(ApiError {
                status_code: status.as_u16(),
                name: "PingFailed".to_string(),
                message: Some(text),
                body: None,
            });
        }

        let parsed: PingResponse =
            serde_json::from_str(&text).map_err(|_| ApiError::invalid_json(status.as_u16(), text.clone()))?;
        if parsed.ping == "pong" {
            Ok(())
        } else {
            Err(ApiError {
                status_code: status.as_u16(),
                name: "PingFailed".to_string(),
                message: Some(format!("unexpected ping response: {}", parsed.ping)),
                body: None,
            })
        }
    }

    /// Register this host with the collector, returning the `server_id` it
    /// is assigned. Not called by the collection loop itself — obtaining a
    /// `server_id` is the operator CLI's job; this exists for that caller.
    pub async fn register(&self) -> Result<String, ApiError> {
        let body = HostIdentity {
            hostname: &self.hostname,
            agent_version: &self.agent_version,
        };
        let response: RegisterResponse = self.send_json(self.http.post(self.url("servers")), &body).await?;
        Ok(response.server_id)
    }

    /// Full-state sync, sent once at startup. Uses a much longer timeout
    /// than other calls since the first snapshot of a busy host can be
    /// large. Returns whatever settings patch the server wants applied.
    pub async fn sync(
        &self,
        server_id: &str,
        states: &HashMap<String, Snapshot>,
    ) -> Result<Option<HashMap<String, String>>, ApiError> {
        #[derive(Serialize)]
        struct SyncBody<'a> {
            hostname: &'a str,
            agent_version: &'a str,
            states: &'a HashMap<String, Snapshot>,
        }

        let body = SyncBody {
            hostname: &self.hostname,
            agent_version: &self.agent_version,
            states,
        };
        let request = self.http.post(self.server_url(server_id, "sync")).timeout(SYNC_TIMEOUT);
        self.send_settings_patch(request, &body).await
    }

    /// Upload one tick's batch of diffs, errors, and events, returning any
    /// settings patch the server wants applied.
    pub async fn upload_changes(&self, server_id: &str, batch: &UploadBatch) -> Result<Option<HashMap<String, String>>, ApiError> {
        self.send_settings_patch(self.http.post(self.server_url(server_id, "state")), batch).await
    }

    pub async fn create_event(&self, server_id: &str, plugin: &str, event: &serde_json::Value) -> Result<(), ApiError> {
        let body = serde_json::json!({ "plugin": plugin, "event": event });
        let response = self
            .authed(self.http.post(self.server_url(server_id, "event")))
            .json(&body)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError {
                status_code: response.status().as_u16(),
                name: "CreateEventFailed".to_string(),
                message: None,
                body: None,
            })
        }
    }

    /// Best-effort notice sent on graceful shutdown so the server can mark
    /// the host offline immediately rather than waiting for a missed tick.
    pub async fn shutdown_notice(&self, server_id: &str) -> Result<(), ApiError> {
        let response = self
            .authed(self.http.post(self.server_url(server_id, "shutdown")))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError {
                status_code: response.status().as_u16(),
                name: "ShutdownNoticeFailed".to_string(),
                message: None,
                body: None,
            })
        }
    }
}
