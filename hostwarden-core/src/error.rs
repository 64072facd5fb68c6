//! Error taxonomy for the collection/diff/sync engine.
//!
//! Three independent error families:
//! - [`ApiError`] — transient remote failures, retried forever by the backoff
//!   driver, never fatal.
//! - [`ErrorRecord`] — a captured plugin failure (timeout, panic, exception,
//!   validation failure), shipped to the server as an `ERROR` payload.
//! - [`ConfigError`] — fatal startup configuration problems.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error returned by any [`crate::remote::RemoteClient`] call.
///
/// `status_code == 0` means a local transport failure (connect error, read
/// timeout, or a response body that didn't parse as JSON) rather than an
/// HTTP status from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub status_code: u16,
    pub name: String,
    pub message: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl ApiError {
    pub fn transport(message: impl Into<String>) -> Self {
        ApiError {
            status_code: 0,
            name: "TransportError".to_string(),
            message: Some(message.into()),
            body: None,
        }
    }

    pub fn invalid_json(status_code: u16, body: impl Into<String>) -> Self {
        ApiError {
            status_code,
            name: "InvalidJSON".to_string(),
            message: Some("response body was not valid JSON".to_string()),
            body: Some(serde_json::Value::String(body.into())),
        }
    }

    /// Log at error level so a stuck agent retrying forever is never silent.
    pub fn log(&self) {
        match &self.message {
            Some(message) => {
                tracing::error!(status = self.status_code, name = %self.name, %message, "API error")
            }
            None => tracing::error!(status = self.status_code, name = %self.name, "API error"),
        }
        if let Some(body) = &self.body {
            tracing::debug!(%body, "API error response body");
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {} ({})", self.status_code, self.name, message),
            None => write!(f, "{}: {}", self.status_code, self.name),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::transport(format!("timed out: {err}"))
        } else if err.is_connect() {
            ApiError::transport(format!("could not connect: {err}"))
        } else {
            ApiError::transport(err.to_string())
        }
    }
}

/// A captured plugin failure, transmitted so the server can surface it as a
/// warning. Produced by the isolated plugin runner for timeouts, panics,
/// collection errors, and validation failures alike.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorRecord {
    pub class_name: String,
    pub message: String,
    pub traceback: String,
}

impl ErrorRecord {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorRecord {
            class_name: class_name.into(),
            message: message.into(),
            traceback: String::new(),
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = traceback.into();
        self
    }

    pub fn timeout(after_secs: u64) -> Self {
        ErrorRecord::new(
            "Timeout",
            format!("plugin did not return within {after_secs}s"),
        )
    }

    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "plugin panicked with a non-string payload".to_string()
        };
        ErrorRecord::new("Panic", message)
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)
    }
}

impl std::error::Error for ErrorRecord {}

/// Fatal problems discovered while loading or validating startup
/// configuration. These terminate the process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("missing required setting: {0}")]
    MissingRequired(&'static str),
}
