// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The envelope every step consumes and produces, and the response handed
//! back to callers.

use crate::errors::ExecutionError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A request travelling through a graph.
///
/// The `id` is the correlation id. It is generated once per external request
/// and carried unchanged across every hop, including queue and remote
/// boundaries. Steps replace the body; the executor keeps the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub body: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Routing metadata set when a router resolves a model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Action segment following the model name (`infer`, `predict`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl Event {
    /// New external request with a fresh correlation id.
    pub fn new(path: impl Into<String>, body: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method: default_method(),
            path: path.into(),
            body,
            headers: BTreeMap::new(),
            model: None,
            action: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_uppercase();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Same request, new body.
    pub fn with_body(&self, body: Value) -> Self {
        Self {
            body,
            ..self.clone()
        }
    }

    /// Non-empty path segments, leading and trailing slashes ignored.
    pub fn segments(&self) -> Vec<&str> {
        self.path
            .split('?')
            .next()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Serialize for a queue or remote hop.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// What a caller receives for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: String,
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn ok(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            status: 200,
            body,
        }
    }

    /// Structured error body: `{"error": {"kind", "message", "step", "id"}}`.
    pub fn from_error(id: impl Into<String>, error: &ExecutionError) -> Self {
        let id = id.into();
        let mut detail = json!({
            "kind": error.kind(),
            "message": error.to_string(),
            "id": id,
        });
        if let Some(step) = error.step() {
            detail["step"] = json!(step);
        }
        if let ExecutionError::RouteNotFound { available, .. } = error {
            detail["available"] = json!(available);
        }
        Self {
            id,
            status: error.status_code(),
            body: json!({ "error": detail }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
