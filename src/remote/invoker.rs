// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::RetryPolicy;
use crate::config::consts::{CORRELATION_ID_HEADER, DEFAULT_REMOTE_TIMEOUT_MS};
use crate::errors::{RemoteError, StepError};
use crate::event::Event;
use crate::graph::RemoteSpec;
use crate::observability::messages::remote::{RemoteCallFailed, RemoteRetryScheduled};
use crate::observability::messages::StructuredLog;

/// Where and how a remote step sends its event.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTarget {
    pub url: String,
    /// Forced HTTP method; otherwise POST with a body, GET without
    pub method: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl RemoteTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: BTreeMap::new(),
            timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
        }
    }

    /// Target for a remote step, with `url` resolved by the caller when the
    /// step names a sibling function instead.
    pub fn from_spec(spec: &RemoteSpec, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: spec.method.clone(),
            headers: spec.headers.clone(),
            timeout: Duration::from_millis(spec.timeout_ms.unwrap_or(DEFAULT_REMOTE_TIMEOUT_MS)),
        }
    }

    fn method_for(&self, body: &Value) -> Result<Method, RemoteError> {
        match &self.method {
            Some(method) => Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| RemoteError::InvalidTarget(format!("bad method '{}'", method))),
            None if body.is_null() => Ok(Method::GET),
            None => Ok(Method::POST),
        }
    }
}

/// One attempt at delivering an event to a remote endpoint.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, target: &RemoteTarget, event: &Event) -> Result<Value, RemoteError>;
}

/// reqwest-backed invoker. The client is shared by every remote step.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: Client,
}

impl HttpInvoker {
    pub fn new() -> Result<Self, RemoteError> {
        let client = Client::builder()
            .build()
            .map_err(|e| RemoteError::InvalidTarget(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn map_http_error(target: &RemoteTarget, error: reqwest::Error) -> RemoteError {
        if error.is_timeout() {
            RemoteError::Timeout {
                url: target.url.clone(),
                timeout: target.timeout,
            }
        } else if error.is_connect() || error.is_request() {
            RemoteError::Unavailable {
                url: target.url.clone(),
                message: error.to_string(),
            }
        } else if error.is_builder() {
            RemoteError::InvalidTarget(format!("{}: {}", target.url, error))
        } else {
            RemoteError::Unavailable {
                url: target.url.clone(),
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, target: &RemoteTarget, event: &Event) -> Result<Value, RemoteError> {
        let method = target.method_for(&event.body)?;
        let mut request = self
            .client
            .request(method, &target.url)
            .timeout(target.timeout)
            .header(CORRELATION_ID_HEADER, &event.id);
        for (name, value) in &target.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !event.body.is_null() {
            request = request.json(&event.body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_http_error(target, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Self::map_http_error(target, e))?;

        if !status.is_success() {
            return Err(RemoteError::Response {
                url: target.url.clone(),
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Call `target`, retrying retryable failures under `policy`.
///
/// Backoff sleeps end early when `cancel` fires.
pub async fn invoke_with_retry(
    invoker: &dyn Invoker,
    target: &RemoteTarget,
    event: &Event,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Value, StepError> {
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(StepError::Cancelled),
            result = invoker.invoke(target, event) => result,
        };
        let error = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !error.is_retryable() || attempt >= attempts {
            RemoteCallFailed {
                url: &target.url,
                attempts: attempt,
                error: &error,
            }
            .log();
            return Err(StepError::Remote(error));
        }

        let delay = policy.delay_for(attempt);
        RemoteRetryScheduled {
            url: &target.url,
            attempt,
            delay,
            error: &error,
        }
        .log();
        tokio::select! {
            _ = cancel.cancelled() => return Err(StepError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
