// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for outbound remote calls.

use crate::errors::RemoteError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A remote call failed with a retryable error and will be tried again.
///
/// # Log Level
/// `warn!` - Recoverable problem
///
/// # Example
/// ```
/// use serving_graph::errors::RemoteError;
/// use serving_graph::observability::messages::remote::RemoteRetryScheduled;
/// use std::time::Duration;
///
/// let error = RemoteError::Unavailable {
///     url: "http://scorer:8080".to_string(),
///     message: "connection refused".to_string(),
/// };
/// let msg = RemoteRetryScheduled {
///     url: "http://scorer:8080",
///     attempt: 1,
///     delay: Duration::from_millis(100),
///     error: &error,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct RemoteRetryScheduled<'a> {
    pub url: &'a str,
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'a RemoteError,
}

impl Display for RemoteRetryScheduled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Call to {} failed on attempt {}, retrying in {:?}: {}",
            self.url, self.attempt, self.delay, self.error
        )
    }
}

impl StructuredLog for RemoteRetryScheduled<'_> {
    fn log(&self) {
        tracing::warn!(
            url = self.url,
            attempt = self.attempt,
            delay_ms = self.delay.as_millis() as u64,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("remote_retry", span_name = name, url = self.url)
    }
}

/// A remote call failed for good.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct RemoteCallFailed<'a> {
    pub url: &'a str,
    pub attempts: u32,
    pub error: &'a RemoteError,
}

impl Display for RemoteCallFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Call to {} failed after {} attempt(s): {}",
            self.url, self.attempts, self.error
        )
    }
}

impl StructuredLog for RemoteCallFailed<'_> {
    fn log(&self) {
        tracing::error!(
            url = self.url,
            attempts = self.attempts,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("remote_call_failed", span_name = name, url = self.url)
    }
}

/// One delivery of a fire-and-forget call failed. The record is redelivered
/// or, once the retry policy runs out, routed to the error targets.
///
/// # Log Level
/// `warn!` - Recoverable problem
pub struct DetachedCallFailed<'a> {
    pub url: &'a str,
    pub id: &'a str,
    pub error: &'a RemoteError,
}

impl Display for DetachedCallFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fire-and-forget call to {} for event {} failed: {}",
            self.url, self.id, self.error
        )
    }
}

impl StructuredLog for DetachedCallFailed<'_> {
    fn log(&self) {
        tracing::warn!(url = self.url, id = self.id, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("detached_call_failed", span_name = name, url = self.url)
    }
}
