// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors produced inside a single step: handler failures, init failures and
//! the transport errors of queue and remote steps.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("init failed: {0}")]
    Init(String),

    #[error("failed to load model '{path}': {message}")]
    ModelLoad { path: String, message: String },

    #[error("{0}")]
    Handler(String),

    /// The event itself is malformed for this step
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("{0} is not supported")]
    Unsupported(String),

    /// A nested router could not find the requested route
    #[error("route '{route}' not found")]
    RouteNotFound { route: String, available: Vec<String> },

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("cancelled")]
    Cancelled,
}

impl StepError {
    /// Init and model load failures keep a step from serving at all.
    pub fn is_init(&self) -> bool {
        matches!(self, StepError::Init(_) | StepError::ModelLoad { .. })
    }
}

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Connection-level failure, nothing reached the remote graph
    #[error("remote '{url}' unavailable: {message}")]
    Unavailable { url: String, message: String },

    #[error("remote '{url}' timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The remote answered with a non-2xx status
    #[error("remote '{url}' responded {status}: {body}")]
    Response {
        url: String,
        status: u16,
        body: String,
    },

    #[error("invalid remote target '{0}'")]
    InvalidTarget(String),
}

impl RemoteError {
    /// Only connection and timeout failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Unavailable { .. } | RemoteError::Timeout { .. }
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("publish to queue '{queue}' failed: {message}")]
    Publish { queue: String, message: String },

    #[error("consume from queue '{queue}' failed: {message}")]
    Consume { queue: String, message: String },

    #[error("unknown delivery {offset} on queue '{queue}'")]
    UnknownDelivery { queue: String, offset: u64 },

    #[error("queue '{0}' is closed")]
    Closed(String),

    #[error("failed to encode event for queue '{queue}': {message}")]
    Codec { queue: String, message: String },
}
