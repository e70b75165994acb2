// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-request execution errors and their mapping to caller-visible status codes.

use crate::errors::StepError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("route '{route}' not found")]
    RouteNotFound { route: String, available: Vec<String> },

    #[error("bad request to step '{step}': {message}")]
    BadRequest { step: String, message: String },

    #[error("step '{step}' failed to initialize: {source}")]
    StepInit {
        step: String,
        #[source]
        source: StepError,
    },

    #[error("step '{step}' failed: {message}")]
    StepHandler { step: String, message: String },

    #[error("publish to queue '{queue}' failed: {message}")]
    QueuePublish { queue: String, message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Map a failure of `step` into the request-level error it surfaces as.
    ///
    /// Remote errors reaching this point have already exhausted their retry
    /// policy and therefore surface as handler failures.
    pub fn from_step(step: &str, error: StepError) -> Self {
        match error {
            StepError::RouteNotFound { route, available } => {
                ExecutionError::RouteNotFound { route, available }
            }
            StepError::BadRequest(message) | StepError::Unsupported(message) => {
                ExecutionError::BadRequest {
                    step: step.to_string(),
                    message,
                }
            }
            StepError::Cancelled => ExecutionError::Cancelled,
            StepError::Queue(e) => ExecutionError::QueuePublish {
                queue: step.to_string(),
                message: e.to_string(),
            },
            e if e.is_init() => ExecutionError::StepInit {
                step: step.to_string(),
                source: e,
            },
            e => ExecutionError::StepHandler {
                step: step.to_string(),
                message: e.to_string(),
            },
        }
    }

    /// HTTP status code a caller sees for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ExecutionError::RouteNotFound { .. } => 404,
            ExecutionError::BadRequest { .. } => 400,
            ExecutionError::StepInit { .. }
            | ExecutionError::StepHandler { .. }
            | ExecutionError::QueuePublish { .. }
            | ExecutionError::Internal(_) => 500,
            ExecutionError::Cancelled => 503,
            ExecutionError::Timeout(_) => 504,
        }
    }

    /// Short machine-readable kind used in structured error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::RouteNotFound { .. } => "RouteNotFoundError",
            ExecutionError::BadRequest { .. } => "BadRequestError",
            ExecutionError::StepInit { source, .. } => match source {
                StepError::ModelLoad { .. } => "ModelLoadError",
                _ => "StepInitError",
            },
            ExecutionError::StepHandler { .. } => "StepHandlerError",
            ExecutionError::QueuePublish { .. } => "QueuePublishError",
            ExecutionError::Cancelled => "CancelledError",
            ExecutionError::Timeout(_) => "TimeoutError",
            ExecutionError::Internal(_) => "InternalError",
        }
    }

    /// The step the failure originated in, when known.
    pub fn step(&self) -> Option<&str> {
        match self {
            ExecutionError::BadRequest { step, .. }
            | ExecutionError::StepInit { step, .. }
            | ExecutionError::StepHandler { step, .. } => Some(step),
            ExecutionError::QueuePublish { queue, .. } => Some(queue),
            _ => None,
        }
    }
}
