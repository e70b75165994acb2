// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for graph lifecycle and request handling.
//!
//! This module contains message types for logging events related to:
//! * Graph server start and shutdown
//! * Request completion and failure
//! * Failure routing to the error handler and error stream

use crate::errors::ExecutionError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Graph server started and is accepting events.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use serving_graph::observability::messages::engine::GraphStarted;
///
/// let msg = GraphStarted {
///     graph: "fraud",
///     topology: "flow",
///     step_count: 5,
///     mode: "serving",
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct GraphStarted<'a> {
    pub graph: &'a str,
    pub topology: &'a str,
    pub step_count: usize,
    pub mode: &'a str,
}

impl Display for GraphStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Graph '{}' started in {} mode: topology={}, steps={}",
            self.graph, self.mode, self.topology, self.step_count
        )
    }
}

impl StructuredLog for GraphStarted<'_> {
    fn log(&self) {
        tracing::info!(
            graph = self.graph,
            topology = self.topology,
            step_count = self.step_count,
            mode = self.mode,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "graph",
            span_name = name,
            graph = self.graph,
            topology = self.topology,
            mode = self.mode,
        )
    }
}

/// Graph server stopped its background consumers.
///
/// # Log Level
/// `info!` - Important operational event
pub struct GraphStopped<'a> {
    pub graph: &'a str,
}

impl Display for GraphStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Graph '{}' stopped", self.graph)
    }
}

impl StructuredLog for GraphStopped<'_> {
    fn log(&self) {
        tracing::info!(graph = self.graph, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("graph_stopped", span_name = name, graph = self.graph)
    }
}

/// A request entered the graph.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct RequestReceived<'a> {
    pub graph: &'a str,
    pub id: &'a str,
    pub method: &'a str,
    pub path: &'a str,
}

impl Display for RequestReceived<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Request {} received by graph '{}': {} {}",
            self.id, self.graph, self.method, self.path
        )
    }
}

impl StructuredLog for RequestReceived<'_> {
    fn log(&self) {
        tracing::debug!(
            graph = self.graph,
            id = self.id,
            method = self.method,
            path = self.path,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "request",
            span_name = name,
            graph = self.graph,
            id = self.id,
        )
    }
}

/// A request produced a response.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct RequestCompleted<'a> {
    pub graph: &'a str,
    pub id: &'a str,
    pub status: u16,
    pub duration: Duration,
}

impl Display for RequestCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Request {} completed by graph '{}': status={} in {:?}",
            self.id, self.graph, self.status, self.duration
        )
    }
}

impl StructuredLog for RequestCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            graph = self.graph,
            id = self.id,
            status = self.status,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "request_completed",
            span_name = name,
            graph = self.graph,
            id = self.id,
            status = self.status,
        )
    }
}

/// A request failed.
///
/// # Log Level
/// `warn!` for client errors, `error!` otherwise
pub struct RequestFailed<'a> {
    pub graph: &'a str,
    pub id: &'a str,
    pub error: &'a ExecutionError,
}

impl Display for RequestFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Request {} failed in graph '{}': {}",
            self.id, self.graph, self.error
        )
    }
}

impl StructuredLog for RequestFailed<'_> {
    fn log(&self) {
        let step = self.error.step().unwrap_or("");
        if self.error.status_code() < 500 {
            tracing::warn!(
                graph = self.graph,
                id = self.id,
                kind = self.error.kind(),
                step = step,
                "{}", self
            );
        } else {
            tracing::error!(
                graph = self.graph,
                id = self.id,
                kind = self.error.kind(),
                step = step,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "request_failed",
            span_name = name,
            graph = self.graph,
            id = self.id,
            kind = self.error.kind(),
        )
    }
}

/// A failure was handed to the error handler step or the error stream.
///
/// # Log Level
/// `info!` - Important operational event
pub struct FailureRouted<'a> {
    pub graph: &'a str,
    pub id: &'a str,
    pub failed_step: &'a str,
    pub target: &'a str,
}

impl Display for FailureRouted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failure of step '{}' for request {} routed to '{}'",
            self.failed_step, self.id, self.target
        )
    }
}

impl StructuredLog for FailureRouted<'_> {
    fn log(&self) {
        tracing::info!(
            graph = self.graph,
            id = self.id,
            failed_step = self.failed_step,
            target = self.target,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "failure_routed",
            span_name = name,
            graph = self.graph,
            target = self.target,
        )
    }
}
