// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for step init and per-event failures.

use crate::errors::StepError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Step init is about to run.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct StepInitStarted<'a> {
    pub step: &'a str,
    pub kind: &'a str,
}

impl Display for StepInitStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Initializing {} step '{}'", self.kind, self.step)
    }
}

impl StructuredLog for StepInitStarted<'_> {
    fn log(&self) {
        tracing::debug!(step = self.step, kind = self.kind, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "step_init",
            span_name = name,
            step = self.step,
            kind = self.kind,
        )
    }
}

/// Step init finished and its state is retained.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use serving_graph::observability::messages::step::StepInitCompleted;
/// use std::time::Duration;
///
/// let msg = StepInitCompleted {
///     step: "model1",
///     duration: Duration::from_millis(40),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct StepInitCompleted<'a> {
    pub step: &'a str,
    pub duration: Duration,
}

impl Display for StepInitCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Step '{}' initialized in {:?}", self.step, self.duration)
    }
}

impl StructuredLog for StepInitCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            step = self.step,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("step_init_completed", span_name = name, step = self.step)
    }
}

/// Step init failed. It is attempted again on the next event.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct StepInitFailed<'a> {
    pub step: &'a str,
    pub error: &'a StepError,
}

impl Display for StepInitFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Step '{}' failed to initialize: {}", self.step, self.error)
    }
}

impl StructuredLog for StepInitFailed<'_> {
    fn log(&self) {
        tracing::error!(step = self.step, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("step_init_failed", span_name = name, step = self.step)
    }
}

/// A step failed while handling one event.
///
/// # Log Level
/// `warn!` - The failure is surfaced to the caller or the error route
pub struct StepFailed<'a> {
    pub step: &'a str,
    pub id: &'a str,
    pub error: &'a StepError,
}

impl Display for StepFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Step '{}' failed for event {}: {}",
            self.step, self.id, self.error
        )
    }
}

impl StructuredLog for StepFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            step = self.step,
            id = self.id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "step_failed",
            span_name = name,
            step = self.step,
            id = self.id,
        )
    }
}
