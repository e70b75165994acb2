// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for graph build, validation and config loading.

use crate::errors::ValidationError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::path::Path;
use tracing::Span;

/// A graph passed validation and was frozen.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use serving_graph::observability::messages::validation::GraphValidated;
///
/// let msg = GraphValidated {
///     graph: "fraud",
///     topology: "flow",
///     step_count: 4,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct GraphValidated<'a> {
    pub graph: &'a str,
    pub topology: &'a str,
    pub step_count: usize,
}

impl Display for GraphValidated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Graph '{}' validated: topology={}, steps={}",
            self.graph, self.topology, self.step_count
        )
    }
}

impl StructuredLog for GraphValidated<'_> {
    fn log(&self) {
        tracing::info!(
            graph = self.graph,
            topology = self.topology,
            step_count = self.step_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "graph_validated",
            span_name = name,
            graph = self.graph,
            topology = self.topology,
        )
    }
}

/// A graph failed validation. All problems are reported together.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct GraphValidationFailed<'a> {
    pub graph: &'a str,
    pub errors: &'a [ValidationError],
}

impl Display for GraphValidationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Graph '{}' failed validation with {} error(s)",
            self.graph,
            self.errors.len()
        )?;
        for error in self.errors {
            write!(f, "; {}", error)?;
        }
        Ok(())
    }
}

impl StructuredLog for GraphValidationFailed<'_> {
    fn log(&self) {
        tracing::error!(
            graph = self.graph,
            error_count = self.errors.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "graph_validation_failed",
            span_name = name,
            graph = self.graph,
            error_count = self.errors.len(),
        )
    }
}

/// A graph configuration file was parsed.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ConfigLoaded<'a> {
    pub path: &'a Path,
    pub graph: &'a str,
    pub step_count: usize,
}

impl Display for ConfigLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded graph '{}' from {}: {} step(s)",
            self.graph,
            self.path.display(),
            self.step_count
        )
    }
}

impl StructuredLog for ConfigLoaded<'_> {
    fn log(&self) {
        tracing::info!(
            path = %self.path.display(),
            graph = self.graph,
            step_count = self.step_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "config_loaded",
            span_name = name,
            path = %self.path.display(),
            graph = self.graph,
        )
    }
}

/// A child function config was loaded to run in-process.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct ChildFunctionLoaded<'a> {
    pub function: &'a str,
    pub path: &'a Path,
}

impl Display for ChildFunctionLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Child function '{}' loaded from {}",
            self.function,
            self.path.display()
        )
    }
}

impl StructuredLog for ChildFunctionLoaded<'_> {
    fn log(&self) {
        tracing::debug!(
            function = self.function,
            path = %self.path.display(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "child_function_loaded",
            span_name = name,
            function = self.function,
        )
    }
}
