// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use thiserror::Error;

/// Structural problems found while finalizing a graph.
///
/// Every variant names the offending step so the operator can find it in the
/// graph definition. A graph with any of these refuses to start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A circular edge chain was detected between steps
    #[error("Cyclic dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// The cycle path, first and last entries are the same step
        cycle: Vec<String>,
    },

    /// A step points at a successor that was never declared
    #[error("Step '{step}' routes to '{missing_successor}' which does not exist")]
    UnresolvedSuccessor {
        step: String,
        missing_successor: String,
    },

    /// A step lists a predecessor in `after` that was never declared
    #[error("Step '{step}' comes after '{missing_predecessor}' which does not exist")]
    UnresolvedPredecessor {
        step: String,
        missing_predecessor: String,
    },

    /// Route steps serve a request inline, queues cannot stand in for them
    #[error("Route '{route}' on router '{router}' is invalid: {reason}")]
    InvalidRoute {
        router: String,
        route: String,
        reason: String,
    },

    /// Two steps share a name
    #[error("Duplicate step name: '{step}'")]
    DuplicateStepName { step: String },

    /// A flow step cannot be reached from the start node
    #[error("Step '{step}' is not reachable from the start of the flow")]
    UnreachableStep { step: String },

    /// A flow graph with steps but nothing attached to start
    #[error("Flow graph has no start step")]
    MissingStart,

    /// Task handler or model class not present in the handler registry
    #[error("Step '{step}' uses unknown handler '{handler}'")]
    UnknownHandler { step: String, handler: String },

    /// A remote step has neither a url nor a sibling function
    #[error("Remote step '{step}' needs a url or a function name")]
    MissingRemoteTarget { step: String },

    /// A step references a child function that was not registered
    #[error("Step '{step}' references unknown child function '{function}'")]
    UnknownChildFunction { step: String, function: String },

    /// Responders must answer inside the request context, never behind a queue
    #[error("Responder step '{step}' is downstream of queue '{queue}'")]
    ResponderBehindQueue { step: String, queue: String },

    /// error_handler or error_stream names something unusable
    #[error("Error target '{step}' is invalid: {reason}")]
    InvalidErrorTarget { step: String, reason: String },

    /// A file-backed queue was declared without a path
    #[error("Queue step '{step}' uses file transport but has no path")]
    MissingQueuePath { step: String },
}

/// Errors raised while loading a graph definition from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse TOML config '{path}': {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unsupported config extension for '{0}' (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(PathBuf),

    #[error("child function '{name}' has neither url nor config")]
    EmptyChildFunction { name: String },

    #[error(transparent)]
    Build(#[from] crate::errors::BuildError),
}
