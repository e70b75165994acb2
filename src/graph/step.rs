// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Declarative step definitions.
//!
//! A [`StepSpec`] is pure structure: a name, one of the five step kinds, the
//! ordered successor names and a few execution flags. Nothing here runs a
//! handler; instances are created by the engine once the graph is frozen.

use crate::config::consts::DEFAULT_QUEUE_PARTITIONS;
use crate::remote::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One node of a serving graph.
///
/// # Example
/// ```yaml
/// name: enrich
/// kind: task
/// handler: augment
/// options:
///   source: web
/// to: [router]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    /// Successors in declaration order
    #[serde(default)]
    pub to: Vec<String>,
    /// Predecessors, an alternative way of declaring edges
    #[serde(default, skip_serializing)]
    pub after: Vec<String>,
    /// Output of this step becomes the response of the request
    #[serde(default)]
    pub responder: bool,
    /// Handler output replaces the whole event instead of only its body
    #[serde(default)]
    pub full_event: bool,
    /// Run `handle` calls one at a time under a per-step lock
    #[serde(default)]
    pub serialized: bool,
    /// Overrides the graph retry policy for remote calls and queue hops
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

/// The closed set of step kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    Task(TaskSpec),
    Router(RouterSpec),
    Queue(QueueSpec),
    Remote(RemoteSpec),
    ChildFunction(ChildFunctionSpec),
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Task(_) => "task",
            StepKind::Router(_) => "router",
            StepKind::Queue(_) => "queue",
            StepKind::Remote(_) => "remote",
            StepKind::ChildFunction(_) => "child_function",
        }
    }
}

/// A user handler or a model server.
///
/// When `model_path` is set, `handler` names a registered model class and the
/// step serves that model; otherwise `handler` names a registered handler.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    pub handler: String,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// Routes keyed by the model name in the request path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouterSpec {
    #[serde(default)]
    pub routes: Vec<StepSpec>,
}

impl RouterSpec {
    pub fn route(&self, name: &str) -> Option<&StepSpec> {
        self.routes.iter().find(|r| r.name == name)
    }

    pub fn route_names(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueTransport {
    #[default]
    Memory,
    File,
}

/// A logical edge with at-least-once delivery to its successors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSpec {
    #[serde(default)]
    pub transport: QueueTransport,
    /// Directory of the file-backed log
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    /// Body field used as partition key, the correlation id when unset
    #[serde(default)]
    pub partition_key: Option<String>,
}

fn default_partitions() -> usize {
    DEFAULT_QUEUE_PARTITIONS
}

impl Default for QueueSpec {
    fn default() -> Self {
        Self {
            transport: QueueTransport::Memory,
            path: None,
            partitions: DEFAULT_QUEUE_PARTITIONS,
            partition_key: None,
        }
    }
}

/// A call into another graph served over HTTP.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteSpec {
    #[serde(default)]
    pub url: Option<String>,
    /// Sibling function resolved in-process when all functions run locally
    #[serde(default)]
    pub function: Option<String>,
    /// Defaults to POST with a body, GET without
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Hand the call to a background worker and continue immediately
    #[serde(default)]
    pub fire_and_forget: bool,
}

/// Delegates to an independently deployed graph declared in `child_functions`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChildFunctionSpec {
    pub function: String,
}

impl StepSpec {
    fn with_kind(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            to: Vec::new(),
            after: Vec::new(),
            responder: false,
            full_event: false,
            serialized: false,
            retry: None,
        }
    }

    pub fn task(name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            StepKind::Task(TaskSpec {
                handler: handler.into(),
                ..TaskSpec::default()
            }),
        )
    }

    /// A task serving `model_path` through the model class `class`.
    pub fn model(
        name: impl Into<String>,
        class: impl Into<String>,
        model_path: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            name,
            StepKind::Task(TaskSpec {
                handler: class.into(),
                model_path: Some(model_path.into()),
                options: Map::new(),
            }),
        )
    }

    pub fn router(name: impl Into<String>) -> Self {
        Self::with_kind(name, StepKind::Router(RouterSpec::default()))
    }

    pub fn queue(name: impl Into<String>) -> Self {
        Self::with_kind(name, StepKind::Queue(QueueSpec::default()))
    }

    pub fn file_queue(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::with_kind(
            name,
            StepKind::Queue(QueueSpec {
                transport: QueueTransport::File,
                path: Some(path.into()),
                ..QueueSpec::default()
            }),
        )
    }

    pub fn remote(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            StepKind::Remote(RemoteSpec {
                url: Some(url.into()),
                ..RemoteSpec::default()
            }),
        )
    }

    pub fn child_function(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            StepKind::ChildFunction(ChildFunctionSpec {
                function: function.into(),
            }),
        )
    }

    /// Append successors.
    pub fn to<I, S>(mut self, successors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to.extend(successors.into_iter().map(Into::into));
        self
    }

    /// Declare predecessors; each gets this step appended to its successors.
    pub fn after<I, S>(mut self, predecessors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(predecessors.into_iter().map(Into::into));
        self
    }

    pub fn responder(mut self) -> Self {
        self.responder = true;
        self
    }

    pub fn full_event(mut self) -> Self {
        self.full_event = true;
        self
    }

    pub fn serialized(mut self) -> Self {
        self.serialized = true;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set a task option; ignored for non-task kinds.
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        if let StepKind::Task(task) = &mut self.kind {
            task.options.insert(key.into(), value);
        }
        self
    }

    /// Mutate the remote spec in place; ignored for non-remote kinds.
    pub fn configure_remote(mut self, f: impl FnOnce(&mut RemoteSpec)) -> Self {
        if let StepKind::Remote(remote) = &mut self.kind {
            f(remote);
        }
        self
    }

    pub fn is_queue(&self) -> bool {
        matches!(self.kind, StepKind::Queue(_))
    }
}
