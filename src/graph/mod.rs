// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph model: declarative steps, the two topologies, the builder used during
//! the construction phase and the frozen [`Graph`] served afterwards.

mod builder;
mod step;
mod topology;

pub use builder::{GraphBuilder, StepRef};
pub use step::{
    ChildFunctionSpec, QueueSpec, QueueTransport, RemoteSpec, RouterSpec, StepKind, StepSpec,
    TaskSpec,
};
pub use topology::{parse_route_path, RoutePath, Topology};

use crate::backends::local::HandlerRegistry;
use crate::config::ExecutorOptions;
use crate::remote::RetryPolicy;
use std::collections::HashMap;
use std::sync::Arc;

/// Another graph reachable from this one, by url when deployed or
/// in-process when all functions run locally.
#[derive(Debug, Clone, Default)]
pub struct ChildFunction {
    pub url: Option<String>,
    pub graph: Option<Arc<Graph>>,
}

impl ChildFunction {
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            graph: None,
        }
    }

    pub fn local(graph: Graph) -> Self {
        Self {
            url: None,
            graph: Some(Arc::new(graph)),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// An immutable, validated serving graph.
///
/// Produced by [`GraphBuilder::build`]; there is no way to add steps or change
/// the topology afterwards.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) name: String,
    pub(crate) topology: Topology,
    pub(crate) routing_prefix: String,
    pub(crate) steps: Vec<StepSpec>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) start: Vec<String>,
    pub(crate) error_handler: Option<String>,
    pub(crate) error_stream: Option<String>,
    pub(crate) children: HashMap<String, ChildFunction>,
    pub(crate) registry: HandlerRegistry,
    pub(crate) options: ExecutorOptions,
    pub(crate) retry: RetryPolicy,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn routing_prefix(&self) -> &str {
        &self.routing_prefix
    }

    /// Steps in declaration order.
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.index.get(name).map(|&i| &self.steps[i])
    }

    /// Successors of the synthetic start node.
    pub fn start(&self) -> &[String] {
        &self.start
    }

    pub fn error_handler(&self) -> Option<&str> {
        self.error_handler.as_deref()
    }

    pub fn error_stream(&self) -> Option<&str> {
        self.error_stream.as_deref()
    }

    pub fn children(&self) -> &HashMap<String, ChildFunction> {
        &self.children
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Retry policy of `step`, falling back to the graph default.
    pub fn retry_for(&self, step: &StepSpec) -> RetryPolicy {
        step.retry.clone().unwrap_or_else(|| self.retry.clone())
    }
}
