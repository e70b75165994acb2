// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::local::HandlerRegistry;
use crate::config::consts::{DEFAULT_ROUTER_NAME, DEFAULT_ROUTING_PREFIX};
use crate::config::validation::{validate_graph, GraphLayout};
use crate::config::ExecutorOptions;
use crate::errors::{BuildError, ValidationError};
use crate::graph::{ChildFunction, Graph, StepKind, StepSpec, Topology};
use crate::observability::messages::validation::{GraphValidated, GraphValidationFailed};
use crate::observability::messages::StructuredLog;
use crate::remote::RetryPolicy;
use std::collections::{HashMap, HashSet};

/// Handle to a step added to a [`GraphBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRef(String);

impl StepRef {
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Construction-phase view of a graph.
///
/// All structural checks that can be made per call (duplicate names, duplicate
/// routes, topology conflicts) fail immediately; the whole-graph checks
/// (cycles, reachability, unknown handlers) run in [`GraphBuilder::build`].
///
/// # Example
/// ```
/// use serving_graph::graph::{GraphBuilder, StepSpec, Topology};
///
/// let mut builder = GraphBuilder::new("pipeline");
/// builder.set_topology(Topology::Flow).unwrap();
/// builder.add_step(StepSpec::task("enrich", "augment").to(["router"])).unwrap();
/// builder.add_step(StepSpec::router("router")).unwrap();
/// builder
///     .add_route("router", StepSpec::task("m1", "identity"))
///     .unwrap();
///
/// let graph = builder.build().unwrap();
/// assert_eq!(graph.start(), ["enrich".to_string()]);
/// ```
#[derive(Debug)]
pub struct GraphBuilder {
    name: String,
    topology: Option<Topology>,
    routing_prefix: String,
    steps: Vec<StepSpec>,
    start: Option<Vec<String>>,
    error_handler: Option<String>,
    error_stream: Option<String>,
    children: HashMap<String, ChildFunction>,
    registry: HandlerRegistry,
    options: ExecutorOptions,
    retry: RetryPolicy,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topology: None,
            routing_prefix: DEFAULT_ROUTING_PREFIX.to_string(),
            steps: Vec::new(),
            start: None,
            error_handler: None,
            error_stream: None,
            children: HashMap::new(),
            registry: HandlerRegistry::with_builtins(),
            options: ExecutorOptions::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn topology(&self) -> Option<Topology> {
        self.topology
    }

    /// Fix the topology of the graph.
    ///
    /// Setting the same topology again is a no-op. Switching is only allowed
    /// while the graph has no steps. Choosing `Router` creates the root router.
    pub fn set_topology(&mut self, topology: Topology) -> Result<&mut Self, BuildError> {
        match self.topology {
            Some(current) if current == topology => return Ok(self),
            Some(current) if !self.steps.is_empty() => {
                return Err(BuildError::TopologyConflict {
                    current,
                    requested: topology,
                })
            }
            _ => {}
        }

        self.topology = Some(topology);
        if topology == Topology::Router {
            self.steps.push(StepSpec::router(DEFAULT_ROUTER_NAME));
        }
        Ok(self)
    }

    /// Add a step; the first step of an untyped graph makes it a flow.
    ///
    /// Router graphs take steps too, but only as detached error targets: the
    /// error handler, the error stream and whatever consumes it. Requests
    /// only ever reach their root router.
    pub fn add_step(&mut self, spec: StepSpec) -> Result<StepRef, BuildError> {
        let topology = *self.topology.get_or_insert(Topology::Flow);
        if topology == Topology::Router && matches!(spec.kind, StepKind::Router(_)) {
            return Err(BuildError::StepNotAllowed {
                step: spec.name,
                topology,
            });
        }
        if self.steps.iter().any(|s| s.name == spec.name) {
            return Err(BuildError::DuplicateStep(spec.name));
        }

        let name = spec.name.clone();
        let mut spec = spec;
        if let StepKind::Router(router) = &mut spec.kind {
            let routes = std::mem::take(&mut router.routes);
            self.steps.push(spec);
            for route in routes {
                self.add_route(&name, route)?;
            }
        } else {
            self.steps.push(spec);
        }
        Ok(StepRef(name))
    }

    /// Add an edge between two existing steps.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<&mut Self, BuildError> {
        if !self.steps.iter().any(|s| s.name == to) {
            return Err(BuildError::UnknownStep(to.to_string()));
        }
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.name == from)
            .ok_or_else(|| BuildError::UnknownStep(from.to_string()))?;
        if !step.to.iter().any(|s| s == to) {
            step.to.push(to.to_string());
        }
        Ok(self)
    }

    /// Register `route` under the router step named `router`.
    pub fn add_route(&mut self, router: &str, route: StepSpec) -> Result<&mut Self, BuildError> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.name == router)
            .ok_or_else(|| BuildError::UnknownRouter(router.to_string()))?;
        let StepKind::Router(spec) = &mut step.kind else {
            return Err(BuildError::UnknownRouter(router.to_string()));
        };
        if spec.route(&route.name).is_some() {
            return Err(BuildError::DuplicateRoute {
                router: router.to_string(),
                route: route.name,
            });
        }
        spec.routes.push(route);
        Ok(self)
    }

    /// Attach `step` to the synthetic start node.
    pub fn start_with(&mut self, step: impl Into<String>) -> &mut Self {
        let step = step.into();
        let start = self.start.get_or_insert_with(Vec::new);
        if !start.contains(&step) {
            start.push(step);
        }
        self
    }

    /// Step receiving failed events together with their error detail.
    pub fn error_handler(&mut self, step: impl Into<String>) -> &mut Self {
        self.error_handler = Some(step.into());
        self
    }

    /// Queue step failed events are published to.
    pub fn error_stream(&mut self, queue: impl Into<String>) -> &mut Self {
        self.error_stream = Some(queue.into());
        self
    }

    pub fn add_child_function(&mut self, name: impl Into<String>, child: ChildFunction) -> &mut Self {
        self.children.insert(name.into(), child);
        self
    }

    pub fn routing_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.routing_prefix = prefix.into();
        self
    }

    pub fn with_registry(&mut self, registry: HandlerRegistry) -> &mut Self {
        self.registry = registry;
        self
    }

    pub fn executor_options(&mut self, options: ExecutorOptions) -> &mut Self {
        self.options = options;
        self
    }

    pub fn retry(&mut self, retry: RetryPolicy) -> &mut Self {
        self.retry = retry;
        self
    }

    /// Validate and freeze the graph.
    pub fn build(mut self) -> Result<Graph, BuildError> {
        let topology = self.topology.unwrap_or(Topology::Flow);

        let mut errors = self.resolve_after_edges();
        let start = self.resolve_start(topology);

        let layout = GraphLayout {
            steps: &self.steps,
            start: &start,
            error_handler: self.error_handler.as_deref(),
            error_stream: self.error_stream.as_deref(),
            children: &self.children,
            registry: &self.registry,
        };
        if let Err(found) = validate_graph(&layout) {
            errors.extend(found);
        }

        if !errors.is_empty() {
            GraphValidationFailed {
                graph: &self.name,
                errors: &errors,
            }
            .log();
            return Err(BuildError::Validation(errors));
        }

        GraphValidated {
            graph: &self.name,
            topology: topology.as_str(),
            step_count: self.steps.len(),
        }
        .log();

        let index = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        Ok(Graph {
            name: self.name,
            topology,
            routing_prefix: self.routing_prefix,
            steps: self.steps,
            index,
            start,
            error_handler: self.error_handler,
            error_stream: self.error_stream,
            children: self.children,
            registry: self.registry,
            options: self.options,
            retry: self.retry,
        })
    }

    /// Turn `after` declarations into successor edges on the predecessors.
    fn resolve_after_edges(&mut self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let pending: Vec<(String, Vec<String>)> = self
            .steps
            .iter_mut()
            .filter(|s| !s.after.is_empty())
            .map(|s| (s.name.clone(), std::mem::take(&mut s.after)))
            .collect();

        for (step, predecessors) in pending {
            for predecessor in predecessors {
                match self.steps.iter_mut().find(|s| s.name == predecessor) {
                    Some(p) if !p.to.contains(&step) => p.to.push(step.clone()),
                    Some(_) => {}
                    None => errors.push(ValidationError::UnresolvedPredecessor {
                        step: step.clone(),
                        missing_predecessor: predecessor,
                    }),
                }
            }
        }
        errors
    }

    /// Explicit start list, or every step nothing points at.
    fn resolve_start(&self, topology: Topology) -> Vec<String> {
        if topology == Topology::Router {
            return vec![DEFAULT_ROUTER_NAME.to_string()];
        }
        if let Some(start) = &self.start {
            return start.clone();
        }

        let targets: HashSet<&str> = self
            .steps
            .iter()
            .flat_map(|s| s.to.iter().map(String::as_str))
            .collect();
        self.steps
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| !targets.contains(name))
            .filter(|name| Some(*name) != self.error_handler.as_deref())
            .filter(|name| Some(*name) != self.error_stream.as_deref())
            .map(str::to_string)
            .collect()
    }
}
