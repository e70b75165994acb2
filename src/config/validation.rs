// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Structural validation of a serving graph before it is frozen.
//!
//! The checks run in a fixed order because later checks need a structurally
//! sound graph:
//!
//! 1. **Uniqueness**: step names and route names are unique
//! 2. **References**: successors, start entries, error targets and child
//!    functions all resolve
//! 3. **Cycle detection**: DFS with a recursion stack, reporting the cycle path
//! 4. **Reachability**: every step is reachable from start or an error target
//! 5. **Step rules**: handlers are registered, remote steps have a target,
//!    responders are not behind a queue
//!
//! Errors are accumulated so a single build reports every problem it can.
//! Cycle and reachability checks are skipped while reference errors exist.

use crate::backends::local::HandlerRegistry;
use crate::errors::ValidationError;
use crate::graph::{ChildFunction, QueueTransport, StepKind, StepSpec};
use std::collections::{HashMap, HashSet, VecDeque};

/// Borrowed view of everything the validator looks at.
pub struct GraphLayout<'a> {
    pub steps: &'a [StepSpec],
    pub start: &'a [String],
    pub error_handler: Option<&'a str>,
    pub error_stream: Option<&'a str>,
    pub children: &'a HashMap<String, ChildFunction>,
    pub registry: &'a HandlerRegistry,
}

/// Validate a graph layout, returning every problem found.
pub fn validate_graph(layout: &GraphLayout) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    errors.extend(validate_unique_names(layout.steps));
    errors.extend(validate_references(layout));

    if errors.is_empty() {
        if let Some(cycle) = find_cycle(layout.steps) {
            errors.push(ValidationError::CyclicDependency { cycle });
        } else {
            errors.extend(validate_reachability(layout));
        }
    }

    errors.extend(validate_step_rules(layout));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_unique_names(steps: &[StepSpec]) -> Vec<ValidationError> {
    let mut seen = HashSet::new();
    steps
        .iter()
        .filter(|step| !seen.insert(step.name.as_str()))
        .map(|step| ValidationError::DuplicateStepName {
            step: step.name.clone(),
        })
        .collect()
}

fn validate_references(layout: &GraphLayout) -> Vec<ValidationError> {
    let names: HashSet<&str> = layout.steps.iter().map(|s| s.name.as_str()).collect();
    let mut errors = Vec::new();

    for step in layout.steps {
        for successor in &step.to {
            if !names.contains(successor.as_str()) {
                errors.push(ValidationError::UnresolvedSuccessor {
                    step: step.name.clone(),
                    missing_successor: successor.clone(),
                });
            }
        }
    }

    for entry in layout.start {
        if !names.contains(entry.as_str()) {
            errors.push(ValidationError::UnresolvedSuccessor {
                step: "start".to_string(),
                missing_successor: entry.clone(),
            });
        }
    }

    if let Some(handler) = layout.error_handler {
        match layout.steps.iter().find(|s| s.name == handler) {
            None => errors.push(ValidationError::InvalidErrorTarget {
                step: handler.to_string(),
                reason: "error handler step does not exist".to_string(),
            }),
            Some(step) if !matches!(step.kind, StepKind::Task(_)) => {
                errors.push(ValidationError::InvalidErrorTarget {
                    step: handler.to_string(),
                    reason: "error handler must be a task".to_string(),
                })
            }
            _ => {}
        }
    }

    if let Some(stream) = layout.error_stream {
        match layout.steps.iter().find(|s| s.name == stream) {
            None => errors.push(ValidationError::InvalidErrorTarget {
                step: stream.to_string(),
                reason: "error stream queue does not exist".to_string(),
            }),
            Some(step) if !step.is_queue() => errors.push(ValidationError::InvalidErrorTarget {
                step: stream.to_string(),
                reason: "error stream must be a queue".to_string(),
            }),
            _ => {}
        }
    }

    errors
}

/// DFS with a recursion stack; returns the first cycle found.
///
/// Nodes are visited in declaration order so the reported cycle is stable.
fn find_cycle(steps: &[StepSpec]) -> Option<Vec<String>> {
    let graph: HashMap<&str, Vec<&str>> = steps
        .iter()
        .map(|s| (s.name.as_str(), s.to.iter().map(String::as_str).collect()))
        .collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for step in steps {
        if !visited.contains(step.name.as_str()) {
            if let Some(cycle) =
                dfs_cycle_detection(&step.name, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(cycle);
            }
        }
    }
    None
}

fn dfs_cycle_detection<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if let Some(cycle) = dfs_cycle_detection(neighbor, graph, visited, rec_stack, path)
                {
                    return Some(cycle);
                }
            } else if rec_stack.contains(neighbor) {
                let cycle_start = path.iter().position(|&x| x == neighbor).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[cycle_start..].iter().map(|s| s.to_string()).collect();
                cycle.push(neighbor.to_string());
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}

/// Every step must be reachable from start. Error targets and whatever
/// consumes the error stream are detached by definition; in router graphs
/// they are the only steps besides the root router.
fn validate_reachability(layout: &GraphLayout) -> Vec<ValidationError> {
    if layout.steps.is_empty() {
        return Vec::new();
    }
    if layout.start.is_empty() {
        return vec![ValidationError::MissingStart];
    }

    let roots = layout
        .start
        .iter()
        .map(String::as_str)
        .chain(layout.error_handler)
        .chain(layout.error_stream);
    let reachable = reachable_from(layout.steps, roots);

    layout
        .steps
        .iter()
        .filter(|s| !reachable.contains(s.name.as_str()))
        .map(|s| ValidationError::UnreachableStep {
            step: s.name.clone(),
        })
        .collect()
}

fn reachable_from<'a>(
    steps: &'a [StepSpec],
    roots: impl Iterator<Item = &'a str>,
) -> HashSet<&'a str> {
    let by_name: HashMap<&str, &StepSpec> = steps.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&str> = roots.collect();

    while let Some(name) = queue.pop_front() {
        if !seen.insert(name) {
            continue;
        }
        if let Some(step) = by_name.get(name) {
            queue.extend(step.to.iter().map(String::as_str));
        }
    }
    seen
}

fn validate_step_rules(layout: &GraphLayout) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for step in layout.steps {
        validate_kind(step, layout, &mut errors);

        if let StepKind::Router(router) = &step.kind {
            let mut seen = HashSet::new();
            for route in &router.routes {
                if !seen.insert(route.name.as_str()) {
                    errors.push(ValidationError::InvalidRoute {
                        router: step.name.clone(),
                        route: route.name.clone(),
                        reason: "duplicate route name".to_string(),
                    });
                }
                if matches!(route.kind, StepKind::Queue(_) | StepKind::Router(_)) {
                    errors.push(ValidationError::InvalidRoute {
                        router: step.name.clone(),
                        route: route.name.clone(),
                        reason: format!("{} steps cannot serve a route", route.kind.label()),
                    });
                    continue;
                }
                validate_kind(route, layout, &mut errors);
            }
        }

        if step.is_queue() {
            let downstream = reachable_from(layout.steps, step.to.iter().map(String::as_str));
            for responder in layout
                .steps
                .iter()
                .filter(|s| s.responder && downstream.contains(s.name.as_str()))
            {
                errors.push(ValidationError::ResponderBehindQueue {
                    step: responder.name.clone(),
                    queue: step.name.clone(),
                });
            }
        }
    }

    errors
}

fn validate_kind(step: &StepSpec, layout: &GraphLayout, errors: &mut Vec<ValidationError>) {
    match &step.kind {
        StepKind::Task(task) => {
            let known = if task.model_path.is_some() {
                layout.registry.has_model_class(&task.handler)
            } else {
                layout.registry.has_handler(&task.handler)
            };
            if !known {
                errors.push(ValidationError::UnknownHandler {
                    step: step.name.clone(),
                    handler: task.handler.clone(),
                });
            }
        }
        StepKind::Remote(remote) => {
            if remote.url.is_none() && remote.function.is_none() {
                errors.push(ValidationError::MissingRemoteTarget {
                    step: step.name.clone(),
                });
            }
            if let Some(function) = &remote.function {
                if !layout.children.contains_key(function) {
                    errors.push(ValidationError::UnknownChildFunction {
                        step: step.name.clone(),
                        function: function.clone(),
                    });
                }
            }
        }
        StepKind::ChildFunction(child) => {
            if !layout.children.contains_key(&child.function) {
                errors.push(ValidationError::UnknownChildFunction {
                    step: step.name.clone(),
                    function: child.function.clone(),
                });
            }
        }
        StepKind::Queue(queue) => {
            if queue.transport == QueueTransport::File && queue.path.is_none() {
                errors.push(ValidationError::MissingQueuePath {
                    step: step.name.clone(),
                });
            }
        }
        StepKind::Router(_) => {}
    }
}
