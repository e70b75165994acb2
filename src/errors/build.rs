// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for graph construction through [`crate::graph::GraphBuilder`].

use crate::errors::ValidationError;
use crate::graph::Topology;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// The topology was already fixed by existing steps
    #[error("cannot switch topology from {current:?} to {requested:?}: graph already has steps")]
    TopologyConflict {
        current: Topology,
        requested: Topology,
    },

    #[error("step '{0}' already exists")]
    DuplicateStep(String),

    #[error("route '{route}' already registered on router '{router}'")]
    DuplicateRoute { router: String, route: String },

    #[error("router step '{0}' does not exist")]
    UnknownRouter(String),

    #[error("step '{0}' does not exist")]
    UnknownStep(String),

    /// Router topology graphs have a single root router; other steps are
    /// detached error targets
    #[error("step '{step}' cannot be added to a {topology:?} graph: routes belong on the root router and extra steps may only serve as error targets")]
    StepNotAllowed { step: String, topology: Topology },

    #[error("graph validation failed:\n{}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl BuildError {
    /// Validation errors carried by this build failure, if any.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            BuildError::Validation(errors) => errors,
            _ => &[],
        }
    }
}
