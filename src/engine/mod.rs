// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Request-time execution: the step arena, the router and flow resolvers and
//! the queue consumers.

mod consumer;
pub mod runtime;
pub mod step;
#[cfg(test)]
mod integration_tests;

pub(crate) use consumer::{drain, spawn_consumers};
pub use runtime::{ExecutionMode, GraphRuntime, RuntimeOptions};
pub use step::{Outcome, StepNode};
