// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Local simulation harness.
//!
//! Runs a graph in-process against single events, with no network and no
//! background consumers. Queue steps keep their configured backend (memory,
//! or file emulation when requested) and are drained inline after every
//! request. Child functions always resolve to their in-process graphs.
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use serving_graph::backends::local::HandlerRegistry;
//! use serving_graph::graph::{GraphBuilder, StepSpec};
//! use serving_graph::simulation::LocalSimulation;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut builder = GraphBuilder::new("demo");
//! builder.add_step(StepSpec::task("echo", "identity").responder()).unwrap();
//! builder.with_registry(HandlerRegistry::with_builtins());
//!
//! let sim = LocalSimulation::new(builder.build().unwrap()).await.unwrap();
//! let response = sim.test("/", json!({"hello": "world"})).await;
//! assert_eq!(response.body, json!({"hello": "world"}));
//! # }
//! ```

use serde_json::Value;
use std::sync::Arc;

use crate::engine::ExecutionMode;
use crate::errors::ExecutionError;
use crate::event::{Event, Response};
use crate::graph::Graph;
use crate::server::{GraphServer, ServeOptions};

pub struct LocalSimulation {
    server: GraphServer,
}

impl LocalSimulation {
    pub async fn new(graph: Graph) -> Result<Self, ExecutionError> {
        Self::with_options(graph, ServeOptions::default()).await
    }

    /// Simulate with explicit options. `all_functions_local` is always set.
    pub async fn with_options(graph: Graph, options: ServeOptions) -> Result<Self, ExecutionError> {
        let options = ServeOptions {
            all_functions_local: true,
            ..options
        };
        let server = GraphServer::start_in(Arc::new(graph), options, ExecutionMode::Simulation).await?;
        Ok(Self { server })
    }

    pub fn graph(&self) -> &Graph {
        self.server.graph()
    }

    /// Run one event through the graph, then drain every queue it fed.
    pub async fn run(&self, event: Event) -> Response {
        self.server.invoke(event).await
    }

    /// POST `body` to `path`.
    pub async fn test(&self, path: &str, body: Value) -> Response {
        self.run(Event::new(path, body)).await
    }

    /// Records still unacked after the last drain.
    pub async fn pending(&self) -> usize {
        self.server.pending().await
    }
}
