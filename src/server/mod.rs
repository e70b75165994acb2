// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph entry point.
//!
//! A [`GraphServer`] owns the runtime of one frozen graph, runs eager init
//! when configured and drives queue consumers. Callers hand it events and get
//! a [`Response`] back; the HTTP adapter in [`http`] is one such caller.

pub mod http;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::{drain, spawn_consumers, ExecutionMode, GraphRuntime, RuntimeOptions};
use crate::errors::ExecutionError;
use crate::event::{Event, Response};
use crate::graph::Graph;
use crate::observability::messages::engine::{GraphStarted, GraphStopped};
use crate::observability::messages::StructuredLog;
use crate::remote::Invoker;
use crate::traits::QueueBackend;

/// How a graph is served.
#[derive(Clone, Default)]
pub struct ServeOptions {
    /// Run child functions in-process instead of calling their urls
    pub all_functions_local: bool,
    /// Directory relative queue paths resolve against
    pub base_dir: Option<PathBuf>,
    /// Outbound transport for remote steps
    pub invoker: Option<Arc<dyn Invoker>>,
}

impl std::fmt::Debug for ServeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServeOptions")
            .field("all_functions_local", &self.all_functions_local)
            .field("base_dir", &self.base_dir)
            .field("invoker", &self.invoker.is_some())
            .finish()
    }
}

pub struct GraphServer {
    runtime: Arc<GraphRuntime>,
    consumers: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl GraphServer {
    /// Start serving `graph` with background queue consumers.
    pub async fn start(graph: Graph, options: ServeOptions) -> Result<Self, ExecutionError> {
        Self::start_in(Arc::new(graph), options, ExecutionMode::Serving).await
    }

    pub(crate) async fn start_in(
        graph: Arc<Graph>,
        options: ServeOptions,
        mode: ExecutionMode,
    ) -> Result<Self, ExecutionError> {
        let shutdown = CancellationToken::new();
        let runtime_options = RuntimeOptions {
            mode,
            all_functions_local: options.all_functions_local,
            base_dir: options.base_dir.unwrap_or_else(|| PathBuf::from(".")),
            invoker: options.invoker,
        };
        let runtime = GraphRuntime::build(graph, runtime_options, shutdown.clone()).await?;

        if runtime.graph().options().init_on_start {
            runtime.init_all().await?;
        }

        let consumers = match mode {
            ExecutionMode::Serving => spawn_consumers(&runtime),
            ExecutionMode::Simulation => Vec::new(),
        };

        let graph = runtime.graph();
        GraphStarted {
            graph: graph.name(),
            topology: graph.topology().as_str(),
            step_count: graph.steps().len(),
            mode: mode.as_str(),
        }
        .log();

        Ok(Self {
            runtime,
            consumers,
            shutdown,
        })
    }

    pub fn graph(&self) -> &Graph {
        self.runtime.graph()
    }

    pub fn runtime(&self) -> &Arc<GraphRuntime> {
        &self.runtime
    }

    /// Execute one request.
    pub async fn invoke(&self, event: Event) -> Response {
        self.invoke_with_cancel(event, CancellationToken::new()).await
    }

    /// Execute one request, abandoning in-flight remote calls when `cancel`
    /// fires. Events already published to a queue are unaffected.
    pub async fn invoke_with_cancel(&self, event: Event, cancel: CancellationToken) -> Response {
        let response = self.runtime.clone().run(event, cancel).await;
        if self.runtime.mode() == ExecutionMode::Simulation {
            if let Err(error) = drain(&self.runtime).await {
                tracing::warn!(graph = self.graph().name(), error = %error, "Queue drain failed: {}", error);
            }
        }
        response
    }

    /// Records published and not yet acked, across every queue.
    pub async fn pending(&self) -> usize {
        let mut pending = 0;
        for queue in all_queues(&self.runtime) {
            pending += queue.pending().await;
        }
        pending
    }

    /// Close every queue and stop the consumers.
    pub async fn shutdown(mut self) {
        for queue in all_queues(&self.runtime) {
            queue.close().await;
        }
        self.shutdown.cancel();
        for consumer in std::mem::take(&mut self.consumers) {
            let _ = consumer.await;
        }
        GraphStopped {
            graph: self.runtime.graph().name(),
        }
        .log();
    }
}

impl Drop for GraphServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn all_queues(runtime: &GraphRuntime) -> Vec<Arc<dyn QueueBackend>> {
    let mut queues: Vec<_> = runtime.queues().iter().map(|(_, q)| q.clone()).collect();
    for child in runtime.children() {
        queues.extend(all_queues(child));
    }
    queues
}
