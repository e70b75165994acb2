// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Request-time state of a graph and the topology resolver.
//!
//! A [`GraphRuntime`] owns one [`StepNode`] per declared step, the queue
//! backends and the in-process runtimes of local child functions. Router
//! graphs dispatch straight to one route; flow graphs are walked from the
//! start steps, fanning out to every successor concurrently.
//!
//! A request is settled by the first responder output or the first failure.
//! Branches still running at that point carry on in the background and
//! their failures go to the error handler and error stream instead.

use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::consts::DEFAULT_QUEUE_PARTITIONS;
use crate::engine::step::{
    Outbox, Outcome, QueueStep, RemoteBinding, RemoteStep, RouterStep, StepNode, TaskStep,
};
use crate::errors::{ExecutionError, StepError};
use crate::event::{Event, Response};
use crate::graph::{Graph, StepKind, StepSpec};
use crate::observability::messages::engine::{
    FailureRouted, RequestCompleted, RequestFailed, RequestReceived,
};
use crate::observability::messages::step::StepFailed;
use crate::observability::messages::StructuredLog;
use crate::queue::{open_queue, MemoryQueue};
use crate::remote::{HttpInvoker, Invoker, RemoteTarget, RetryPolicy};
use crate::traits::QueueBackend;

/// How queue consumers are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Background consumer tasks per queue
    Serving,
    /// Queues drained inline after each request
    Simulation,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Serving => "serving",
            ExecutionMode::Simulation => "simulation",
        }
    }
}

/// Options fixed when a runtime is created.
#[derive(Clone)]
pub struct RuntimeOptions {
    pub mode: ExecutionMode,
    /// Resolve child functions to their in-process graphs even when they have a url
    pub all_functions_local: bool,
    /// Directory relative queue paths resolve against
    pub base_dir: PathBuf,
    /// Outbound transport for remote steps; reqwest when unset
    pub invoker: Option<Arc<dyn Invoker>>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Serving,
            all_functions_local: false,
            base_dir: PathBuf::from("."),
            invoker: None,
        }
    }
}

impl std::fmt::Debug for RuntimeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeOptions")
            .field("mode", &self.mode)
            .field("all_functions_local", &self.all_functions_local)
            .field("base_dir", &self.base_dir)
            .field("invoker", &self.invoker.is_some())
            .finish()
    }
}

/// One finished branch of a flow walk.
#[derive(Debug, Clone)]
pub(crate) enum Terminal {
    /// A responder step produced the response
    Responded(Value),
    /// The branch ran out of successors or handed off to a queue
    Finished(Value),
    Failed {
        step: String,
        error: StepError,
        event: Event,
    },
}

/// Hands the first decisive terminal of a request to the waiting caller.
pub(crate) struct Settlement {
    tx: std::sync::Mutex<Option<oneshot::Sender<Terminal>>>,
}

impl Settlement {
    fn new() -> (Self, oneshot::Receiver<Terminal>) {
        let (tx, rx) = oneshot::channel();
        let settlement = Self {
            tx: std::sync::Mutex::new(Some(tx)),
        };
        (settlement, rx)
    }

    /// Returns false when the request was already settled or its caller is gone.
    fn settle(&self, terminal: Terminal) -> bool {
        let sender = match self.tx.lock() {
            Ok(mut tx) => tx.take(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(terminal).is_ok(),
            None => false,
        }
    }
}

pub struct GraphRuntime {
    graph: Arc<Graph>,
    nodes: HashMap<String, Arc<StepNode>>,
    queues: Vec<(String, Arc<dyn QueueBackend>)>,
    outboxes: HashMap<String, Arc<Outbox>>,
    children: Vec<Arc<GraphRuntime>>,
    limiter: Option<Arc<Semaphore>>,
    options: RuntimeOptions,
    shutdown: CancellationToken,
}

impl GraphRuntime {
    /// Create the executable form of `graph`. Nothing is initialized yet
    /// besides queue backends and the outbound client.
    pub fn build(
        graph: Arc<Graph>,
        options: RuntimeOptions,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, Result<Arc<Self>, ExecutionError>> {
        async move {
            let invoker: Arc<dyn Invoker> = match &options.invoker {
                Some(invoker) => invoker.clone(),
                None => Arc::new(
                    HttpInvoker::new().map_err(|e| ExecutionError::Internal(e.to_string()))?,
                ),
            };
            let options = RuntimeOptions {
                invoker: Some(invoker.clone()),
                ..options
            };

            let mut builder = NodeBuilder {
                graph: &graph,
                options: &options,
                invoker,
                shutdown: &shutdown,
                queues: Vec::new(),
                outboxes: HashMap::new(),
                children: HashMap::new(),
            };
            let mut nodes = HashMap::new();
            for spec in graph.steps() {
                let node = builder.node(spec).await?;
                nodes.insert(spec.name.clone(), Arc::new(node));
            }
            let queues = builder.queues;
            let outboxes = builder.outboxes;
            let children = builder.children.into_values().collect();

            let limiter = graph
                .options()
                .max_concurrency
                .filter(|n| *n > 0)
                .map(|n| Arc::new(Semaphore::new(n)));

            Ok(Arc::new(Self {
                graph,
                nodes,
                queues,
                outboxes,
                children,
                limiter,
                options,
                shutdown,
            }))
        }
        .boxed()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn mode(&self) -> ExecutionMode {
        self.options.mode
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Queue backends in declaration order, with the name of their step.
    pub fn queues(&self) -> &[(String, Arc<dyn QueueBackend>)] {
        &self.queues
    }

    /// Outbound call behind the queue of a fire-and-forget remote step.
    pub(crate) fn outbox(&self, queue: &str) -> Option<&Outbox> {
        self.outboxes.get(queue).map(Arc::as_ref)
    }

    /// In-process child runtimes used by remote and child-function steps.
    pub fn children(&self) -> &[Arc<GraphRuntime>] {
        &self.children
    }

    /// Initialize every task step now, in declaration order.
    pub fn init_all(&self) -> BoxFuture<'_, Result<(), ExecutionError>> {
        async move {
            for spec in self.graph.steps() {
                if let Some(node) = self.nodes.get(&spec.name) {
                    node.init()
                        .await
                        .map_err(|(step, source)| ExecutionError::StepInit { step, source })?;
                }
            }
            for child in &self.children {
                child.init_all().await?;
            }
            Ok(())
        }
        .boxed()
    }

    /// Execute one request and turn the outcome into a response.
    pub fn run(self: Arc<Self>, event: Event, cancel: CancellationToken) -> BoxFuture<'static, Response> {
        async move {
            let id = event.id.clone();
            let started = Instant::now();
            RequestReceived {
                graph: self.graph.name(),
                id: &id,
                method: &event.method,
                path: &event.path,
            }
            .log();

            let _permit = match &self.limiter {
                Some(limiter) => match limiter.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        let error = ExecutionError::Cancelled;
                        return self.fail(&id, error);
                    }
                },
                None => None,
            };

            let result = match self.graph.options().request_timeout_ms {
                Some(ms) => {
                    let timeout = std::time::Duration::from_millis(ms);
                    let execution = self.clone().execute(event, cancel.clone());
                    match tokio::time::timeout(timeout, execution).await {
                        Ok(response) => response,
                        Err(_) => {
                            cancel.cancel();
                            Err(ExecutionError::Timeout(timeout))
                        }
                    }
                }
                None => self.clone().execute(event, cancel.clone()).await,
            };

            match result {
                Ok(response) => {
                    RequestCompleted {
                        graph: self.graph.name(),
                        id: &id,
                        status: response.status,
                        duration: started.elapsed(),
                    }
                    .log();
                    response
                }
                Err(error) => self.fail(&id, error),
            }
        }
        .boxed()
    }

    fn fail(&self, id: &str, error: ExecutionError) -> Response {
        RequestFailed {
            graph: self.graph.name(),
            id,
            error: &error,
        }
        .log();
        Response::from_error(id, &error)
    }

    /// Walk the graph in its own task and answer once the request is settled.
    ///
    /// In simulation mode the remaining branches are awaited too, so the
    /// drain that follows sees every record they publish.
    async fn execute(
        self: Arc<Self>,
        event: Event,
        cancel: CancellationToken,
    ) -> Result<Response, ExecutionError> {
        let id = event.id.clone();
        let (settlement, settled) = Settlement::new();
        let runtime = self.clone();
        let walk_cancel = cancel.clone();
        let walk = tokio::spawn(async move {
            let terminals = runtime
                .walk_all(runtime.graph.start(), event, &walk_cancel, Some(&settlement))
                .await;
            if let Ok(body) = select_result(terminals) {
                settlement.settle(Terminal::Finished(body));
            }
        });

        let settled = settled.await;
        if self.mode() == ExecutionMode::Simulation {
            if let Err(error) = walk.await {
                tracing::warn!(graph = self.graph.name(), id = %id, error = %error, "Flow walk aborted: {}", error);
            }
        }

        match settled {
            Ok(Terminal::Responded(body)) | Ok(Terminal::Finished(body)) => {
                Ok(Response::ok(id, body))
            }
            Ok(Terminal::Failed {
                step,
                error,
                event: failed_event,
            }) => {
                if matches!(error, StepError::Cancelled) || cancel.is_cancelled() {
                    return Err(ExecutionError::Cancelled);
                }
                let error = ExecutionError::from_step(&step, error);
                match self.route_failure(&step, &error, &failed_event).await {
                    Some(body) => Ok(Response {
                        id,
                        status: error.status_code(),
                        body,
                    }),
                    None => Err(error),
                }
            }
            Err(_) => Err(ExecutionError::Internal(
                "flow walk ended without a result".to_string(),
            )),
        }
    }

    /// Walk every step in `names` with its own copy of `event`.
    ///
    /// Without a `settlement` every terminal is only collected; queue
    /// consumers and the error handler walk this way.
    pub(crate) fn walk_all<'a>(
        &'a self,
        names: &'a [String],
        event: Event,
        cancel: &'a CancellationToken,
        settlement: Option<&'a Settlement>,
    ) -> BoxFuture<'a, Vec<Terminal>> {
        async move {
            let branches = names
                .iter()
                .map(|name| self.walk(name, event.clone(), cancel, settlement));
            join_all(branches).await.into_iter().flatten().collect()
        }
        .boxed()
    }

    fn walk<'a>(
        &'a self,
        name: &'a str,
        event: Event,
        cancel: &'a CancellationToken,
        settlement: Option<&'a Settlement>,
    ) -> BoxFuture<'a, Vec<Terminal>> {
        async move {
            let (Some(node), Some(spec)) = (self.nodes.get(name), self.graph.step(name)) else {
                let error = StepError::Handler(format!("step '{}' is not part of the graph", name));
                return self.branch_failed(name, error, event, cancel, settlement).await;
            };

            let failed_event = event.clone();
            match node.execute(event, cancel).await {
                Outcome::Respond(value) => {
                    respond(settlement, &value);
                    vec![Terminal::Responded(value)]
                }
                Outcome::Fail(error) => {
                    self.branch_failed(name, error, failed_event, cancel, settlement)
                        .await
                }
                Outcome::RouteFailed { route, error } => {
                    self.branch_failed(&route, error, failed_event, cancel, settlement)
                        .await
                }
                Outcome::Handoff(out) => {
                    let mut terminals = Vec::new();
                    if spec.responder {
                        respond(settlement, &out.body);
                        terminals.push(Terminal::Responded(out.body.clone()));
                    }
                    terminals.push(Terminal::Finished(out.body));
                    terminals
                }
                Outcome::Continue(out) => {
                    let mut terminals = Vec::new();
                    if spec.responder {
                        respond(settlement, &out.body);
                        terminals.push(Terminal::Responded(out.body.clone()));
                    }
                    if spec.to.is_empty() {
                        terminals.push(Terminal::Finished(out.body));
                    } else {
                        terminals.extend(self.walk_all(&spec.to, out, cancel, settlement).await);
                    }
                    terminals
                }
            }
        }
        .boxed()
    }

    /// A branch failed. Once the request is settled the caller never sees
    /// the failure, so it is routed to the error targets here.
    async fn branch_failed(
        &self,
        step: &str,
        error: StepError,
        event: Event,
        cancel: &CancellationToken,
        settlement: Option<&Settlement>,
    ) -> Vec<Terminal> {
        StepFailed {
            step,
            id: &event.id,
            error: &error,
        }
        .log();

        let terminal = Terminal::Failed {
            step: step.to_string(),
            error: error.clone(),
            event: event.clone(),
        };
        if let Some(settlement) = settlement {
            let late = !settlement.settle(terminal.clone());
            if late && !cancel.is_cancelled() && !matches!(error, StepError::Cancelled) {
                let error = ExecutionError::from_step(step, error);
                self.route_failure(step, &error, &event).await;
            }
        }
        vec![terminal]
    }

    /// Hand a failure to the error handler and the error stream.
    ///
    /// Returns the error handler's result, which replaces the error body.
    pub(crate) async fn route_failure(
        &self,
        step: &str,
        error: &ExecutionError,
        event: &Event,
    ) -> Option<Value> {
        let error_event = event.with_body(json!({
            "event": event.body,
            "error": error.to_string(),
            "kind": error.kind(),
            "step": step,
            "origin": self.graph.name(),
        }));

        if let Some(stream) = self.graph.error_stream() {
            if let (Some(StepNode::Queue(queue)), Some(spec)) = (
                self.nodes.get(stream).map(Arc::as_ref),
                self.graph.step(stream),
            ) {
                FailureRouted {
                    graph: self.graph.name(),
                    id: &event.id,
                    failed_step: step,
                    target: stream,
                }
                .log();
                let policy = self.graph.retry_for(spec);
                if let Err(e) = queue.publish(&error_event, &policy).await {
                    StepFailed {
                        step: stream,
                        id: &event.id,
                        error: &StepError::Queue(e),
                    }
                    .log();
                }
            }
        }

        let handler = self.graph.error_handler()?;
        if handler == step {
            return None;
        }
        FailureRouted {
            graph: self.graph.name(),
            id: &event.id,
            failed_step: step,
            target: handler,
        }
        .log();
        let names = [handler.to_string()];
        let detached = CancellationToken::new();
        let terminals = self.walk_all(&names, error_event, &detached, None).await;
        select_result(terminals).ok()
    }
}

impl Drop for GraphRuntime {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn respond(settlement: Option<&Settlement>, body: &Value) {
    if let Some(settlement) = settlement {
        settlement.settle(Terminal::Responded(body.clone()));
    }
}

/// First responder in depth-first declaration order, else the first
/// finished branch, else null. Any failed branch fails the request with the
/// first failure in the same order.
pub(crate) fn select_result(terminals: Vec<Terminal>) -> Result<Value, (String, StepError, Event)> {
    let mut responded = None;
    let mut finished = None;
    for terminal in terminals {
        match terminal {
            Terminal::Failed { step, error, event } => return Err((step, error, event)),
            Terminal::Responded(value) => {
                responded.get_or_insert(value);
            }
            Terminal::Finished(value) => {
                finished.get_or_insert(value);
            }
        }
    }
    Ok(responded.or(finished).unwrap_or(Value::Null))
}

struct NodeBuilder<'a> {
    graph: &'a Arc<Graph>,
    options: &'a RuntimeOptions,
    invoker: Arc<dyn Invoker>,
    shutdown: &'a CancellationToken,
    queues: Vec<(String, Arc<dyn QueueBackend>)>,
    outboxes: HashMap<String, Arc<Outbox>>,
    children: HashMap<String, Arc<GraphRuntime>>,
}

impl NodeBuilder<'_> {
    fn node<'s>(
        &'s mut self,
        spec: &'s StepSpec,
    ) -> BoxFuture<'s, Result<StepNode, ExecutionError>> {
        async move {
            let init_err = |message: String| ExecutionError::StepInit {
                step: spec.name.clone(),
                source: StepError::Init(message),
            };
            let retry = self.graph.retry_for(spec);

            let node = match &spec.kind {
                StepKind::Task(task) => StepNode::Task(TaskStep::new(
                    &spec.name,
                    task.clone(),
                    spec.full_event,
                    spec.serialized,
                    self.graph.registry().clone(),
                )),
                StepKind::Router(router) => {
                    let mut step = RouterStep::new(&spec.name, self.graph.routing_prefix());
                    for route in &router.routes {
                        let node = self.node(route).await?;
                        step.add_route(Arc::new(node));
                    }
                    StepNode::Router(step)
                }
                StepKind::Queue(queue) => {
                    let backend = open_queue(&spec.name, queue, &self.options.base_dir)
                        .await
                        .map_err(|e| ExecutionError::StepInit {
                            step: spec.name.clone(),
                            source: StepError::Queue(e),
                        })?;
                    self.queues.push((spec.name.clone(), backend.clone()));
                    StepNode::Queue(QueueStep::new(&spec.name, queue.clone(), backend, retry))
                }
                StepKind::Remote(remote) => {
                    let binding = match (&remote.function, &remote.url) {
                        (Some(function), url) => self
                            .function_binding(
                                &spec.name,
                                function,
                                url.as_deref(),
                                |url| RemoteTarget::from_spec(remote, url),
                                remote.fire_and_forget,
                                &retry,
                            )
                            .await
                            .map_err(init_err)?,
                        (None, Some(url)) => self.http_binding(
                            &spec.name,
                            RemoteTarget::from_spec(remote, url.clone()),
                            remote.fire_and_forget,
                            &retry,
                        ),
                        (None, None) => {
                            return Err(init_err("remote step has no target".to_string()))
                        }
                    };
                    StepNode::Remote(RemoteStep::new(&spec.name, binding, retry))
                }
                StepKind::ChildFunction(child) => {
                    let binding = self
                        .function_binding(
                            &spec.name,
                            &child.function,
                            None,
                            |url| RemoteTarget::new(url),
                            false,
                            &retry,
                        )
                        .await
                        .map_err(init_err)?;
                    StepNode::Remote(RemoteStep::new(&spec.name, binding, retry))
                }
            };
            Ok(node)
        }
        .boxed()
    }

    /// Fire-and-forget steps get an in-memory outbox queue named after the
    /// step; its consumer makes the call.
    fn http_binding(
        &mut self,
        step: &str,
        target: RemoteTarget,
        fire_and_forget: bool,
        retry: &RetryPolicy,
    ) -> RemoteBinding {
        let outbox = fire_and_forget.then(|| {
            let backend: Arc<dyn QueueBackend> =
                Arc::new(MemoryQueue::new(step, DEFAULT_QUEUE_PARTITIONS));
            self.queues.push((step.to_string(), backend.clone()));
            self.outboxes.insert(
                step.to_string(),
                Arc::new(Outbox::new(target.clone(), self.invoker.clone(), retry.clone())),
            );
            backend
        });
        RemoteBinding::Http {
            target,
            invoker: self.invoker.clone(),
            outbox,
        }
    }

    /// Bind a step to the child function `function`: in-process when all
    /// functions are local or the child has no url, over HTTP otherwise.
    async fn function_binding(
        &mut self,
        step: &str,
        function: &str,
        url_override: Option<&str>,
        target: impl FnOnce(String) -> RemoteTarget + Send,
        fire_and_forget: bool,
        retry: &RetryPolicy,
    ) -> Result<RemoteBinding, String> {
        let child = self
            .graph
            .children()
            .get(function)
            .ok_or_else(|| format!("unknown child function '{}'", function))?;
        let url = url_override.map(str::to_string).or_else(|| child.url.clone());

        let run_local = self.options.all_functions_local || url.is_none();
        if let (true, Some(child_graph)) = (run_local, &child.graph) {
            if let Some(runtime) = self.children.get(function) {
                return Ok(RemoteBinding::Local(runtime.clone()));
            }
            let runtime = GraphRuntime::build(
                child_graph.clone(),
                self.options.clone(),
                self.shutdown.child_token(),
            )
            .await
            .map_err(|e| format!("child function '{}': {}", function, e))?;
            self.children.insert(function.to_string(), runtime.clone());
            return Ok(RemoteBinding::Local(runtime));
        }

        let url = url.ok_or_else(|| {
            format!("child function '{}' has no url and no local graph", function)
        })?;
        Ok(self.http_binding(step, target(url), fire_and_forget, retry))
    }
}
