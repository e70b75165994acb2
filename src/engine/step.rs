// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Executable steps.
//!
//! Each [`StepNode`] wraps one declared step with whatever it needs at
//! request time: the lazily initialized handler of a task, the dispatch table
//! of a router, the backend of a queue or the target of a remote call.

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;

use crate::backends::local::HandlerRegistry;
use crate::engine::runtime::GraphRuntime;
use crate::errors::{QueueError, StepError};
use crate::event::Event;
use crate::graph::{parse_route_path, QueueSpec, TaskSpec};
use crate::observability::messages::queue::{EventPublished, PublishRetry};
use crate::observability::messages::remote::DetachedCallFailed;
use crate::observability::messages::step::{StepInitCompleted, StepInitFailed, StepInitStarted};
use crate::observability::messages::StructuredLog;
use crate::queue::partition_key;
use crate::remote::{invoke_with_retry, Invoker, RemoteTarget, RetryPolicy};
use crate::traits::{Ack, Handler, HandlerOutput, QueueBackend};

/// What executing one step on one event produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Keep walking with this event
    Continue(Event),
    /// The branch ends with this result
    Respond(Value),
    /// The event was handed to a queue; its successors run elsewhere
    Handoff(Event),
    Fail(StepError),
    /// A route below a router failed; the failure belongs to the route
    RouteFailed { route: String, error: StepError },
}

pub enum StepNode {
    Task(TaskStep),
    Router(RouterStep),
    Queue(QueueStep),
    Remote(RemoteStep),
}

impl StepNode {
    pub fn name(&self) -> &str {
        match self {
            StepNode::Task(step) => &step.name,
            StepNode::Router(step) => &step.name,
            StepNode::Queue(step) => &step.name,
            StepNode::Remote(step) => &step.name,
        }
    }

    pub fn execute<'a>(&'a self, event: Event, cancel: &'a CancellationToken) -> BoxFuture<'a, Outcome> {
        match self {
            StepNode::Task(step) => step.execute(event).boxed(),
            StepNode::Router(step) => step.execute(event, cancel).boxed(),
            StepNode::Queue(step) => step.execute(event).boxed(),
            StepNode::Remote(step) => step.execute(event, cancel).boxed(),
        }
    }

    /// Run init of this step and of every route below it.
    pub fn init(&self) -> BoxFuture<'_, Result<(), (String, StepError)>> {
        async move {
            match self {
                StepNode::Task(step) => step
                    .handler()
                    .await
                    .map(|_| ())
                    .map_err(|e| (step.name.clone(), e)),
                StepNode::Router(step) => {
                    for name in &step.order {
                        if let Some(route) = step.routes.get(name) {
                            route.init().await?;
                        }
                    }
                    Ok(())
                }
                StepNode::Queue(_) | StepNode::Remote(_) => Ok(()),
            }
        }
        .boxed()
    }
}

/// A task step: handler created once by `init`, then shared by every event.
pub struct TaskStep {
    pub name: String,
    spec: TaskSpec,
    full_event: bool,
    registry: HandlerRegistry,
    handler: OnceCell<Arc<dyn Handler>>,
    lock: Option<Arc<Mutex<()>>>,
}

impl TaskStep {
    pub fn new(
        name: impl Into<String>,
        spec: TaskSpec,
        full_event: bool,
        serialized: bool,
        registry: HandlerRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            full_event,
            registry,
            handler: OnceCell::new(),
            lock: serialized.then(|| Arc::new(Mutex::new(()))),
        }
    }

    /// The initialized handler, running init on first use.
    ///
    /// Concurrent first callers wait on a single init. A failed init leaves the
    /// cell empty so the next event tries again.
    pub async fn handler(&self) -> Result<&Arc<dyn Handler>, StepError> {
        self.handler
            .get_or_try_init(|| async {
                StepInitStarted {
                    step: &self.name,
                    kind: "task",
                }
                .log();
                let started = Instant::now();
                match self.registry.init_task(&self.name, &self.spec).await {
                    Ok(handler) => {
                        StepInitCompleted {
                            step: &self.name,
                            duration: started.elapsed(),
                        }
                        .log();
                        Ok(handler)
                    }
                    Err(error) => {
                        StepInitFailed {
                            step: &self.name,
                            error: &error,
                        }
                        .log();
                        Err(error)
                    }
                }
            })
            .await
    }

    pub async fn execute(&self, event: Event) -> Outcome {
        let handler = match self.handler().await {
            Ok(handler) => handler.clone(),
            Err(error) => return Outcome::Fail(error),
        };

        let guard = match &self.lock {
            Some(lock) => Some(lock.clone().lock_owned().await),
            None => None,
        };

        let input = event.clone();
        let joined = tokio::spawn(async move {
            let _guard = guard;
            handler.handle(input).await
        })
        .await;

        let output = match joined {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => return Outcome::Fail(error),
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "handler task was cancelled".to_string()
                };
                return Outcome::Fail(StepError::Panicked(message));
            }
        };

        match output {
            HandlerOutput::Respond(value) => Outcome::Respond(value),
            HandlerOutput::Continue(mut out) if self.full_event => {
                out.id = event.id;
                Outcome::Continue(out)
            }
            HandlerOutput::Continue(out) => Outcome::Continue(event.with_body(out.body)),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A router step: one route per model name, selected from the request path.
pub struct RouterStep {
    pub name: String,
    prefix: String,
    order: Vec<String>,
    routes: HashMap<String, Arc<StepNode>>,
}

impl RouterStep {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            order: Vec::new(),
            routes: HashMap::new(),
        }
    }

    pub fn add_route(&mut self, route: Arc<StepNode>) {
        let name = route.name().to_string();
        if self.routes.insert(name.clone(), route).is_none() {
            self.order.push(name);
        }
    }

    pub async fn execute(&self, mut event: Event, cancel: &CancellationToken) -> Outcome {
        let path = parse_route_path(&event.path, &self.prefix);
        let Some(key) = path.key else {
            return Outcome::Continue(event.with_body(json!({ "models": self.order })));
        };
        let Some(route) = self.routes.get(&key) else {
            return Outcome::Fail(StepError::RouteNotFound {
                route: key,
                available: self.order.clone(),
            });
        };

        event.model = Some(key);
        event.action = path.action;
        match route.execute(event, cancel).await {
            Outcome::Fail(error) => Outcome::RouteFailed {
                route: route.name().to_string(),
                error,
            },
            outcome => outcome,
        }
    }
}

/// Producer side of a queue step.
pub struct QueueStep {
    pub name: String,
    spec: QueueSpec,
    backend: Arc<dyn QueueBackend>,
    retry: RetryPolicy,
}

impl QueueStep {
    pub fn new(
        name: impl Into<String>,
        spec: QueueSpec,
        backend: Arc<dyn QueueBackend>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            backend,
            retry,
        }
    }

    /// Publish under the configured partition key.
    pub async fn publish(&self, event: &Event, policy: &RetryPolicy) -> Result<Ack, QueueError> {
        let key = partition_key(&self.spec, event);
        publish_with_retry(self.backend.as_ref(), &key, event, policy).await
    }

    pub async fn execute(&self, event: Event) -> Outcome {
        match self.publish(&event, &self.retry).await {
            Ok(_) => Outcome::Handoff(event),
            Err(error) => Outcome::Fail(StepError::Queue(error)),
        }
    }
}

/// Publish with bounded retries. Closed queues are not retried.
pub async fn publish_with_retry(
    backend: &dyn QueueBackend,
    key: &str,
    event: &Event,
    policy: &RetryPolicy,
) -> Result<Ack, QueueError> {
    let mut attempt = 1;
    loop {
        match backend.publish(key, event).await {
            Ok(ack) => {
                EventPublished {
                    queue: backend.name(),
                    id: &event.id,
                    partition: ack.partition,
                    offset: ack.offset,
                }
                .log();
                return Ok(ack);
            }
            Err(error @ QueueError::Closed(_)) => return Err(error),
            Err(error) if attempt >= policy.attempts() => return Err(error),
            Err(error) => {
                let delay = policy.delay_for(attempt);
                PublishRetry {
                    queue: backend.name(),
                    attempt,
                    delay,
                    error: &error,
                }
                .log();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Where a remote or child-function step sends its event.
pub enum RemoteBinding {
    Http {
        target: RemoteTarget,
        invoker: Arc<dyn Invoker>,
        /// Queue the call is handed to for fire-and-forget steps
        outbox: Option<Arc<dyn QueueBackend>>,
    },
    /// Sibling graph executed in this process
    Local(Arc<GraphRuntime>),
}

pub struct RemoteStep {
    pub name: String,
    binding: RemoteBinding,
    retry: RetryPolicy,
}

impl RemoteStep {
    pub fn new(name: impl Into<String>, binding: RemoteBinding, retry: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            binding,
            retry,
        }
    }

    pub async fn execute(&self, event: Event, cancel: &CancellationToken) -> Outcome {
        match &self.binding {
            RemoteBinding::Local(runtime) => {
                let response = runtime
                    .clone()
                    .run(event.clone(), cancel.child_token())
                    .await;
                if response.is_success() {
                    Outcome::Continue(event.with_body(response.body))
                } else {
                    Outcome::Fail(StepError::Handler(format!(
                        "function '{}' answered {}: {}",
                        runtime.graph().name(),
                        response.status,
                        response.body
                    )))
                }
            }
            RemoteBinding::Http {
                outbox: Some(outbox),
                ..
            } => match publish_with_retry(outbox.as_ref(), &event.id, &event, &self.retry).await {
                Ok(_) => Outcome::Continue(event),
                Err(error) => Outcome::Fail(StepError::Queue(error)),
            },
            RemoteBinding::Http {
                target, invoker, ..
            } => {
                match invoke_with_retry(invoker.as_ref(), target, &event, &self.retry, cancel).await
                {
                    Ok(body) => Outcome::Continue(event.with_body(body)),
                    Err(error) => Outcome::Fail(error),
                }
            }
        }
    }
}

/// Consumer side of a fire-and-forget remote step.
///
/// Each delivery makes a single call; redelivery under `retry` takes the
/// place of in-call retries.
pub struct Outbox {
    target: RemoteTarget,
    invoker: Arc<dyn Invoker>,
    retry: RetryPolicy,
}

impl Outbox {
    pub fn new(target: RemoteTarget, invoker: Arc<dyn Invoker>, retry: RetryPolicy) -> Self {
        Self {
            target,
            invoker,
            retry,
        }
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn deliver(&self, event: &Event, cancel: &CancellationToken) -> Result<(), StepError> {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(StepError::Cancelled),
            result = self.invoker.invoke(&self.target, event) => result,
        };
        result.map(|_| ()).map_err(|error| {
            DetachedCallFailed {
                url: &self.target.url,
                id: &event.id,
                error: &error,
            }
            .log();
            StepError::Remote(error)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{ConcurrencyGauge, CountingFactory, PanickingHandler};
    use crate::queue::MemoryQueue;
    use std::time::Duration;

    fn registry_with(name: &str, factory: CountingFactory) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(name, Arc::new(factory));
        registry
    }

    fn task(handler: &str, registry: HandlerRegistry, serialized: bool) -> TaskStep {
        TaskStep::new(
            "t",
            TaskSpec {
                handler: handler.to_string(),
                ..TaskSpec::default()
            },
            false,
            serialized,
            registry,
        )
    }

    #[tokio::test]
    async fn concurrent_first_calls_init_once() {
        let factory = CountingFactory::new().with_init_delay(Duration::from_millis(20));
        let step = Arc::new(task("count", registry_with("count", factory.clone()), false));

        let calls = (0..16).map(|i| {
            let step = step.clone();
            async move { step.execute(Event::new("/", json!(i))).await }
        });
        let outcomes = futures::future::join_all(calls).await;

        assert!(outcomes.iter().all(|o| matches!(o, Outcome::Continue(_))));
        assert_eq!(factory.init_count(), 1);
        assert_eq!(factory.call_count(), 16);
    }

    #[tokio::test]
    async fn failed_init_is_retried_on_next_event() {
        let factory = CountingFactory::new().failing_first(1);
        let step = task("count", registry_with("count", factory.clone()), false);

        let first = step.execute(Event::new("/", json!(1))).await;
        assert!(matches!(first, Outcome::Fail(ref e) if e.is_init()));

        let second = step.execute(Event::new("/", json!(2))).await;
        assert!(matches!(second, Outcome::Continue(_)));
        assert_eq!(factory.init_count(), 2);
    }

    #[tokio::test]
    async fn panics_become_step_errors() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("boom", |_| Ok(Arc::new(PanickingHandler) as Arc<dyn Handler>));
        let step = task("boom", registry, false);

        let outcome = step.execute(Event::new("/", json!(1))).await;
        assert!(matches!(outcome, Outcome::Fail(StepError::Panicked(ref m)) if m.contains("blew up")));

        // the step still serves later events
        let again = step.execute(Event::new("/", json!(2))).await;
        assert!(matches!(again, Outcome::Fail(StepError::Panicked(_))));
    }

    #[tokio::test]
    async fn serialized_steps_run_one_at_a_time() {
        let gauge = Arc::new(ConcurrencyGauge::new(Duration::from_millis(10)));
        let mut registry = HandlerRegistry::new();
        let shared = gauge.clone();
        registry.register_fn("gauge", move |_| Ok(shared.clone() as Arc<dyn Handler>));
        let step = Arc::new(task("gauge", registry, true));

        let calls = (0..8).map(|i| {
            let step = step.clone();
            async move { step.execute(Event::new("/", json!(i))).await }
        });
        futures::future::join_all(calls).await;

        assert_eq!(gauge.max_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn body_only_handlers_keep_the_envelope() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("rewrite", |_| {
            Ok(Arc::new(crate::traits::BodyFn::new("rewrite", |_| Ok(json!("new")))) as Arc<dyn Handler>)
        });
        let step = task("rewrite", registry, false);
        let event = Event::new("/p", json!("old")).with_header("x-a", "1");

        let Outcome::Continue(out) = step.execute(event.clone()).await else {
            panic!("expected continue");
        };
        assert_eq!(out.id, event.id);
        assert_eq!(out.headers, event.headers);
        assert_eq!(out.body, json!("new"));
    }

    #[tokio::test]
    async fn unknown_route_lists_available_routes() {
        let mut router = RouterStep::new("router", "v2/models");
        let mut registry = HandlerRegistry::new();
        registry.register("count", Arc::new(CountingFactory::new()));
        router.add_route(Arc::new(StepNode::Task(TaskStep::new(
            "model1",
            TaskSpec {
                handler: "count".into(),
                ..TaskSpec::default()
            },
            false,
            false,
            registry,
        ))));

        let outcome = router
            .execute(Event::new("/v2/models/model2/infer", json!({})), &CancellationToken::new())
            .await;
        assert!(matches!(
            outcome,
            Outcome::Fail(StepError::RouteNotFound { ref route, ref available })
                if route == "model2" && available == &vec!["model1".to_string()]
        ));

        let listing = router
            .execute(Event::new("/v2/models", Value::Null), &CancellationToken::new())
            .await;
        let Outcome::Continue(out) = listing else {
            panic!("expected listing");
        };
        assert_eq!(out.body, json!({"models": ["model1"]}));
    }

    #[tokio::test]
    async fn route_failures_name_the_route() {
        let mut router = RouterStep::new("router", "v2/models");
        let mut registry = HandlerRegistry::new();
        registry.register("count", Arc::new(CountingFactory::new().failing_first(1)));
        router.add_route(Arc::new(StepNode::Task(TaskStep::new(
            "model1",
            TaskSpec {
                handler: "count".into(),
                ..TaskSpec::default()
            },
            false,
            false,
            registry,
        ))));

        let outcome = router
            .execute(Event::new("/v2/models/model1/infer", json!({})), &CancellationToken::new())
            .await;
        assert!(matches!(
            outcome,
            Outcome::RouteFailed { ref route, ref error } if route == "model1" && error.is_init()
        ));
    }

    #[tokio::test]
    async fn queue_step_hands_off_to_backend() {
        let backend = Arc::new(MemoryQueue::new("q", 1));
        let step = QueueStep::new("q", QueueSpec::default(), backend.clone(), RetryPolicy::none());
        let event = Event::new("/", json!({"n": 1}));

        let outcome = step.execute(event.clone()).await;
        assert!(matches!(outcome, Outcome::Handoff(ref e) if e == &event));
        let delivery = backend.try_consume().await.unwrap().unwrap();
        assert_eq!(delivery.key, event.id);
    }
}
