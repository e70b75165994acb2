// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Handlers and factories for exercising the executor in tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::StepError;
use crate::event::Event;
use crate::traits::{Handler, HandlerFactory, HandlerOutput, InitContext};

/// Appends its tag to `body.trail`, creating the array when missing.
pub struct TrailHandler {
    pub tag: String,
}

impl TrailHandler {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

#[async_trait]
impl Handler for TrailHandler {
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError> {
        let mut body = event.body.clone();
        if !body.is_object() {
            body = json!({});
        }
        match body.get_mut("trail").and_then(Value::as_array_mut) {
            Some(trail) => trail.push(json!(self.tag)),
            None => body["trail"] = json!([self.tag]),
        }
        Ok(HandlerOutput::Continue(event.with_body(body)))
    }

    fn name(&self) -> &str {
        &self.tag
    }
}

/// Always fails with a handler error.
pub struct FailingHandler {
    pub message: String,
}

impl FailingHandler {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Handler for FailingHandler {
    async fn handle(&self, _event: Event) -> Result<HandlerOutput, StepError> {
        Err(StepError::Handler(self.message.clone()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Panics on every event.
pub struct PanickingHandler;

#[async_trait]
impl Handler for PanickingHandler {
    async fn handle(&self, _event: Event) -> Result<HandlerOutput, StepError> {
        panic!("handler blew up");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

/// Ends its branch with a fixed value.
pub struct RespondingHandler {
    pub value: Value,
}

#[async_trait]
impl Handler for RespondingHandler {
    async fn handle(&self, _event: Event) -> Result<HandlerOutput, StepError> {
        Ok(HandlerOutput::Respond(self.value.clone()))
    }

    fn name(&self) -> &str {
        "responding"
    }
}

/// Sleeps, then passes the event through.
pub struct SlowHandler {
    pub delay: Duration,
}

#[async_trait]
impl Handler for SlowHandler {
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError> {
        tokio::time::sleep(self.delay).await;
        Ok(HandlerOutput::Continue(event))
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Records the highest number of overlapping `handle` calls.
#[derive(Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    pub max_seen: AtomicUsize,
    pub delay: Duration,
}

impl ConcurrencyGauge {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Handler for ConcurrencyGauge {
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(HandlerOutput::Continue(event))
    }

    fn name(&self) -> &str {
        "gauge"
    }
}

/// Factory counting how often init ran, with an optional slow init and a
/// number of initial failures.
#[derive(Clone, Default)]
pub struct CountingFactory {
    pub inits: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
    pub init_delay: Duration,
    pub fail_first: usize,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn init_count(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandlerFactory for CountingFactory {
    async fn init(&self, ctx: &InitContext) -> Result<Arc<dyn Handler>, StepError> {
        tokio::time::sleep(self.init_delay).await;
        let attempt = self.inits.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(StepError::Init(format!("init attempt {} failed", attempt + 1)));
        }
        Ok(Arc::new(CountingHandler {
            step: ctx.step.clone(),
            calls: self.calls.clone(),
        }))
    }
}

/// Reports which step served the event and how many events it has seen.
pub struct CountingHandler {
    step: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for CountingHandler {
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let body = json!({ "served_by": self.step, "calls": calls, "input": event.body });
        Ok(HandlerOutput::Continue(event.with_body(body)))
    }

    fn name(&self) -> &str {
        &self.step
    }
}

/// Keeps a copy of every event it sees and passes it through.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    pub seen: Arc<std::sync::Mutex<Vec<Event>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError> {
        self.seen.lock().unwrap().push(event.clone());
        Ok(HandlerOutput::Continue(event))
    }

    fn name(&self) -> &str {
        "recording"
    }
}
