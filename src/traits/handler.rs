// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::errors::StepError;
use crate::event::Event;
use crate::traits::ModelStore;

/// What a handler hands back to the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    /// Keep walking the graph with this event
    Continue(Event),
    /// End this branch with a terminal result
    Respond(Value),
}

/// Per-event logic of a task step.
///
/// A handler is the retained state created by its factory's `init`. The same
/// instance serves every event for the lifetime of the graph, concurrently
/// unless the step is marked `serialized`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError>;

    fn name(&self) -> &str;
}

/// Everything a factory sees while initializing a step.
#[derive(Clone)]
pub struct InitContext {
    /// Step (or route) name
    pub step: String,
    pub options: Map<String, Value>,
    pub model_path: Option<String>,
    pub model_store: Option<Arc<dyn ModelStore>>,
}

impl InitContext {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            options: Map::new(),
            model_path: None,
            model_store: None,
        }
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}

/// The one-time `init` of a task step, producing its handler.
#[async_trait]
pub trait HandlerFactory: Send + Sync {
    async fn init(&self, ctx: &InitContext) -> Result<Arc<dyn Handler>, StepError>;
}

/// Plain function factories, for registering handlers without a type.
pub struct FnFactory<F>(pub F);

#[async_trait]
impl<F> HandlerFactory for FnFactory<F>
where
    F: Fn(&InitContext) -> Result<Arc<dyn Handler>, StepError> + Send + Sync,
{
    async fn init(&self, ctx: &InitContext) -> Result<Arc<dyn Handler>, StepError> {
        (self.0)(ctx)
    }
}

/// Handler built from a closure over the body.
pub struct BodyFn<F> {
    name: String,
    f: F,
}

impl<F> BodyFn<F>
where
    F: Fn(Value) -> Result<Value, StepError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Handler for BodyFn<F>
where
    F: Fn(Value) -> Result<Value, StepError> + Send + Sync,
{
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError> {
        let body = (self.f)(event.body.clone())?;
        Ok(HandlerOutput::Continue(event.with_body(body)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
