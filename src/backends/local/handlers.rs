// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::StepError;
use crate::event::Event;
use crate::traits::{Handler, HandlerOutput};

/// Passes the event through untouched.
pub struct IdentityHandler;

#[async_trait]
impl Handler for IdentityHandler {
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError> {
        Ok(HandlerOutput::Continue(event))
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Merges a fixed set of fields into an object body.
///
/// Keys already present in the body are overwritten.
pub struct AugmentHandler {
    fields: Map<String, Value>,
}

impl AugmentHandler {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

#[async_trait]
impl Handler for AugmentHandler {
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError> {
        let mut body = match &event.body {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(StepError::BadRequest(format!(
                    "augment expects an object body, got {}",
                    type_name(other)
                )))
            }
        };
        for (key, value) in &self.fields {
            body.insert(key.clone(), value.clone());
        }
        Ok(HandlerOutput::Continue(event.with_body(Value::Object(body))))
    }

    fn name(&self) -> &str {
        "augment"
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
