// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Task handler serving one loaded model over the V2 inference protocol.
//!
//! The action comes from the routed path (`/v2/models/<name>/<action>`):
//! `infer` and `predict` run the model over `body.inputs`, `explain` asks the
//! model for an explanation, `metadata`, `ready` and `health` describe the
//! model. A request without an action infers on POST and describes on GET.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::consts::DEFAULT_ACTION;
use crate::errors::StepError;
use crate::event::Event;
use crate::traits::{Handler, HandlerOutput, InitContext, Model, ModelArtifact, ModelClass};

/// A model plus the identity it is served under.
#[derive(Clone)]
pub struct ModelHandle {
    pub name: String,
    pub version: Option<String>,
    pub artifact: ModelArtifact,
    pub model: Arc<dyn Model>,
}

pub struct ModelServer {
    handle: ModelHandle,
}

impl ModelServer {
    pub fn new(handle: ModelHandle) -> Self {
        Self { handle }
    }

    /// Fetch the artifact from the model store and load it with `class`.
    pub async fn load(class: &dyn ModelClass, ctx: &InitContext) -> Result<Self, StepError> {
        let model_path = ctx
            .model_path
            .as_deref()
            .ok_or_else(|| StepError::Init(format!("step '{}' has no model_path", ctx.step)))?;
        let store = ctx
            .model_store
            .as_ref()
            .ok_or_else(|| StepError::Init("no model store configured".to_string()))?;

        let artifact = store.get_model(model_path).await?;
        let model = class.load(&artifact, &ctx.options).await?;

        let name = ctx
            .option_str("model_name")
            .unwrap_or(&ctx.step)
            .to_string();
        let version = ctx
            .option_str("version")
            .or_else(|| artifact.extra_metadata.get("version").and_then(Value::as_str))
            .map(str::to_string);

        Ok(Self::new(ModelHandle {
            name,
            version,
            artifact,
            model,
        }))
    }

    fn inputs(event: &Event) -> Result<&[Value], StepError> {
        event
            .body
            .get("inputs")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .ok_or_else(|| StepError::BadRequest("request body must carry an 'inputs' array".into()))
    }

    fn reply(&self, event: &Event, outputs: Value) -> Value {
        let mut body = json!({
            "id": event.id,
            "model_name": self.handle.name,
            "outputs": outputs,
        });
        if let Some(version) = &self.handle.version {
            body["model_version"] = json!(version);
        }
        body
    }

    fn metadata(&self) -> Value {
        json!({
            "name": self.handle.name,
            "version": self.handle.version,
            "ready": true,
            "artifact": self.handle.artifact.local_path.display().to_string(),
            "metadata": self.handle.artifact.extra_metadata,
        })
    }
}

#[async_trait]
impl Handler for ModelServer {
    async fn handle(&self, event: Event) -> Result<HandlerOutput, StepError> {
        let action = match event.action.as_deref() {
            Some(action) if !action.is_empty() => action.to_string(),
            _ if event.method == "GET" => "metadata".to_string(),
            _ => DEFAULT_ACTION.to_string(),
        };

        let body = match action.as_str() {
            "infer" | "predict" => {
                let outputs = self.handle.model.predict(Self::inputs(&event)?)?;
                self.reply(&event, Value::Array(outputs))
            }
            "explain" => {
                let explanation = self.handle.model.explain(Self::inputs(&event)?)?;
                self.reply(&event, explanation)
            }
            "metadata" => self.metadata(),
            "ready" | "health" => json!({ "name": self.handle.name, "ready": true }),
            other => {
                return Err(StepError::BadRequest(format!(
                    "unsupported action '{}' for model '{}'",
                    other, self.handle.name
                )))
            }
        };
        Ok(HandlerOutput::Continue(event.with_body(body)))
    }

    fn name(&self) -> &str {
        &self.handle.name
    }
}
