// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;

use super::handlers::{AugmentHandler, IdentityHandler};
use super::model_server::ModelServer;
use super::models::{LinearModelClass, LocalModelStore};
use crate::errors::StepError;
use crate::graph::TaskSpec;
use crate::traits::{
    FnFactory, Handler, HandlerFactory, InitContext, ModelClass, ModelStore,
};

/// Registered-function table resolving task handler names.
///
/// Task steps name either a handler (`handler: augment`) or, together with a
/// `model_path`, a model class (`handler: linear`). Nothing is instantiated at
/// registration time; factories run once per step during `init`.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn HandlerFactory>>,
    model_classes: HashMap<String, Arc<dyn ModelClass>>,
    model_store: Option<Arc<dyn ModelStore>>,
}

impl HandlerRegistry {
    /// Empty registry, no built-ins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers and model classes:
    /// - "identity" -> IdentityHandler
    /// - "augment" -> AugmentHandler (merges its options into the body)
    /// - "linear" model class -> LinearModel
    ///
    /// Models are read from the working directory unless another store is set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register_fn("identity", |_ctx| Ok(Arc::new(IdentityHandler) as Arc<dyn Handler>))
            .register_fn("augment", |ctx| {
                Ok(Arc::new(AugmentHandler::new(ctx.options.clone())) as Arc<dyn Handler>)
            })
            .register_model_class("linear", Arc::new(LinearModelClass))
            .set_model_store(Arc::new(LocalModelStore::new(".")));
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn HandlerFactory>,
    ) -> &mut Self {
        self.handlers.insert(name.into(), factory);
        self
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&InitContext) -> Result<Arc<dyn Handler>, StepError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnFactory(f)))
    }

    pub fn register_model_class(
        &mut self,
        name: impl Into<String>,
        class: Arc<dyn ModelClass>,
    ) -> &mut Self {
        self.model_classes.insert(name.into(), class);
        self
    }

    pub fn set_model_store(&mut self, store: Arc<dyn ModelStore>) -> &mut Self {
        self.model_store = Some(store);
        self
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn has_model_class(&self, name: &str) -> bool {
        self.model_classes.contains_key(name)
    }

    /// Registered handler names, sorted.
    pub fn handler_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the one-time init of a task step and return its handler.
    pub async fn init_task(
        &self,
        step: &str,
        task: &TaskSpec,
    ) -> Result<Arc<dyn Handler>, StepError> {
        let ctx = InitContext {
            step: step.to_string(),
            options: task.options.clone(),
            model_path: task.model_path.clone(),
            model_store: self.model_store.clone(),
        };

        if task.model_path.is_some() {
            let class = self.model_classes.get(&task.handler).ok_or_else(|| {
                StepError::Init(format!("unknown model class '{}'", task.handler))
            })?;
            let server = ModelServer::load(class.as_ref(), &ctx).await?;
            return Ok(Arc::new(server));
        }

        let factory = self
            .handlers
            .get(&task.handler)
            .ok_or_else(|| StepError::Init(format!("unknown handler '{}'", task.handler)))?;
        factory.init(&ctx).await
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes: Vec<&String> = self.model_classes.keys().collect();
        classes.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handler_names())
            .field("model_classes", &classes)
            .field("model_store", &self.model_store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::traits::HandlerOutput;
    use serde_json::json;

    #[test]
    fn builtins_are_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert!(registry.has_handler("identity"));
        assert!(registry.has_handler("augment"));
        assert!(registry.has_model_class("linear"));
        assert!(!registry.has_handler("linear"));
        assert_eq!(registry.handler_names(), vec!["augment", "identity"]);
    }

    #[tokio::test]
    async fn init_task_resolves_registered_handler() {
        let registry = HandlerRegistry::with_builtins();
        let task = TaskSpec {
            handler: "augment".to_string(),
            model_path: None,
            options: serde_json::from_value(json!({"source": "web"})).unwrap(),
        };
        let handler = registry.init_task("enrich", &task).await.unwrap();
        let out = handler
            .handle(Event::new("/", json!({"x": 1})))
            .await
            .unwrap();
        let HandlerOutput::Continue(event) = out else {
            panic!("expected continue");
        };
        assert_eq!(event.body, json!({"x": 1, "source": "web"}));
    }

    #[tokio::test]
    async fn init_task_with_unknown_handler_fails() {
        let registry = HandlerRegistry::new();
        let task = TaskSpec {
            handler: "nope".to_string(),
            ..TaskSpec::default()
        };
        let err = registry.init_task("s", &task).await.err().unwrap();
        assert!(err.is_init());
    }

    #[tokio::test]
    async fn missing_model_file_is_a_model_load_error() {
        let registry = HandlerRegistry::with_builtins();
        let task = TaskSpec {
            handler: "linear".to_string(),
            model_path: Some("/definitely/not/here.json".to_string()),
            ..TaskSpec::default()
        };
        let err = registry.init_task("m1", &task).await.err().unwrap();
        assert!(matches!(err, StepError::ModelLoad { .. }));
    }
}
