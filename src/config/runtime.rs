// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::local::{HandlerRegistry, LocalModelStore};
use crate::config::consts::DEFAULT_ROUTER_NAME;
use crate::config::loader::{config_dir, load_config, GraphConfig};
use crate::errors::ConfigError;
use crate::graph::{ChildFunction, Graph, GraphBuilder, Topology};
use crate::observability::messages::validation::ChildFunctionLoaded;
use crate::observability::messages::StructuredLog;
use std::path::Path;
use std::sync::Arc;

/// Graph runtime builder - turns a loaded [`GraphConfig`] into a frozen [`Graph`].
///
/// Child functions that point at a config file are loaded and built as well,
/// so the graph can run them in-process when all functions are local.
///
/// # Examples
///
/// ```
/// use serving_graph::backends::local::HandlerRegistry;
/// use serving_graph::config::{GraphConfig, RuntimeBuilder};
/// use std::path::Path;
///
/// let cfg = GraphConfig::parse_yaml(
///     "name: echo\nsteps:\n  - { name: echo, kind: task, handler: identity, responder: true }\n",
///     Path::new("echo.yaml"),
/// )
/// .unwrap();
///
/// let graph = RuntimeBuilder::from_config(&cfg, HandlerRegistry::with_builtins(), Path::new(".")).unwrap();
/// assert_eq!(graph.start(), ["echo".to_string()]);
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build a graph from `cfg`, resolving relative paths against `base_dir`.
    ///
    /// The registry's model store is replaced by one rooted at the configured
    /// model store root (or `base_dir`).
    pub fn from_config(
        cfg: &GraphConfig,
        registry: HandlerRegistry,
        base_dir: &Path,
    ) -> Result<Graph, ConfigError> {
        let mut registry = registry;
        let model_root = match &cfg.model_store.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => base_dir.join(root),
            None => base_dir.to_path_buf(),
        };
        registry.set_model_store(Arc::new(LocalModelStore::new(model_root)));

        let mut builder = GraphBuilder::new(&cfg.name);
        if let Some(topology) = cfg.topology {
            builder.set_topology(topology)?;
        } else if !cfg.routes.is_empty() {
            builder.set_topology(Topology::Router)?;
        }
        if let Some(prefix) = &cfg.routing_prefix {
            builder.routing_prefix(prefix);
        }

        for route in &cfg.routes {
            builder.add_route(DEFAULT_ROUTER_NAME, route.clone())?;
        }
        for step in &cfg.steps {
            builder.add_step(step.clone())?;
        }
        for start in cfg.start.iter().flatten() {
            builder.start_with(start);
        }
        if let Some(handler) = &cfg.error_handler {
            builder.error_handler(handler);
        }
        if let Some(stream) = &cfg.error_stream {
            builder.error_stream(stream);
        }

        for (name, child_cfg) in &cfg.child_functions {
            let child = Self::child_function(name, child_cfg, &registry, base_dir)?;
            builder.add_child_function(name, child);
        }

        builder
            .executor_options(cfg.executor_options.clone())
            .retry(cfg.retry.clone())
            .with_registry(registry);
        Ok(builder.build()?)
    }

    /// Load the config at `path` and build it with `registry`.
    pub fn from_path<P: AsRef<Path>>(path: P, registry: HandlerRegistry) -> Result<Graph, ConfigError> {
        let path = path.as_ref();
        let cfg = load_config(path)?;
        Self::from_config(&cfg, registry, config_dir(path))
    }

    fn child_function(
        name: &str,
        child_cfg: &crate::config::loader::ChildFunctionConfig,
        registry: &HandlerRegistry,
        base_dir: &Path,
    ) -> Result<ChildFunction, ConfigError> {
        let graph = match &child_cfg.config {
            Some(config) => {
                let path = base_dir.join(config);
                let graph = Self::from_path(&path, registry.clone())?;
                ChildFunctionLoaded {
                    function: name,
                    path: &path,
                }
                .log();
                Some(Arc::new(graph))
            }
            None => None,
        };
        if graph.is_none() && child_cfg.url.is_none() {
            return Err(ConfigError::EmptyChildFunction {
                name: name.to_string(),
            });
        }
        Ok(ChildFunction {
            url: child_cfg.url.clone(),
            graph,
        })
    }
}
