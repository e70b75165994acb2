// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::local::HandlerRegistry;
use crate::config::runtime::RuntimeBuilder;
use crate::errors::ConfigError;
use crate::graph::{StepSpec, Topology};
use crate::observability::messages::validation::ConfigLoaded;
use crate::observability::messages::StructuredLog;
use crate::remote::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Declarative definition of one serving graph.
///
/// Loaded from YAML (`.yaml`/`.yml`) or TOML (`.toml`). Router graphs list
/// their models under `routes` and may add error targets under `steps`;
/// flow graphs list `steps` wired with `to`.
///
/// # Example
/// ```yaml
/// name: fraud
/// topology: flow
/// executor_options:
///   init_on_start: true
///   max_concurrency: 8
/// steps:
///   - name: enrich
///     kind: task
///     handler: augment
///     options: { source: web }
///     to: [models]
///   - name: models
///     kind: router
///     responder: true
///     routes:
///       - name: model1
///         kind: task
///         handler: linear
///         model_path: models/model1.json
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub name: String,
    #[serde(default)]
    pub topology: Option<Topology>,
    #[serde(default)]
    pub routing_prefix: Option<String>,
    /// Explicit start steps; otherwise every step nothing points at
    #[serde(default)]
    pub start: Option<Vec<String>>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    /// Routes of the root router of a router graph
    #[serde(default)]
    pub routes: Vec<StepSpec>,
    #[serde(default)]
    pub error_handler: Option<String>,
    #[serde(default)]
    pub error_stream: Option<String>,
    #[serde(default)]
    pub executor_options: ExecutorOptions,
    /// Default for remote calls, queue publishes and queue consumers
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub model_store: ModelStoreConfig,
    #[serde(default)]
    pub child_functions: BTreeMap<String, ChildFunctionConfig>,
}

/// Executor-specific configuration options.
///
/// # Fields
/// * `init_on_start` - Run every step's init when the graph starts instead of
///   on first use; a failing init then refuses to start the graph
/// * `max_concurrency` - Maximum number of requests executing at once
/// * `request_timeout_ms` - Deadline for a single request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOptions {
    #[serde(default)]
    pub init_on_start: bool,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

/// Where model artifacts are read from. Relative roots resolve against the
/// config file's directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelStoreConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// A child function: a deployed url, a graph config to run in-process, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChildFunctionConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub config: Option<PathBuf>,
}

impl GraphConfig {
    pub fn parse_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn step_count(&self) -> usize {
        self.steps.len() + self.routes.len()
    }
}

/// Read and parse a graph config, picking the format from the extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GraphConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let cfg = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => GraphConfig::parse_yaml(&content, path)?,
        Some("toml") => GraphConfig::parse_toml(&content, path)?,
        _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    };

    ConfigLoaded {
        path,
        graph: &cfg.name,
        step_count: cfg.step_count(),
    }
    .log();
    Ok(cfg)
}

/// Load a config and check it builds into a valid graph with the built-in
/// handlers. Every validation problem is reported in one error.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<GraphConfig, ConfigError> {
    load_and_validate_config_with(path, HandlerRegistry::with_builtins())
}

/// As [`load_and_validate_config`], resolving handlers against `registry`.
pub fn load_and_validate_config_with<P: AsRef<Path>>(
    path: P,
    registry: HandlerRegistry,
) -> Result<GraphConfig, ConfigError> {
    let path = path.as_ref();
    let cfg = load_config(path)?;
    RuntimeBuilder::from_config(&cfg, registry, config_dir(path))?;
    Ok(cfg)
}

/// Directory relative paths in a config resolve against.
pub fn config_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{BuildError, ValidationError};
    use crate::graph::StepKind;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn parse_router_config() {
        let yaml = r#"
name: models
topology: router
routes:
  - name: model1
    kind: task
    handler: linear
    model_path: m1.json
  - name: model2
    kind: task
    handler: linear
    model_path: m2.json
    options: { threshold: 0.5 }
"#;
        let cfg = GraphConfig::parse_yaml(yaml, Path::new("inline.yaml")).unwrap();
        assert_eq!(cfg.topology, Some(Topology::Router));
        assert_eq!(cfg.routes.len(), 2);
        assert_eq!(cfg.step_count(), 2);
        let StepKind::Task(task) = &cfg.routes[1].kind else {
            panic!("expected task");
        };
        assert_eq!(task.model_path.as_deref(), Some("m2.json"));
        assert!(!cfg.executor_options.init_on_start);
    }

    #[test]
    fn parse_toml_flow_config() {
        let toml = r#"
name = "pipeline"

[executor_options]
init_on_start = true
request_timeout_ms = 250

[[steps]]
name = "a"
kind = "task"
handler = "identity"
to = ["q"]

[[steps]]
name = "q"
kind = "queue"
partitions = 4
"#;
        let cfg = GraphConfig::parse_toml(toml, Path::new("inline.toml")).unwrap();
        assert_eq!(cfg.steps.len(), 2);
        assert_eq!(cfg.steps[0].to, vec!["q"]);
        assert!(cfg.executor_options.init_on_start);
        assert_eq!(cfg.executor_options.request_timeout_ms, Some(250));
        let StepKind::Queue(queue) = &cfg.steps[1].kind else {
            panic!("expected queue");
        };
        assert_eq!(queue.partitions, 4);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "graph.json", "{}");
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            load_config("/no/such/graph.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn validation_reports_cycles() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "cyclic.yaml",
            r#"
name: cyclic
start: [a]
steps:
  - { name: a, kind: task, handler: identity, to: [b] }
  - { name: b, kind: task, handler: identity, to: [a] }
"#,
        );
        let err = load_and_validate_config(&path).unwrap_err();
        let ConfigError::Build(BuildError::Validation(errors)) = &err else {
            panic!("expected validation failure, got {err}");
        };
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::CyclicDependency { .. })));
        assert!(err.to_string().contains("Cyclic dependency detected"));
    }

    #[test]
    fn validation_reports_unknown_successor() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "dangling.yaml",
            r#"
name: dangling
steps:
  - { name: a, kind: task, handler: identity, to: [nonexistent] }
"#,
        );
        let err = load_and_validate_config(&path).unwrap_err();
        assert!(err
            .to_string()
            .contains("routes to 'nonexistent' which does not exist"));
    }

    #[test]
    fn config_dir_of_bare_file_is_cwd() {
        assert_eq!(config_dir(Path::new("graph.yaml")), Path::new("."));
        assert_eq!(config_dir(Path::new("configs/graph.yaml")), Path::new("configs"));
    }
}
