#[cfg(test)]
mod integration_tests {
    use crate::backends::local::HandlerRegistry;
    use crate::config::{load_and_validate_config, load_config, RuntimeBuilder};
    use crate::graph::{QueueTransport, StepKind, Topology};
    use std::path::Path;

    /// Test that the router configuration loads and builds with a root router
    #[test]
    fn test_router_yaml_loading() {
        let config = load_and_validate_config("configs/router.yaml").unwrap();

        assert_eq!(config.name, "models");
        assert_eq!(config.topology, Some(Topology::Router));
        assert!(config.steps.is_empty());
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].name, "model1");

        let StepKind::Task(task) = &config.routes[0].kind else {
            panic!("model1 should be a task");
        };
        assert_eq!(task.handler, "linear");
        assert_eq!(task.model_path.as_deref(), Some("model1.json"));
        assert_eq!(task.options.get("threshold").and_then(|v| v.as_f64()), Some(0.0));
    }

    /// Test a flow whose last step is a router
    #[test]
    fn test_flow_yaml_loading() {
        let config = load_and_validate_config("configs/flow.yaml").unwrap();
        assert_eq!(config.topology, Some(Topology::Flow));
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.steps[0].to, vec!["models"]);
        assert!(config.steps[1].responder);

        let graph =
            RuntimeBuilder::from_config(&config, HandlerRegistry::with_builtins(), Path::new("configs"))
                .unwrap();
        assert_eq!(graph.start(), ["enrich".to_string()]);
        let StepKind::Router(router) = &graph.step("models").unwrap().kind else {
            panic!("models should be a router");
        };
        assert_eq!(router.route_names(), vec!["m1", "m2"]);
    }

    /// Test the TOML pipeline: queue hop, error stream and executor options
    #[test]
    fn test_pipeline_toml_loading() {
        let config = load_and_validate_config("configs/pipeline.toml").unwrap();

        assert_eq!(config.error_stream.as_deref(), Some("errors"));
        assert!(config.executor_options.init_on_start);
        assert_eq!(config.executor_options.request_timeout_ms, Some(5000));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 5);

        let StepKind::Queue(queue) = &config.steps[1].kind else {
            panic!("events should be a queue");
        };
        assert_eq!(queue.transport, QueueTransport::Memory);
        assert_eq!(queue.partitions, 2);
        assert_eq!(queue.partition_key.as_deref(), Some("customer"));

        let graph =
            RuntimeBuilder::from_path("configs/pipeline.toml", HandlerRegistry::with_builtins())
                .unwrap();
        // the error stream is detached from start
        assert_eq!(graph.start(), ["ingest".to_string()]);
    }

    /// Test child functions declared with both a url and an in-process config
    #[test]
    fn test_parent_yaml_loads_child_function() {
        let config = load_config("configs/parent.yaml").unwrap();
        let scorer = &config.child_functions["scorer"];
        assert!(scorer.url.as_deref().unwrap().ends_with("/v2/models/score/infer"));
        assert_eq!(scorer.config.as_deref(), Some(Path::new("scorer.yaml")));

        let graph =
            RuntimeBuilder::from_path("configs/parent.yaml", HandlerRegistry::with_builtins())
                .unwrap();
        let child = &graph.children()["scorer"];
        let child_graph = child.graph.as_ref().unwrap();
        assert_eq!(child_graph.name(), "scorer");
        assert_eq!(child_graph.start(), ["score".to_string()]);
    }

    /// Unknown handler names are reported instead of failing on first request
    #[test]
    fn test_missing_handler_fails_validation() {
        let err = load_and_validate_config("configs/router.yaml")
            .and_then(|_| {
                crate::config::load_and_validate_config_with(
                    "configs/router.yaml",
                    HandlerRegistry::new(),
                )
            })
            .unwrap_err();
        assert!(err.to_string().contains("linear"), "unexpected error: {}", err);
    }
}
