#[cfg(test)]
mod integration_tests {
    use futures::future::join_all;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::backends::local::HandlerRegistry;
    use crate::backends::stub::{
        CountingFactory, FailingHandler, PanickingHandler, RecordingHandler, SlowHandler,
        TrailHandler,
    };
    use crate::config::consts::{CORRELATION_ID_HEADER, DEFAULT_ROUTER_NAME};
    use crate::config::{ExecutorOptions, RuntimeBuilder};
    use crate::errors::BuildError;
    use crate::event::{Event, Response};
    use crate::graph::{ChildFunction, Graph, GraphBuilder, StepSpec, Topology};
    use crate::remote::RetryPolicy;
    use crate::server::{GraphServer, ServeOptions};
    use crate::simulation::LocalSimulation;
    use crate::traits::Handler;

    const IRIS_ROW: [f64; 4] = [5.1, 3.5, 1.4, 0.2];

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 1.0,
            max_backoff_ms: 1,
        }
    }

    fn share<H: Handler + 'static>(registry: &mut HandlerRegistry, name: &str, handler: Arc<H>) {
        registry.register_fn(name, move |_| Ok(handler.clone() as Arc<dyn Handler>));
    }

    fn test_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::with_builtins();
        for tag in ["a", "b", "c"] {
            share(&mut registry, tag, Arc::new(TrailHandler::new(tag)));
        }
        share(&mut registry, "fail", Arc::new(FailingHandler::new("boom")));
        share(&mut registry, "panic", Arc::new(PanickingHandler));
        registry
    }

    async fn serve(graph: Graph) -> GraphServer {
        GraphServer::start(graph, ServeOptions::default())
            .await
            .unwrap()
    }

    fn error_kind(response: &Response) -> &str {
        response.body["error"]["kind"].as_str().unwrap_or_default()
    }

    /// Events seen by `recorder` once it holds `count` of them, or after two seconds.
    async fn recorded(recorder: &RecordingHandler, count: usize) -> Vec<Event> {
        for _ in 0..200 {
            if recorder.events().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        recorder.events()
    }

    async fn pending_after_settling(server: &GraphServer) -> usize {
        for _ in 0..200 {
            if server.pending().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        server.pending().await
    }

    /// Router graph from configs/router.yaml: model1 classifies one iris row.
    #[tokio::test]
    async fn test_router_config_serves_model1() {
        let graph =
            RuntimeBuilder::from_path("configs/router.yaml", HandlerRegistry::with_builtins())
                .unwrap();
        assert_eq!(graph.topology(), Topology::Router);
        let server = serve(graph).await;

        let event = Event::new("/v2/models/model1/infer", json!({ "inputs": [IRIS_ROW] }));
        let id = event.id.clone();
        let response = server.invoke(event).await;

        assert_eq!(response.status, 200, "body: {}", response.body);
        assert_eq!(response.id, id);
        assert_eq!(response.body["model_name"], "model1");
        assert_eq!(response.body["model_version"], "1");
        assert_eq!(response.body["id"], json!(id));
        assert_eq!(response.body["outputs"].as_array().unwrap().len(), 1);
    }

    /// Flow + router from configs/flow.yaml: enrich, then model m1 scores two rows.
    #[tokio::test]
    async fn test_flow_config_enriches_then_routes() {
        let graph =
            RuntimeBuilder::from_path("configs/flow.yaml", HandlerRegistry::with_builtins())
                .unwrap();
        assert_eq!(graph.topology(), Topology::Flow);
        let server = serve(graph).await;

        let response = server
            .invoke(Event::new(
                "/v2/models/m1/infer",
                json!({ "inputs": [IRIS_ROW, [6.7, 3.0, 5.2, 2.3]] }),
            ))
            .await;

        assert_eq!(response.status, 200, "body: {}", response.body);
        assert_eq!(response.body["model_name"], "m1");
        assert_eq!(response.body["outputs"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_route_is_not_found() {
        let graph =
            RuntimeBuilder::from_path("configs/router.yaml", HandlerRegistry::with_builtins())
                .unwrap();
        let server = serve(graph).await;

        let response = server
            .invoke(Event::new("/v2/models/model2/infer", json!({ "inputs": [IRIS_ROW] })))
            .await;

        assert_eq!(response.status, 404);
        assert_eq!(error_kind(&response), "RouteNotFoundError");
        assert_eq!(response.body["error"]["available"], json!(["model1"]));
    }

    #[tokio::test]
    async fn test_router_lists_models_without_key() {
        let graph =
            RuntimeBuilder::from_path("configs/router.yaml", HandlerRegistry::with_builtins())
                .unwrap();
        let server = serve(graph).await;

        let response = server
            .invoke(Event::new("/v2/models", Value::Null).with_method("GET"))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "models": ["model1"] }));
    }

    #[test]
    fn test_topology_cannot_change_once_steps_exist() {
        let mut builder = GraphBuilder::new("g");
        builder.add_step(StepSpec::task("a", "identity")).unwrap();
        assert!(matches!(
            builder.set_topology(Topology::Router),
            Err(BuildError::TopologyConflict {
                current: Topology::Flow,
                requested: Topology::Router
            })
        ));
        assert!(builder.set_topology(Topology::Flow).is_ok());
    }

    /// Invoking route A never touches route B.
    #[tokio::test]
    async fn test_router_routes_are_isolated() {
        let route_a = CountingFactory::new();
        let route_b = CountingFactory::new();
        let mut registry = HandlerRegistry::new();
        registry.register("count_a", Arc::new(route_a.clone()));
        registry.register("count_b", Arc::new(route_b.clone()));

        let mut builder = GraphBuilder::new("isolated");
        builder.set_topology(Topology::Router).unwrap();
        builder
            .add_route(DEFAULT_ROUTER_NAME, StepSpec::task("A", "count_a"))
            .unwrap()
            .add_route(DEFAULT_ROUTER_NAME, StepSpec::task("B", "count_b"))
            .unwrap();
        builder.with_registry(registry);
        let server = serve(builder.build().unwrap()).await;

        for _ in 0..3 {
            let response = server.invoke(Event::new("/v2/models/A/infer", json!({}))).await;
            assert_eq!(response.body["served_by"], "A");
        }
        assert_eq!(route_a.init_count(), 1);
        assert_eq!(route_a.call_count(), 3);
        assert_eq!(route_b.init_count(), 0);
        assert_eq!(route_b.call_count(), 0);
    }

    /// Concurrent first requests share one init.
    #[tokio::test]
    async fn test_init_runs_once_per_graph() {
        let factory = CountingFactory::new().with_init_delay(Duration::from_millis(20));
        let mut registry = HandlerRegistry::new();
        registry.register("count", Arc::new(factory.clone()));

        let mut builder = GraphBuilder::new("lazy");
        builder.add_step(StepSpec::task("t", "count").responder()).unwrap();
        builder.with_registry(registry);
        let server = serve(builder.build().unwrap()).await;

        let requests = (0..10).map(|i| server.invoke(Event::new("/", json!(i))));
        let responses = join_all(requests).await;

        assert!(responses.iter().all(|r| r.status == 200));
        assert_eq!(factory.init_count(), 1);
        assert_eq!(factory.call_count(), 10);
    }

    #[tokio::test]
    async fn test_eager_init_happens_before_first_request() {
        let factory = CountingFactory::new();
        let mut registry = HandlerRegistry::new();
        registry.register("count", Arc::new(factory.clone()));

        let mut builder = GraphBuilder::new("eager");
        builder.add_step(StepSpec::task("t", "count")).unwrap();
        builder
            .executor_options(ExecutorOptions {
                init_on_start: true,
                ..Default::default()
            })
            .with_registry(registry);
        let server = serve(builder.build().unwrap()).await;
        assert_eq!(factory.init_count(), 1);

        server.invoke(Event::new("/", json!(1))).await;
        assert_eq!(factory.init_count(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_responder_wins() {
        let mut builder = GraphBuilder::new("fan");
        builder.add_step(StepSpec::task("a", "a").to(["b", "c"])).unwrap();
        builder.add_step(StepSpec::task("b", "b")).unwrap();
        builder.add_step(StepSpec::task("c", "c").responder()).unwrap();
        builder.with_registry(test_registry());
        let server = serve(builder.build().unwrap()).await;

        let response = server.invoke(Event::new("/", json!({}))).await;
        assert_eq!(response.body, json!({ "trail": ["a", "c"] }));
    }

    #[tokio::test]
    async fn test_fan_out_without_responder_takes_first_branch() {
        let mut builder = GraphBuilder::new("fan");
        builder.add_step(StepSpec::task("a", "a").to(["b", "c"])).unwrap();
        builder.add_step(StepSpec::task("b", "b")).unwrap();
        builder.add_step(StepSpec::task("c", "c")).unwrap();
        builder.with_registry(test_registry());
        let server = serve(builder.build().unwrap()).await;

        let response = server.invoke(Event::new("/", json!({}))).await;
        assert_eq!(response.body, json!({ "trail": ["a", "b"] }));
    }

    /// A step with two predecessors runs once for each branch reaching it.
    #[tokio::test]
    async fn test_merge_step_runs_once_per_incoming_branch() {
        let recorder = Arc::new(RecordingHandler::new());
        let mut registry = test_registry();
        share(&mut registry, "record", recorder.clone());

        let mut builder = GraphBuilder::new("merge");
        builder.add_step(StepSpec::task("a", "a").to(["b", "c"])).unwrap();
        builder.add_step(StepSpec::task("b", "b")).unwrap();
        builder.add_step(StepSpec::task("c", "c")).unwrap();
        builder
            .add_step(StepSpec::task("out", "record").after(["b", "c"]))
            .unwrap();
        builder.with_registry(registry);
        let sim = LocalSimulation::new(builder.build().unwrap()).await.unwrap();

        let response = sim.test("/", json!({})).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "trail": ["a", "b"] }));

        let mut trails: Vec<Value> = recorder
            .events()
            .into_iter()
            .map(|event| event.body["trail"].clone())
            .collect();
        trails.sort_by_key(|trail| trail.to_string());
        assert_eq!(trails, vec![json!(["a", "b"]), json!(["a", "c"])]);
    }

    /// The response goes out as soon as the responder has run.
    #[tokio::test]
    async fn test_responder_does_not_wait_for_sibling_branches() {
        let mut registry = test_registry();
        share(
            &mut registry,
            "slow",
            Arc::new(SlowHandler {
                delay: Duration::from_secs(2),
            }),
        );

        let mut builder = GraphBuilder::new("early");
        builder.add_step(StepSpec::task("resp", "a").responder()).unwrap();
        builder.add_step(StepSpec::task("bg", "slow")).unwrap();
        builder.with_registry(registry);
        let server = serve(builder.build().unwrap()).await;

        let started = std::time::Instant::now();
        let response = server.invoke(Event::new("/", json!({}))).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "trail": ["a"] }));
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "response took {:?}",
            started.elapsed()
        );
    }

    /// Failures after the response never replace it; they go to the error stream.
    #[tokio::test]
    async fn test_failure_after_the_response_goes_to_the_error_stream() {
        let recorder = Arc::new(RecordingHandler::new());
        let mut registry = test_registry();
        share(&mut registry, "record", recorder.clone());

        let mut builder = GraphBuilder::new("late");
        builder
            .add_step(StepSpec::task("resp", "a").to(["after"]).responder())
            .unwrap();
        builder.add_step(StepSpec::task("after", "fail")).unwrap();
        builder.add_step(StepSpec::queue("errors").to(["dead"])).unwrap();
        builder.add_step(StepSpec::task("dead", "record")).unwrap();
        builder.error_stream("errors").with_registry(registry);
        let server = serve(builder.build().unwrap()).await;

        let response = server.invoke(Event::new("/", json!({}))).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "trail": ["a"] }));

        let dead = recorded(&recorder, 1).await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body["step"], "after");
        assert_eq!(dead[0].body["kind"], "StepHandlerError");
        assert_eq!(dead[0].body["event"], json!({ "trail": ["a"] }));
    }

    #[tokio::test]
    async fn test_panicking_step_does_not_take_down_the_graph() {
        let mut builder = GraphBuilder::new("panics");
        builder.set_topology(Topology::Router).unwrap();
        builder
            .add_route(DEFAULT_ROUTER_NAME, StepSpec::task("boom", "panic"))
            .unwrap()
            .add_route(DEFAULT_ROUTER_NAME, StepSpec::task("fine", "a"))
            .unwrap();
        builder.with_registry(test_registry());
        let server = serve(builder.build().unwrap()).await;

        let failed = server.invoke(Event::new("/v2/models/boom/infer", json!({}))).await;
        assert_eq!(failed.status, 500);
        assert_eq!(error_kind(&failed), "StepHandlerError");
        assert_eq!(failed.body["error"]["step"], "boom");

        let ok = server.invoke(Event::new("/v2/models/fine/infer", json!({}))).await;
        assert_eq!(ok.status, 200);
        assert_eq!(ok.body, json!({ "trail": ["a"] }));
    }

    #[tokio::test]
    async fn test_error_handler_result_becomes_the_body() {
        let mut builder = GraphBuilder::new("handled");
        builder.add_step(StepSpec::task("a", "fail")).unwrap();
        builder
            .add_step(StepSpec::task("on_error", "augment").option("handled", json!(true)))
            .unwrap();
        builder.error_handler("on_error").with_registry(test_registry());
        let server = serve(builder.build().unwrap()).await;

        let response = server.invoke(Event::new("/", json!({ "x": 1 }))).await;

        assert_eq!(response.status, 500);
        assert_eq!(response.body["handled"], true);
        assert_eq!(response.body["step"], "a");
        assert_eq!(response.body["origin"], "handled");
        assert_eq!(response.body["event"], json!({ "x": 1 }));
        assert!(response.body["error"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_failures_are_published_to_the_error_stream() {
        let recorder = Arc::new(RecordingHandler::new());
        let mut registry = test_registry();
        share(&mut registry, "record", recorder.clone());

        let mut builder = GraphBuilder::new("streamed");
        builder.add_step(StepSpec::task("a", "fail")).unwrap();
        builder.add_step(StepSpec::queue("errors").to(["sink"])).unwrap();
        builder.add_step(StepSpec::task("sink", "record")).unwrap();
        builder.error_stream("errors").with_registry(registry);
        let sim = LocalSimulation::new(builder.build().unwrap()).await.unwrap();

        let event = Event::new("/", json!({ "x": 1 }));
        let id = event.id.clone();
        let response = sim.run(event).await;
        assert_eq!(response.status, 500);
        assert_eq!(error_kind(&response), "StepHandlerError");

        let published = recorder.events();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, id);
        assert_eq!(published[0].body["step"], "a");
        assert_eq!(published[0].body["origin"], "streamed");
        assert_eq!(published[0].body["event"], json!({ "x": 1 }));
    }

    /// Correlation id and payload survive a queue hop unchanged.
    async fn assert_queue_round_trip(queue: StepSpec) {
        let recorder = Arc::new(RecordingHandler::new());
        let mut registry = HandlerRegistry::with_builtins();
        share(&mut registry, "record", recorder.clone());
        let queue_name = queue.name.clone();

        let mut builder = GraphBuilder::new("hop");
        builder
            .add_step(StepSpec::task("first", "identity").to([queue_name.as_str()]).responder())
            .unwrap();
        builder.add_step(queue.to(["sink"])).unwrap();
        builder.add_step(StepSpec::task("sink", "record")).unwrap();
        builder.with_registry(registry);
        let sim = LocalSimulation::new(builder.build().unwrap()).await.unwrap();

        let body = json!({ "text": "héllo ✓", "n": [1, 2.5, null], "nested": { "deep": [true] } });
        let event = Event::new("/ingest", body.clone()).with_header("x-tenant", "acme");
        let response = sim.run(event.clone()).await;
        assert_eq!(response.status, 200);

        let delivered = recorder.events();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, event.id);
        assert_eq!(delivered[0].body, body);
        assert_eq!(delivered[0].headers, event.headers);
        assert_eq!(
            serde_json::to_vec(&delivered[0].body).unwrap(),
            serde_json::to_vec(&body).unwrap()
        );
        assert_eq!(sim.pending().await, 0);
    }

    #[tokio::test]
    async fn test_memory_queue_round_trip() {
        assert_queue_round_trip(StepSpec::queue("q")).await;
    }

    #[tokio::test]
    async fn test_file_queue_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_queue_round_trip(StepSpec::file_queue("q", dir.path())).await;
    }

    /// A failed consumer is redelivered until the retry policy runs out.
    #[tokio::test]
    async fn test_queue_consumer_failure_is_redelivered() {
        let sink = CountingFactory::new().failing_first(1);
        let mut registry = HandlerRegistry::with_builtins();
        registry.register("count", Arc::new(sink.clone()));

        let mut builder = GraphBuilder::new("redeliver");
        builder
            .add_step(StepSpec::task("first", "identity").to(["q"]).responder())
            .unwrap();
        builder
            .add_step(StepSpec::queue("q").to(["sink"]).with_retry(fast_retry(3)))
            .unwrap();
        builder.add_step(StepSpec::task("sink", "count")).unwrap();
        builder.with_registry(registry);
        let sim = LocalSimulation::new(builder.build().unwrap()).await.unwrap();

        let response = sim.test("/", json!({ "n": 1 })).await;
        assert_eq!(response.status, 200);
        assert_eq!(sink.init_count(), 2);
        assert_eq!(sink.call_count(), 1);
        assert_eq!(sim.pending().await, 0);
    }

    /// Router graphs hand route failures to a detached error handler step.
    #[tokio::test]
    async fn test_router_error_handler_catches_route_failures() {
        let mut builder = GraphBuilder::new("guarded");
        builder.set_topology(Topology::Router).unwrap();
        builder
            .add_route(DEFAULT_ROUTER_NAME, StepSpec::task("boom", "fail"))
            .unwrap();
        builder
            .add_step(StepSpec::task("on_error", "augment").option("handled", json!(true)))
            .unwrap();
        builder.error_handler("on_error").with_registry(test_registry());
        let server = serve(builder.build().unwrap()).await;

        let response = server
            .invoke(Event::new("/v2/models/boom/infer", json!({ "x": 1 })))
            .await;
        assert_eq!(response.status, 500);
        assert_eq!(response.body["handled"], true);
        assert_eq!(response.body["step"], "boom");
        assert_eq!(response.body["event"], json!({ "x": 1 }));
    }

    /// Consumer failures never reach the producer's caller.
    #[tokio::test]
    async fn test_exhausted_consumer_goes_to_error_stream() {
        let recorder = Arc::new(RecordingHandler::new());
        let mut registry = test_registry();
        share(&mut registry, "record", recorder.clone());

        let mut builder = GraphBuilder::new("exhausted");
        builder
            .add_step(StepSpec::task("first", "identity").to(["q"]).responder())
            .unwrap();
        builder
            .add_step(StepSpec::queue("q").to(["sink"]).with_retry(fast_retry(2)))
            .unwrap();
        builder.add_step(StepSpec::task("sink", "fail")).unwrap();
        builder.add_step(StepSpec::queue("errors").to(["dead"])).unwrap();
        builder.add_step(StepSpec::task("dead", "record")).unwrap();
        builder.error_stream("errors").with_registry(registry);
        let sim = LocalSimulation::new(builder.build().unwrap()).await.unwrap();

        let response = sim.test("/", json!({ "n": 1 })).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "n": 1 }));

        let dead = recorder.events();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body["step"], "sink");
        assert_eq!(dead[0].body["event"], json!({ "n": 1 }));
        assert_eq!(sim.pending().await, 0);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let mut registry = HandlerRegistry::new();
        share(
            &mut registry,
            "slow",
            Arc::new(SlowHandler {
                delay: Duration::from_millis(500),
            }),
        );

        let mut builder = GraphBuilder::new("slow");
        builder.add_step(StepSpec::task("t", "slow")).unwrap();
        builder
            .executor_options(ExecutorOptions {
                request_timeout_ms: Some(20),
                ..Default::default()
            })
            .with_registry(registry);
        let server = serve(builder.build().unwrap()).await;

        let response = server.invoke(Event::new("/", json!({}))).await;
        assert_eq!(response.status, 504);
        assert_eq!(error_kind(&response), "TimeoutError");
    }

    /// Nothing listens on the discard port; retries run out and the failure
    /// surfaces as a handler error instead of hanging.
    #[tokio::test]
    async fn test_unreachable_remote_surfaces_step_handler() {
        let mut builder = GraphBuilder::new("remote");
        builder
            .add_step(
                StepSpec::remote("call", "http://127.0.0.1:9/score")
                    .with_retry(fast_retry(2))
                    .responder(),
            )
            .unwrap();
        let server = serve(builder.build().unwrap()).await;

        let response = tokio::time::timeout(
            Duration::from_secs(10),
            server.invoke(Event::new("/", json!({ "x": 1 }))),
        )
        .await
        .expect("remote call should not hang");

        assert_eq!(response.status, 500);
        assert_eq!(error_kind(&response), "StepHandlerError");
        assert_eq!(response.body["error"]["step"], "call");
    }

    #[tokio::test]
    async fn test_remote_child_function_over_http() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/models/score/infer"))
            .and(header(CORRELATION_ID_HEADER, "req-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "outputs": [0.5] })))
            .expect(1)
            .mount(&mock)
            .await;

        let mut builder = GraphBuilder::new("caller");
        builder
            .add_step(StepSpec::child_function("score", "scorer").responder())
            .unwrap();
        builder.add_child_function(
            "scorer",
            ChildFunction::remote(format!("{}/v2/models/score/infer", mock.uri())),
        );
        let server = serve(builder.build().unwrap()).await;

        let response = server
            .invoke(Event::new("/", json!({ "inputs": [IRIS_ROW] })).with_id("req-1"))
            .await;
        assert_eq!(response.status, 200, "body: {}", response.body);
        assert_eq!(response.body, json!({ "outputs": [0.5] }));
    }

    #[tokio::test]
    async fn test_fire_and_forget_remote_continues_immediately() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&mock)
            .await;

        let mut builder = GraphBuilder::new("notify");
        builder
            .add_step(
                StepSpec::remote("notify", format!("{}/hook", mock.uri()))
                    .configure_remote(|remote| remote.fire_and_forget = true)
                    .responder(),
            )
            .unwrap();
        let server = serve(builder.build().unwrap()).await;

        let response = server.invoke(Event::new("/", json!({ "ping": 1 }))).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "ping": 1 }));

        let mut received = 0;
        for _ in 0..100 {
            received = mock.received_requests().await.map(|r| r.len()).unwrap_or(0);
            if received > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received, 1);
    }

    #[tokio::test]
    async fn test_cancellation_reaches_inflight_remote_calls() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock)
            .await;

        let mut builder = GraphBuilder::new("cancelled");
        builder
            .add_step(StepSpec::remote("call", mock.uri()).responder())
            .unwrap();
        let server = serve(builder.build().unwrap()).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let response = tokio::time::timeout(
            Duration::from_secs(3),
            server.invoke_with_cancel(Event::new("/", json!({})), cancel),
        )
        .await
        .expect("cancellation should abort the call");
        assert_eq!(response.status, 503);
        assert_eq!(error_kind(&response), "CancelledError");
    }

    /// Fire-and-forget calls go through an outbox queue; once its retries run
    /// out the call lands on the error stream.
    #[tokio::test]
    async fn test_failed_fire_and_forget_call_reaches_the_error_stream() {
        let recorder = Arc::new(RecordingHandler::new());
        let mut registry = test_registry();
        share(&mut registry, "record", recorder.clone());

        let mut builder = GraphBuilder::new("notify");
        builder
            .add_step(
                StepSpec::remote("notify", "http://127.0.0.1:9/hook")
                    .configure_remote(|remote| remote.fire_and_forget = true)
                    .with_retry(fast_retry(2))
                    .responder(),
            )
            .unwrap();
        builder.add_step(StepSpec::queue("errors").to(["dead"])).unwrap();
        builder.add_step(StepSpec::task("dead", "record")).unwrap();
        builder.error_stream("errors").with_registry(registry);
        let server = serve(builder.build().unwrap()).await;

        let response = server.invoke(Event::new("/", json!({ "ping": 1 }))).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "ping": 1 }));

        let dead = recorded(&recorder, 1).await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].body["step"], "notify");
        assert_eq!(dead[0].body["kind"], "StepHandlerError");
        assert_eq!(dead[0].body["event"], json!({ "ping": 1 }));
        assert_eq!(pending_after_settling(&server).await, 0);
    }

    /// Cancelling a request leaves records it already published to their consumers.
    #[tokio::test]
    async fn test_cancellation_leaves_published_records_alone() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock)
            .await;

        let recorder = Arc::new(RecordingHandler::new());
        let mut registry = test_registry();
        share(&mut registry, "record", recorder.clone());

        let mut builder = GraphBuilder::new("cancelled_after_publish");
        builder.add_step(StepSpec::task("a", "a").to(["q", "call"])).unwrap();
        builder.add_step(StepSpec::queue("q").to(["sink"])).unwrap();
        builder.add_step(StepSpec::task("sink", "record")).unwrap();
        builder
            .add_step(StepSpec::remote("call", mock.uri()).responder())
            .unwrap();
        builder.with_registry(registry);
        let server = serve(builder.build().unwrap()).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let response = tokio::time::timeout(
            Duration::from_secs(3),
            server.invoke_with_cancel(Event::new("/", json!({})), cancel),
        )
        .await
        .expect("cancellation should abort the call");
        assert_eq!(response.status, 503);

        let delivered = recorded(&recorder, 1).await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].body, json!({ "trail": ["a"] }));
        assert_eq!(pending_after_settling(&server).await, 0);
    }

    /// Simulation and deployed serving give the same result once every child
    /// function resolves in-process.
    #[tokio::test]
    async fn test_simulation_matches_deployed_serving() {
        let graph =
            RuntimeBuilder::from_path("configs/parent.yaml", HandlerRegistry::with_builtins())
                .unwrap();
        let event = Event::new("/score", json!({ "inputs": [IRIS_ROW] })).with_id("same-id");

        let sim = LocalSimulation::new(graph.clone()).await.unwrap();
        let simulated = sim.run(event.clone()).await;

        let deployed = GraphServer::start(
            graph,
            ServeOptions {
                all_functions_local: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let served = deployed.invoke(event).await;

        assert_eq!(simulated.status, 200, "body: {}", simulated.body);
        assert_eq!(simulated, served);
        assert_eq!(simulated.body["model_name"], "score");
        assert_eq!(simulated.body["outputs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_pipeline_matches_between_simulation_and_serving() {
        let graph =
            RuntimeBuilder::from_path("configs/pipeline.toml", HandlerRegistry::with_builtins())
                .unwrap();
        let event = Event::new("/ingest", json!({ "customer": "c-1" })).with_id("p-1");

        let sim = LocalSimulation::new(graph.clone()).await.unwrap();
        let simulated = sim.run(event.clone()).await;
        let served = serve(graph).await.invoke(event).await;

        assert_eq!(simulated, served);
        assert_eq!(
            simulated.body,
            json!({ "customer": "c-1", "stage": "ingested" })
        );
    }
}
