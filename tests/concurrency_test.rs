use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use portkey_stitch::{
    FederationGateway, GatewaySettings, GraphQLRequest, LocalQueryExecutor, QueryExecutor, SchemaDescriptor,
    SchemaMerger, SubschemaBinding, UpstreamResponse,
};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use serial_test::serial;
use tokio::time::Instant;

const SLOW_SCHEMA: &str = "type Query { slow: String hang: String } type Mutation { first: String second: String }";
const FAST_SCHEMA: &str = "type Query { fast: String }";

// Root fields served by the local subgraphs and how long each takes
const DELAYS: [(&str, u64); 5] = [("slow", 200), ("hang", 10_000), ("fast", 5), ("first", 50), ("second", 50)];

#[derive(Default)]
struct Probe {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    finished: AtomicUsize,
}

impl Probe {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn executor(probe: Arc<Probe>) -> Arc<dyn QueryExecutor> {
    Arc::new(LocalQueryExecutor::new(move |query, _, _| {
        let probe = probe.clone();
        async move {
            let (field, delay) = DELAYS
                .iter()
                .find(|(field, _)| query.contains(field))
                .copied()
                .unwrap_or(("unknown", 0));
            probe.enter();
            tokio::time::sleep(Duration::from_millis(delay)).await;
            probe.leave();

            let mut data = Map::new();
            data.insert(field.to_string(), json!("done"));
            Ok(UpstreamResponse::data(Value::Object(data)))
        }
        .boxed()
    }))
}

fn gateway(probe: Arc<Probe>, settings: GatewaySettings) -> FederationGateway {
    let slow = SubschemaBinding::build(
        "slow",
        SchemaDescriptor::parse(SLOW_SCHEMA, "slow").unwrap(),
        &[],
        executor(probe.clone()),
        false,
    )
    .unwrap();
    let fast = SubschemaBinding::build(
        "fast",
        SchemaDescriptor::parse(FAST_SCHEMA, "fast").unwrap(),
        &[],
        executor(probe),
        false,
    )
    .unwrap();
    let schema = SchemaMerger::new()
        .add_binding(slow)
        .add_binding(fast)
        .merge()
        .unwrap();
    FederationGateway::new(schema).with_settings(settings)
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_sibling_query_fields_run_concurrently() {
    let probe = Arc::new(Probe::default());
    let gateway = gateway(probe.clone(), GatewaySettings::default());

    let started = Instant::now();
    let response = gateway.process_request(GraphQLRequest::new("{ slow fast }")).await;
    let elapsed = started.elapsed();

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data, Some(json!({ "slow": "done", "fast": "done" })));
    assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 2);
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(205), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_mutation_fields_run_serially() {
    let probe = Arc::new(Probe::default());
    let gateway = gateway(probe.clone(), GatewaySettings::default());

    let started = Instant::now();
    let response = gateway
        .process_request(GraphQLRequest::new("mutation { first second }"))
        .await;

    assert_eq!(response.data, Some(json!({ "first": "done", "second": "done" })));
    assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_request_timeout_cancels_outstanding_calls() {
    let probe = Arc::new(Probe::default());
    let settings = GatewaySettings {
        request_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let gateway = gateway(probe.clone(), settings);

    let response = gateway.process_request(GraphQLRequest::new("{ hang fast }")).await;
    assert_eq!(response.data, None);
    assert_eq!(response.errors[0].extensions["code"], "GATEWAY_TIMEOUT");

    tokio::time::sleep(Duration::from_secs(20)).await;
    // `fast` completed, `hang` was dropped while sleeping and never finished
    assert_eq!(probe.finished.load(Ordering::SeqCst), 1);
    assert_eq!(probe.in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
#[serial]
async fn test_upstream_timeout_fails_only_the_slow_field() {
    let probe = Arc::new(Probe::default());
    let settings = GatewaySettings {
        upstream_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let gateway = gateway(probe, settings);

    let response = gateway.process_request(GraphQLRequest::new("{ hang fast }")).await;
    assert_eq!(response.data, Some(json!({ "hang": null, "fast": "done" })));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].extensions["code"], "TRANSPORT_ERROR");
    assert_eq!(response.errors[0].extensions["service"], "slow");
}
