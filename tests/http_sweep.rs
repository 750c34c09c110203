use bulk_mutation_bench::harness::HarnessConfig;
use bulk_mutation_bench::pipeline::{BenchmarkRun, Pipeline, PipelineState};
use bulk_mutation_bench::report::MetricsReporter;
use bulk_mutation_bench::schema::{RunMeta, SweepReport};
use bulk_mutation_bench::stage::FailureKind;
use bulk_mutation_bench::transport::HttpTransport;
use bulk_mutation_bench::Stage;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use std::time::Duration;

fn bulk_body(stage: Stage, requested: usize, ids: Vec<Value>) -> String {
    let succeeded = match stage.id_field() {
        Some(_) => ids.len(),
        None => requested,
    };
    let mut result = json!({
        "success": true,
        "totalRequested": requested,
        stage.count_field(): succeeded,
        "totalFailed": requested - succeeded,
        "errorMessage": null,
    });
    if let Some(field) = stage.id_field() {
        result["insertedItems"] = ids.into_iter().map(|id| json!({ field: id })).collect();
    }
    json!({ "data": { stage.operation(): result } }).to_string()
}

fn mock_stage(server: &mut ServerGuard, stage: Stage, body: String) -> Mock {
    server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex(format!("{}\\(", stage.operation())))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create()
}

#[test]
fn sweep_against_http_service() {
    let mut server = mockito::Server::new();
    let n = 3;

    let header_ids: Vec<Value> = (1..=n).map(|i| json!(100 + i)).collect();
    let micro_ids: Vec<Value> = (1..=n).map(|i| json!(format!("guid-{i}"))).collect();

    let mocks = vec![
        mock_stage(&mut server, Stage::HeaderCreate, bulk_body(Stage::HeaderCreate, n, header_ids)),
        mock_stage(&mut server, Stage::HeaderUpdate, bulk_body(Stage::HeaderUpdate, n, vec![])),
        mock_stage(&mut server, Stage::MicroCreate, bulk_body(Stage::MicroCreate, n, micro_ids)),
        server
            .mock("POST", "/graphql")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("bulkUpdateLogMicroservice\\(".into()),
                Matcher::Regex("guid-3".into()),
            ]))
            .with_status(200)
            .with_body(bulk_body(Stage::MicroUpdate, n, vec![]))
            .create(),
        mock_stage(&mut server, Stage::ContentCreate, bulk_body(Stage::ContentCreate, n, vec![])),
        mock_stage(&mut server, Stage::ContentUpdate, bulk_body(Stage::ContentUpdate, n, vec![])),
    ];

    let cfg = HarnessConfig {
        endpoint: format!("{}/graphql", server.url()),
        timeout: Duration::from_secs(5),
        batch_sizes: vec![n as i64],
    };
    cfg.validate().unwrap();

    let transport = HttpTransport::new(cfg.endpoint.clone(), cfg.timeout).unwrap();
    let mut reporter = MetricsReporter::new(Vec::new());
    let outcome = Pipeline::new(transport)
        .run_sweep(
            &BenchmarkRun {
                batch_sizes: cfg.batch_sizes.clone(),
            },
            &mut reporter,
        )
        .unwrap();

    for m in &mocks {
        m.assert();
    }
    assert!(!outcome.endpoint_unreachable());
    let it = &outcome.iterations[0];
    assert_eq!(it.state, PipelineState::Done);
    assert!(it.results.values().all(|r| r.success && !r.skipped));

    let printed = String::from_utf8(reporter.into_inner()).unwrap();
    assert!(printed.contains("3/3 inserted"));
    assert!(printed.contains("3/3 updated"));

    let report = SweepReport::new(RunMeta::new(&cfg, "unix:0".into(), None), &outcome);
    let json = report.to_json_pretty().unwrap();
    assert!(json.contains("\"state\": \"done\""));
}

#[test]
fn unreachable_endpoint_is_flagged() {
    let cfg = HarnessConfig {
        endpoint: "http://127.0.0.1:1/graphql".to_string(),
        timeout: Duration::from_secs(2),
        batch_sizes: vec![10, 50],
    };
    let transport = HttpTransport::new(cfg.endpoint.clone(), cfg.timeout).unwrap();
    let mut reporter = MetricsReporter::new(Vec::new());

    let outcome = Pipeline::new(transport)
        .run_sweep(
            &BenchmarkRun {
                batch_sizes: cfg.batch_sizes.clone(),
            },
            &mut reporter,
        )
        .unwrap();

    assert!(outcome.endpoint_unreachable());
    assert_eq!(outcome.iterations.len(), 2);
    for it in &outcome.iterations {
        assert!(it.is_aborted());
        assert_eq!(
            it.results[&Stage::HeaderCreate].failure,
            Some(FailureKind::Transport)
        );
    }
}

#[test]
fn error_status_is_not_unreachable() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/graphql")
        .with_status(503)
        .with_body("maintenance")
        .create();

    let transport =
        HttpTransport::new(format!("{}/graphql", server.url()), Duration::from_secs(5)).unwrap();
    let mut reporter = MetricsReporter::new(Vec::new());
    let outcome = Pipeline::new(transport)
        .run_sweep(&BenchmarkRun { batch_sizes: vec![5] }, &mut reporter)
        .unwrap();

    let header = &outcome.iterations[0].results[&Stage::HeaderCreate];
    assert_eq!(header.failure, Some(FailureKind::Transport));
    assert_eq!(header.http_status, Some(503));
    assert!(outcome.iterations[0].is_aborted());
    assert!(!outcome.endpoint_unreachable());

    let printed = String::from_utf8(reporter.into_inner()).unwrap();
    assert!(printed.contains("HTTP ERROR - HTTP 503"));
}
