mod support;

use std::{collections::HashSet, time::Duration};

use axum::{Json, Router, http::StatusCode, routing::post};
use metrics_util::debugging::DebuggingRecorder;
use prerender::{
    application::fragments::FragmentSource,
    domain::fragments::FragmentRequest,
    infra::{
        renderer::{
            HttpFragmentClient, METRIC_FRAGMENT_ERRORS, METRIC_FRAGMENT_ITEM_FAILURES,
            METRIC_FRAGMENT_REQUEST_MS, METRIC_FRAGMENT_REQUESTS,
        },
        telemetry,
    },
};
use serde_json::json;
use support::MockRenderer;

#[tokio::test]
async fn renderer_calls_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let router = Router::new()
        .route(
            "/render",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream broke") }),
        )
        .route(
            "/render-batch",
            post(|| async {
                Json(json!({"results": [{"tag": "a", "html": "<a/>"}, {"tag": "b", "error": "boom"}]}))
            }),
        );
    let mock = MockRenderer::spawn(router).await;
    let client =
        HttpFragmentClient::new(&mock.settings(Duration::from_secs(2))).expect("client builds");

    let a = FragmentRequest::bare("a").expect("valid tag");
    let b = FragmentRequest::bare("b").expect("valid tag");

    client
        .fetch_fragment(&a)
        .await
        .expect_err("single call fails with 502");
    let resolved = client
        .fetch_fragment_batch(&[a, b])
        .await
        .expect("batch succeeds");
    assert_eq!(resolved.failures().count(), 1);

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for metric in [
        METRIC_FRAGMENT_REQUESTS,
        METRIC_FRAGMENT_ERRORS,
        METRIC_FRAGMENT_ITEM_FAILURES,
        METRIC_FRAGMENT_REQUEST_MS,
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let error_labels: Vec<(String, String)> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| composite_key.key().name() == METRIC_FRAGMENT_ERRORS)
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .map(|label| (label.key().to_string(), label.value().to_string()))
                .collect::<Vec<_>>()
        })
        .collect();
    assert!(error_labels.contains(&("mode".to_string(), "single".to_string())));
    assert!(error_labels.contains(&("kind".to_string(), "status".to_string())));
}
