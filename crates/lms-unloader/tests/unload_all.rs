//! End-to-end unload runs against the in-memory model host.

use std::collections::HashSet;
use std::time::Duration;

use lms_host_traits::session::mock::MockServer;
use lms_host_traits::session::{ConnectorInner, ErrorCode, Namespace};
use lms_unloader::{unload_all, unload_one, MemoryReporter, ModelTarget, UnloadStatus};

fn fixture_models() -> Vec<ModelTarget> {
    vec![
        ModelTarget::llm("llm-a"),
        ModelTarget::llm("vlm-b"),
        ModelTarget::llm("tool-c"),
        ModelTarget::embedding("embed-d"),
    ]
}

fn load_all(server: &MockServer, models: &[ModelTarget]) {
    for model in models {
        server.load(model.namespace, &model.identifier);
    }
}

fn line_set(reporter: &MemoryReporter) -> HashSet<String> {
    reporter.lines().into_iter().collect()
}

#[tokio::test]
async fn all_loaded_models_are_unloaded() {
    let server = MockServer::new();
    let models = fixture_models();
    load_all(&server, &models);
    let reporter = MemoryReporter::new();

    unload_all(&server.connector(), &models, &reporter).await.unwrap();

    let expected: HashSet<String> = [
        "Unloaded: 'llm-a'",
        "Unloaded: 'vlm-b'",
        "Unloaded: 'tool-c'",
        "Unloaded: 'embed-d'",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert_eq!(reporter.lines().len(), 4);
    assert_eq!(line_set(&reporter), expected);
    for model in &models {
        assert!(!server.is_loaded(model.namespace, &model.identifier));
    }
    assert_eq!(server.connections_opened(), 1);
    assert_eq!(server.connections_closed(), 1);
}

#[tokio::test]
async fn nothing_loaded_reports_not_loaded_for_each() {
    let server = MockServer::new();
    let reporter = MemoryReporter::new();

    unload_all(&server.connector(), &fixture_models(), &reporter)
        .await
        .unwrap();

    let expected: HashSet<String> = ["llm-a", "vlm-b", "tool-c", "embed-d"]
        .iter()
        .map(|id| format!("Unloaded: '{}' (model was not loaded)", id))
        .collect();
    assert_eq!(reporter.lines().len(), 4);
    assert_eq!(line_set(&reporter), expected);
    assert_eq!(server.connections_closed(), 1);
}

#[tokio::test]
async fn second_run_sees_everything_already_unloaded() {
    let server = MockServer::new();
    let models = fixture_models();
    load_all(&server, &models);

    let first = MemoryReporter::new();
    unload_all(&server.connector(), &models, &first).await.unwrap();
    let second = MemoryReporter::new();
    unload_all(&server.connector(), &models, &second).await.unwrap();

    assert!(first
        .statuses()
        .iter()
        .all(|s| matches!(s, UnloadStatus::Unloaded(_))));
    assert_eq!(second.statuses().len(), 4);
    assert!(second
        .statuses()
        .iter()
        .all(|s| matches!(s, UnloadStatus::NotLoaded(_))));
    assert_eq!(server.connections_opened(), 2);
    assert_eq!(server.connections_closed(), 2);
}

#[tokio::test]
async fn each_identifier_is_requested_exactly_once() {
    let server = MockServer::new();
    let models = fixture_models();
    server.load(Namespace::Llm, "vlm-b");
    let reporter = MemoryReporter::new();

    unload_all(&server.connector(), &models, &reporter).await.unwrap();

    let mut requested: Vec<String> = server.requests().into_iter().map(|(_, id)| id).collect();
    requested.sort();
    assert_eq!(requested, vec!["embed-d", "llm-a", "tool-c", "vlm-b"]);

    let mut reported: Vec<String> = reporter
        .statuses()
        .iter()
        .map(|s| s.identifier().to_string())
        .collect();
    reported.sort();
    assert_eq!(reported, requested);
}

#[tokio::test]
async fn embedding_model_goes_through_embedding_namespace() {
    let server = MockServer::new();
    let models = fixture_models();
    load_all(&server, &models);

    unload_all(&server.connector(), &models, &MemoryReporter::new())
        .await
        .unwrap();

    assert!(server
        .requests()
        .contains(&(Namespace::Embedding, "embed-d".to_string())));
    assert!(server
        .requests()
        .contains(&(Namespace::Llm, "tool-c".to_string())));
}

#[tokio::test]
async fn requests_are_in_flight_together() {
    let server = MockServer::new();
    let models = fixture_models();
    load_all(&server, &models);
    for model in &models {
        server.delay(&model.identifier, Duration::from_millis(50));
    }

    unload_all(&server.connector(), &models, &MemoryReporter::new())
        .await
        .unwrap();

    assert_eq!(server.max_in_flight(), 4);
}

#[tokio::test(start_paused = true)]
async fn completion_order_does_not_change_the_result() {
    let models = fixture_models();
    let mut outcomes = Vec::new();

    for order in [[10u64, 20, 30, 40], [40, 30, 20, 10]] {
        let server = MockServer::new();
        load_all(&server, &models);
        for (model, millis) in models.iter().zip(order.iter()) {
            server.delay(&model.identifier, Duration::from_millis(*millis));
        }
        let reporter = MemoryReporter::new();
        unload_all(&server.connector(), &models, &reporter).await.unwrap();
        outcomes.push((reporter.lines(), line_set(&reporter)));
    }

    assert_ne!(outcomes[0].0, outcomes[1].0);
    assert_eq!(outcomes[0].1, outcomes[1].1);
}

#[tokio::test]
async fn fatal_error_aborts_and_releases_session() {
    let server = MockServer::new();
    server
        .load(Namespace::Llm, "llm-a")
        .fail("vlm-b", ErrorCode::ConnectionFailed);
    let models = vec![ModelTarget::llm("llm-a"), ModelTarget::llm("vlm-b")];
    let reporter = MemoryReporter::new();

    let err = unload_all(&server.connector(), &models, &reporter)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::ConnectionFailed);
    assert_eq!(server.connections_closed(), 1);
    let lines = reporter.lines();
    assert!(lines.len() <= 1);
    assert!(lines.iter().all(|line| line == "Unloaded: 'llm-a'"));
}

#[tokio::test]
async fn fatal_error_drops_slower_attempts() {
    let server = MockServer::new();
    let models = fixture_models();
    load_all(&server, &models);
    server.fail("llm-a", ErrorCode::RuntimeError);
    for slow in ["vlm-b", "tool-c", "embed-d"] {
        server.delay(slow, Duration::from_secs(60));
    }
    let reporter = MemoryReporter::new();

    let err = unload_all(&server.connector(), &models, &reporter)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::RuntimeError);
    assert!(reporter.lines().is_empty());
    assert!(server.is_loaded(Namespace::Embedding, "embed-d"));
    assert_eq!(server.connections_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_still_releases_session() {
    let server = MockServer::new();
    let models = fixture_models();
    load_all(&server, &models);
    server.delay("tool-c", Duration::from_secs(120));
    let reporter = MemoryReporter::new();

    let connector = server.connector();
    let run = unload_all(&connector, &models, &reporter);
    let result = tokio::time::timeout(Duration::from_secs(5), run).await;

    assert!(result.is_err());
    assert_eq!(server.connections_opened(), 1);
    assert_eq!(server.connections_closed(), 1);
    assert_eq!(reporter.lines().len(), 3);
}

#[tokio::test]
async fn failed_connect_reports_nothing() {
    let server = MockServer::new();
    server.refuse_connections();
    let reporter = MemoryReporter::new();

    let err = unload_all(&server.connector(), &fixture_models(), &reporter)
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::ConnectionFailed);
    assert!(reporter.lines().is_empty());
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn empty_model_list_still_opens_and_closes() {
    let server = MockServer::new();

    unload_all(&server.connector(), &[], &MemoryReporter::new())
        .await
        .unwrap();

    assert_eq!(server.connections_opened(), 1);
    assert_eq!(server.connections_closed(), 1);
}

#[tokio::test]
async fn unload_one_distinguishes_outcomes() {
    let server = MockServer::new();
    server
        .load(Namespace::Llm, "llm-a")
        .fail("broken", ErrorCode::InvalidModelName);
    let session = server.connector().connect().await.unwrap();
    let reporter = MemoryReporter::new();

    let first = unload_one(session.llm(), "llm-a", &reporter).await.unwrap();
    let again = unload_one(session.llm(), "llm-a", &reporter).await.unwrap();
    let broken = unload_one(session.llm(), "broken", &reporter).await;

    assert_eq!(first, UnloadStatus::Unloaded("llm-a".into()));
    assert_eq!(again, UnloadStatus::NotLoaded("llm-a".into()));
    assert_eq!(broken.unwrap_err().code, ErrorCode::InvalidModelName);
    assert_eq!(
        reporter.lines(),
        vec![
            "Unloaded: 'llm-a'".to_string(),
            "Unloaded: 'llm-a' (model was not loaded)".to_string()
        ]
    );
}
