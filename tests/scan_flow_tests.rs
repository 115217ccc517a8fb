/// Scan flow tests
/// Runs the presentation-side session against a live server backed by a mocked model
mod common;

use async_trait::async_trait;
use common::{
    completion, model_answer, sample_terms, spawn_app, spawn_rate_limited_app, test_config,
    TEST_KEY,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tos_guardian_api::gateway_client::AnalyzeGatewayClient;
use tos_guardian_api::history::HistoryStore;
use tos_guardian_api::models::{AnalysisInput, AnalysisResult, Verdict};
use tos_guardian_api::session::{
    run_scan, AnalyzeApi, FailureKind, ScanFailure, ScanOutcome, ScanRejection, ScanSession,
    ViewState, QUOTA_COOLDOWN,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn gateway_for(mock_server: &MockServer) -> AnalyzeGatewayClient {
    let app = spawn_app(test_config(&mock_server.uri(), Some(TEST_KEY))).await;
    AnalyzeGatewayClient::new(app, Duration::from_secs(10)).unwrap()
}

fn text_input() -> AnalysisInput {
    AnalysisInput::Text(sample_terms())
}

#[tokio::test]
async fn test_successful_scan_is_shown_and_remembered() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(&model_answer("Acme Corp", 82, "Risky").to_string())),
        )
        .mount(&mock_server)
        .await;

    let gateway = gateway_for(&mock_server).await;
    let session = Mutex::new(ScanSession::new(HistoryStore::in_memory()));

    let outcome = run_scan(&session, &gateway, &text_input()).await.unwrap();
    let result = match outcome {
        ScanOutcome::Applied(result) => result,
        other => panic!("expected applied outcome, got {:?}", other),
    };
    assert_eq!(result.risk_score, 82);
    assert_eq!(result.verdict, Verdict::Risky);

    let session = session.lock().unwrap();
    assert!(!session.is_scanning());
    assert_eq!(session.view(), &ViewState::Showing(result));
    assert_eq!(session.history().len(), 1);
}

#[tokio::test]
async fn test_quota_failure_blocks_next_scan_for_cooldown() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "code": 429, "message": "Rate limit exceeded" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = gateway_for(&mock_server).await;
    let session = Mutex::new(ScanSession::new(HistoryStore::in_memory()));

    let outcome = run_scan(&session, &gateway, &text_input()).await.unwrap();
    match outcome {
        ScanOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::Quota);
            assert!(failure.message.contains("QUOTA_LIMIT"));
        }
        other => panic!("expected quota failure, got {:?}", other),
    }

    let remaining = session.lock().unwrap().cooldown_remaining(Instant::now());
    assert!(remaining > QUOTA_COOLDOWN - Duration::from_secs(5));
    assert!(remaining <= QUOTA_COOLDOWN);

    // Second attempt is refused locally; the mock expects a single call
    let second = run_scan(&session, &gateway, &text_input()).await;
    assert!(matches!(second, Err(ScanRejection::CoolingDown { .. })));
}

#[tokio::test]
async fn test_service_rate_limit_starts_cooldown() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(&model_answer("Acme Corp", 82, "Risky").to_string())),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server.uri(), Some(TEST_KEY));
    config.rate_limit_replenish_secs = 60;
    config.rate_limit_burst = 1;
    let app = spawn_rate_limited_app(config).await;
    let gateway = AnalyzeGatewayClient::new(app, Duration::from_secs(10)).unwrap();
    let session = Mutex::new(ScanSession::new(HistoryStore::in_memory()));

    let first = run_scan(&session, &gateway, &text_input()).await.unwrap();
    assert!(matches!(first, ScanOutcome::Applied(_)));

    let second = run_scan(&session, &gateway, &text_input()).await.unwrap();
    match second {
        ScanOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Quota),
        other => panic!("expected quota failure, got {:?}", other),
    }
    assert!(!session
        .lock()
        .unwrap()
        .cooldown_remaining(Instant::now())
        .is_zero());
}

#[tokio::test]
async fn test_auth_failure_is_reported_without_cooldown() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&mock_server)
        .await;

    let gateway = gateway_for(&mock_server).await;
    let session = Mutex::new(ScanSession::new(HistoryStore::in_memory()));

    let outcome = run_scan(&session, &gateway, &text_input()).await.unwrap();
    match outcome {
        ScanOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Auth),
        other => panic!("expected auth failure, got {:?}", other),
    }
    assert!(session
        .lock()
        .unwrap()
        .cooldown_remaining(Instant::now())
        .is_zero());
}

#[tokio::test]
async fn test_rescanning_a_company_keeps_one_history_entry() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(&model_answer("Acme", 40, "Caution").to_string())),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(&model_answer("Acme", 90, "Extreme Risk").to_string())),
        )
        .mount(&mock_server)
        .await;

    let gateway = gateway_for(&mock_server).await;
    let session = Mutex::new(ScanSession::new(HistoryStore::in_memory()));

    run_scan(&session, &gateway, &text_input()).await.unwrap();
    run_scan(&session, &gateway, &text_input()).await.unwrap();

    let session = session.lock().unwrap();
    let entries = session.history().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].company_name, "Acme");
    assert_eq!(entries[0].risk_score, 90);
    assert_eq!(entries[0].verdict, Verdict::ExtremeRisk);
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let history_path = dir.path().join("history.json");

    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(&model_answer("Globex", 55, "Caution").to_string())),
        )
        .mount(&mock_server)
        .await;

    let gateway = gateway_for(&mock_server).await;
    let session = Mutex::new(ScanSession::new(HistoryStore::open(&history_path).unwrap()));
    run_scan(&session, &gateway, &text_input()).await.unwrap();

    let mut restored = ScanSession::new(HistoryStore::open(&history_path).unwrap());
    assert_eq!(restored.history().len(), 1);
    assert!(restored.show_from_history("Globex"));
    match restored.view() {
        ViewState::Showing(result) => assert_eq!(result.risk_score, 55),
        other => panic!("expected stored result, got {:?}", other),
    }
}

/// Answers after a delay and counts calls.
struct SlowApi {
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl AnalyzeApi for SlowApi {
    async fn analyze(&self, _input: &AnalysisInput) -> Result<AnalysisResult, ScanFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(AnalysisResult {
            company_name: "Late Corp".to_string(),
            summary: "Arrived after the user moved on.".to_string(),
            risk_score: 70,
            verdict: Verdict::Risky,
            critical_points: vec![],
            expert_opinion: "Irrelevant now.".to_string(),
        })
    }
}

#[tokio::test]
async fn test_reset_during_scan_discards_late_result() {
    let api = SlowApi {
        delay: Duration::from_millis(200),
        calls: AtomicUsize::new(0),
    };
    let session = Mutex::new(ScanSession::new(HistoryStore::in_memory()));
    let input = AnalysisInput::Url("https://late.example.com".to_string());

    let reset = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.lock().unwrap().reset();
    };
    let (outcome, _) = tokio::join!(run_scan(&session, &api, &input), reset);

    assert_eq!(outcome.unwrap(), ScanOutcome::Discarded);
    assert_eq!(api.calls.load(Ordering::SeqCst), 1);

    let session = session.lock().unwrap();
    assert_eq!(session.view(), &ViewState::Idle);
    assert!(session.history().is_empty());
    assert!(!session.is_scanning());
}

#[tokio::test]
async fn test_second_scan_rejected_while_first_runs() {
    let api = SlowApi {
        delay: Duration::from_millis(100),
        calls: AtomicUsize::new(0),
    };
    let session = Mutex::new(ScanSession::new(HistoryStore::in_memory()));
    let input = text_input();

    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        run_scan(&session, &api, &input).await
    };
    let (first, second) = tokio::join!(run_scan(&session, &api, &input), second);

    assert!(matches!(first, Ok(ScanOutcome::Applied(_))));
    assert_eq!(second, Err(ScanRejection::InFlight));
    assert_eq!(api.calls.load(Ordering::SeqCst), 1);
}
