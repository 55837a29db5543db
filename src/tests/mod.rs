//! Integration tests for the check-in terminal.
//!
//! Each fixture runs the operator API on an ephemeral port against an
//! in-process fake registry and a ledger in a temp dir.


use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::watch;
use tower::ServiceExt;

use crate::capture::SymbolTextDecoder;
use crate::config::{Config, DuplicatePolicy};
use crate::db::{init_database, Ledger};
use crate::registry::RegistryClient;
use crate::{create_router, terminal, AppState};
use fake_registry::{team_json, FakeRegistry};

const OPERATOR_KEY: &str = "test-operator-key";

fn test_config(registry_url: &str, policy: DuplicatePolicy, ledger_path: std::path::PathBuf) -> Config {
    Config {
        registry_url: registry_url.to_string(),
        registry_timeout: Duration::from_secs(2),
        ledger_path,
        ledger_namespace: "scanned_teams".to_string(),
        duplicate_policy: policy,
        rearm_delay: Duration::ZERO,
        auto_rearm: false,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        operator_key: Some(OPERATOR_KEY.to_string()),
        lock_status_url: None,
        app_id: "checkin-terminal".to_string(),
        lock_poll: Duration::from_millis(1500),
        log_level: "warn".to_string(),
    }
}

async fn build_state(config: Config, lock: watch::Receiver<bool>) -> AppState {
    let pool = init_database(&config.ledger_path)
        .await
        .expect("Failed to init DB");
    let ledger = Ledger::open(pool, config.ledger_namespace.clone())
        .await
        .expect("Failed to open ledger");
    let registry = RegistryClient::new(&config.registry_url, config.registry_timeout)
        .expect("Failed to build registry client");
    let terminal = terminal::spawn(&config, ledger, registry);

    AppState {
        terminal,
        decoder: Arc::new(SymbolTextDecoder),
        config: Arc::new(config),
        lock,
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    registry_url: String,
    policy: DuplicatePolicy,
    temp_dir: TempDir,
}

impl TestFixture {
    async fn new(registry: &FakeRegistry) -> Self {
        Self::with_policy(registry, DuplicatePolicy::Refresh).await
    }

    async fn with_policy(registry: &FakeRegistry, policy: DuplicatePolicy) -> Self {
        let registry_url = registry.serve().await;
        Self::start(registry_url, policy, TempDir::new().expect("Failed to create temp dir")).await
    }

    async fn start(registry_url: String, policy: DuplicatePolicy, temp_dir: TempDir) -> Self {
        let config = test_config(&registry_url, policy, temp_dir.path().join("ledger.sqlite"));
        let state = build_state(config, crate::watchdog::never_locked()).await;
        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-operator-key", OPERATOR_KEY.parse().unwrap());

        TestFixture {
            client: Client::builder().default_headers(headers).build().unwrap(),
            base_url,
            registry_url,
            policy,
            temp_dir,
        }
    }

    /// Start a fresh terminal over the same ledger file.
    async fn restart(self) -> Self {
        let TestFixture {
            registry_url,
            policy,
            temp_dir,
            ..
        } = self;
        Self::start(registry_url, policy, temp_dir).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> (StatusCode, Value) {
        let resp = request.send().await.unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        let body = resp.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.client.get(self.url(path))).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.url(path)).json(&body)).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.put(self.url(path)).json(&body)).await
    }

    /// Poll until no registry request is outstanding.
    async fn settle(&self) -> Value {
        for _ in 0..100 {
            let (_, body) = self.get("/api/terminal").await;
            let phase = body["data"]["phase"].as_str().unwrap_or_default().to_string();
            if phase != "RESOLVING" && phase != "COMMITTING" {
                return body["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("terminal never settled");
    }

    /// Arm the camera, feed one team QR and wait for the outcome.
    async fn scan(&self, code: &str) -> Value {
        let (status, _) = self.post("/api/capture/start", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let payload = json!({ "teamCode": code }).to_string();
        let (status, _) = self
            .post("/api/capture/decode", json!({ "payload": payload }))
            .await;
        assert_eq!(status, StatusCode::OK);
        self.settle().await
    }

    async fn ledger(&self) -> Vec<Value> {
        let (status, body) = self.get("/api/ledger").await;
        assert_eq!(status, StatusCode::OK);
        body["data"].as_array().unwrap().clone()
    }
}

fn last_notice(snapshot: &Value) -> &Value {
    snapshot["notices"].as_array().unwrap().last().unwrap()
}

fn row<'a>(snapshot: &'a Value, email: &str) -> &'a Value {
    snapshot["review"]["rows"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["email"] == email)
        .unwrap()
}

// ==================== BASICS ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new(&FakeRegistry::default()).await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_key() {
    let fixture = TestFixture::new(&FakeRegistry::default()).await;

    let resp = Client::new()
        .get(fixture.url("/api/terminal"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = Client::new()
        .get(fixture.url("/api/terminal"))
        .bearer_auth(OPERATOR_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_locked_terminal_refuses_operator_calls() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(
        "http://127.0.0.1:1/api/scanner",
        DuplicatePolicy::Refresh,
        temp_dir.path().join("ledger.sqlite"),
    );
    let (lock_tx, lock_rx) = watch::channel(true);
    let app = create_router(build_state(config, lock_rx).await);

    let resp = app
        .clone()
        .oneshot(
            Request::get("/api/terminal")
                .header("x-operator-key", OPERATOR_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::LOCKED);

    let resp = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    lock_tx.send(false).unwrap();
    let resp = app
        .oneshot(
            Request::get("/api/terminal")
                .header("x-operator-key", OPERATOR_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_initial_snapshot() {
    let fixture = TestFixture::new(&FakeRegistry::default()).await;

    let (status, body) = fixture.get("/api/terminal").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["phase"], "READY");
    assert_eq!(body["data"]["mode"], "ATTENDANCE");
    assert_eq!(body["data"]["camera"], "idle");
    assert_eq!(body["data"]["duplicatePolicy"], "refresh");
    assert!(body["data"]["review"].is_null());
}

// ==================== SCANNING ====================

#[tokio::test]
async fn test_scan_opens_review_and_records_ledger() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    let snapshot = fixture.scan("TX42").await;
    assert_eq!(snapshot["phase"], "REVIEW");
    assert_eq!(snapshot["camera"], "idle");
    assert_eq!(snapshot["review"]["selection"], "preview");
    assert_eq!(snapshot["review"]["team"]["teamName"], "Pit Crew");
    assert_eq!(snapshot["review"]["rows"].as_array().unwrap().len(), 3);
    assert_eq!(row(&snapshot, "lead@x.com")["leader"], true);

    let ledger = fixture.ledger().await;
    assert_eq!(ledger.len(), 1);
    let team = &ledger[0]["team"];
    assert_eq!(team["teamId"], "id-TX42");
    assert_eq!(team["teamCode"], "TX42");
    assert_eq!(team["leader"]["phone"], "555-0100");
    assert_eq!(team["members"][0]["name"], "Ann Member");
    assert_eq!(team["members"][1]["email"], "b@x.com");
    assert_eq!(team["totalMembers"], 3);
    assert_eq!(team["attendance"], false);

    let (status, body) = fixture.get("/api/ledger/TX42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["team"], *team);
}

#[tokio::test]
async fn test_numeric_team_code_is_accepted() {
    let registry = FakeRegistry::default().with_team(team_json("42", "Numbers"));
    let fixture = TestFixture::new(&registry).await;

    fixture.post("/api/capture/start", json!({})).await;
    fixture
        .post("/api/capture/decode", json!({ "payload": "{\"teamCode\":42}" }))
        .await;
    let snapshot = fixture.settle().await;
    assert_eq!(snapshot["phase"], "REVIEW");
    assert_eq!(snapshot["review"]["team"]["teamCode"], "42");
}

#[tokio::test]
async fn test_unknown_team_notifies_and_keeps_scanning() {
    let fixture = TestFixture::new(&FakeRegistry::default()).await;

    let snapshot = fixture.scan("TX42").await;
    assert_eq!(snapshot["phase"], "SCANNING");
    assert_eq!(snapshot["camera"], "armed");
    assert_eq!(last_notice(&snapshot)["kind"], "notFound");
    assert_eq!(last_notice(&snapshot)["message"], "Invalid team");
    assert!(fixture.ledger().await.is_empty());
}

#[tokio::test]
async fn test_non_team_payload_is_ignored() {
    let registry = FakeRegistry::default();
    let fixture = TestFixture::new(&registry).await;

    fixture.post("/api/capture/start", json!({})).await;
    let (status, body) = fixture
        .post("/api/capture/decode", json!({ "payload": "https://example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "SCANNING");
    assert!(body["data"]["notices"].as_array().unwrap().is_empty());
    assert_eq!(registry.verify_calls(), 0);
}

#[tokio::test]
async fn test_registry_down_leaves_ledger_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let fixture = TestFixture::start(
        "http://127.0.0.1:1/api/scanner".to_string(),
        DuplicatePolicy::Refresh,
        temp_dir,
    )
    .await;

    let snapshot = fixture.scan("TX42").await;
    assert_eq!(snapshot["phase"], "SCANNING");
    assert_eq!(last_notice(&snapshot)["kind"], "transport");
    assert!(fixture.ledger().await.is_empty());

    // The next scan starts a new attempt.
    let payload = json!({ "teamCode": "TX42" }).to_string();
    fixture
        .post("/api/capture/decode", json!({ "payload": payload }))
        .await;
    let snapshot = fixture.settle().await;
    let transport = snapshot["notices"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["kind"] == "transport")
        .count();
    assert_eq!(transport, 2);
}

#[tokio::test]
async fn test_frames_during_resolution_are_dropped() {
    let registry = FakeRegistry::default()
        .with_team(team_json("TX42", "Pit Crew"))
        .with_team(team_json("TX7", "Other"));
    registry.delay_verify(Duration::from_millis(200));
    let fixture = TestFixture::new(&registry).await;

    fixture.post("/api/capture/start", json!({})).await;
    let (_, body) = fixture
        .post("/api/capture/decode", json!({ "payload": "{\"teamCode\":\"TX42\"}" }))
        .await;
    assert_eq!(body["data"]["phase"], "RESOLVING");
    fixture
        .post("/api/capture/decode", json!({ "payload": "{\"teamCode\":\"TX7\"}" }))
        .await;

    let snapshot = fixture.settle().await;
    assert_eq!(snapshot["review"]["team"]["teamCode"], "TX42");
    assert_eq!(registry.verify_calls(), 1);
}

#[tokio::test]
async fn test_stop_discards_late_response() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    registry.delay_verify(Duration::from_millis(200));
    let fixture = TestFixture::new(&registry).await;

    fixture.post("/api/capture/start", json!({})).await;
    fixture
        .post("/api/capture/decode", json!({ "payload": "{\"teamCode\":\"TX42\"}" }))
        .await;
    let (_, body) = fixture.post("/api/capture/stop", json!({})).await;
    assert_eq!(body["data"]["phase"], "READY");

    tokio::time::sleep(Duration::from_millis(400)).await;
    let (_, body) = fixture.get("/api/terminal").await;
    assert_eq!(body["data"]["phase"], "READY");
    assert!(body["data"]["review"].is_null());
    assert!(fixture.ledger().await.is_empty());
}

#[tokio::test]
async fn test_still_image_fallback() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    let (status, body) = fixture
        .send(
            fixture
                .client
                .post(fixture.url("/api/capture/image"))
                .body(vec![0xff, 0xd8, 0xff, 0xe0]),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "READY");
    assert_eq!(last_notice(&body["data"])["kind"], "invalid");

    let (status, _) = fixture
        .send(fixture.client.post(fixture.url("/api/capture/image")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    fixture
        .send(
            fixture
                .client
                .post(fixture.url("/api/capture/image"))
                .body("{\"teamCode\":\"TX42\"}"),
        )
        .await;
    let snapshot = fixture.settle().await;
    assert_eq!(snapshot["phase"], "REVIEW");
    assert_eq!(snapshot["review"]["team"]["teamCode"], "TX42");
}

// ==================== DUPLICATES ====================

#[tokio::test]
async fn test_reject_policy_skips_registry() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::with_policy(&registry, DuplicatePolicy::Reject).await;

    fixture.scan("TX42").await;
    fixture.post("/api/review/dismiss", json!({})).await;
    let snapshot = fixture.scan("TX42").await;

    assert_eq!(registry.verify_calls(), 1);
    assert_eq!(snapshot["phase"], "SCANNING");
    assert_eq!(last_notice(&snapshot)["kind"], "alreadyProcessed");
    assert_eq!(fixture.ledger().await.len(), 1);
}

#[tokio::test]
async fn test_refresh_policy_updates_in_place() {
    let registry = FakeRegistry::default()
        .with_team(team_json("TX42", "Pit Crew"))
        .with_team(team_json("TX7", "Other"));
    let fixture = TestFixture::new(&registry).await;

    fixture.scan("TX42").await;
    fixture.post("/api/review/dismiss", json!({})).await;
    fixture.scan("TX7").await;
    fixture.post("/api/review/dismiss", json!({})).await;
    let first_seen = fixture.ledger().await[1]["resolvedAt"].clone();

    let snapshot = fixture.scan("TX42").await;
    assert_eq!(snapshot["phase"], "REVIEW");
    assert_eq!(registry.verify_calls(), 3);

    let ledger = fixture.ledger().await;
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0]["team"]["teamCode"], "TX7");
    assert_eq!(ledger[1]["team"]["teamCode"], "TX42");
    assert_ne!(ledger[1]["resolvedAt"], first_seen);
}

// ==================== COMMITS ====================

#[tokio::test]
async fn test_selective_attendance_then_reopen() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    fixture.scan("TX42").await;
    let (status, body) = fixture
        .post("/api/review/toggle", json!({ "email": "a@x.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row(&body["data"], "a@x.com")["selected"], true);
    assert_eq!(body["data"]["review"]["canSubmit"], true);

    fixture.post("/api/review/submit", json!({})).await;
    let snapshot = fixture.settle().await;
    assert_eq!(snapshot["phase"], "READY");
    assert_eq!(last_notice(&snapshot)["kind"], "committed");
    assert_eq!(registry.team("TX42")["presentMembers"], json!(["a@x.com"]));

    let ledger = fixture.ledger().await;
    assert_eq!(ledger[0]["team"]["presentMembers"], json!(["a@x.com"]));

    let (status, _) = fixture.post("/api/ledger/TX42/open", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot = fixture.settle().await;
    assert_eq!(snapshot["phase"], "REVIEW");
    assert_eq!(snapshot["review"]["selection"], "selected");
    assert_eq!(row(&snapshot, "a@x.com")["completed"], true);
    assert_eq!(row(&snapshot, "b@x.com")["completed"], false);
    assert_eq!(row(&snapshot, "lead@x.com")["completed"], false);
}

#[tokio::test]
async fn test_mark_all_twice_is_idempotent() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    fixture.scan("TX42").await;
    fixture.post("/api/review/mark-all", json!({})).await;
    let snapshot = fixture.settle().await;
    assert_eq!(snapshot["phase"], "READY");
    assert_eq!(registry.team("TX42")["attendance"], true);
    assert_eq!(registry.commit_calls(), 1);

    let snapshot = fixture.scan("TX42").await;
    assert_eq!(snapshot["review"]["alreadyCompleted"], true);
    assert_eq!(snapshot["review"]["canSubmit"], false);

    let (status, body) = fixture.post("/api/review/mark-all", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "REVIEW");
    assert_eq!(last_notice(&body["data"])["kind"], "alreadyProcessed");
    assert_eq!(registry.commit_calls(), 1);
}

#[tokio::test]
async fn test_mark_all_after_partial_check_in_completes_team() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    fixture.scan("TX42").await;
    fixture
        .post("/api/review/toggle", json!({ "email": "a@x.com" }))
        .await;
    fixture.post("/api/review/submit", json!({})).await;
    fixture.settle().await;

    fixture.scan("TX42").await;
    fixture.post("/api/review/mark-all", json!({})).await;
    fixture.settle().await;
    assert_eq!(registry.team("TX42")["attendance"], true);
    assert_eq!(registry.team("TX42")["presentMembers"], json!(["a@x.com"]));
    assert_eq!(registry.commit_calls(), 2);

    let snapshot = fixture.scan("TX42").await;
    assert_eq!(snapshot["review"]["alreadyCompleted"], true);
    assert_eq!(snapshot["review"]["canSubmit"], false);
    assert_eq!(row(&snapshot, "lead@x.com")["completed"], true);
    assert_eq!(row(&snapshot, "b@x.com")["completed"], true);

    fixture.post("/api/review/mark-all", json!({})).await;
    assert_eq!(registry.commit_calls(), 2);
}

#[tokio::test]
async fn test_verify_body_without_code_keeps_scanned_code() {
    let mut body = team_json("TX42", "Old Shape");
    body.as_object_mut().unwrap().remove("teamCode");
    let registry = FakeRegistry::default().with_team_under("TX42", body);
    let fixture = TestFixture::with_policy(&registry, DuplicatePolicy::Reject).await;

    let snapshot = fixture.scan("TX42").await;
    assert_eq!(snapshot["review"]["team"]["teamCode"], "TX42");
    let ledger = fixture.ledger().await;
    assert_eq!(ledger[0]["team"]["teamCode"], "TX42");

    let (status, _) = fixture.post("/api/review/mark-all", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot = fixture.settle().await;
    assert_eq!(last_notice(&snapshot)["kind"], "committed");
    assert_eq!(registry.team("TX42")["attendance"], true);

    let snapshot = fixture.scan("TX42").await;
    assert_eq!(last_notice(&snapshot)["kind"], "alreadyProcessed");
    assert_eq!(registry.verify_calls(), 1);
}

#[tokio::test]
async fn test_unsaved_commit_history_is_reported() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    fixture.scan("TX42").await;

    // Pull the table out from under the terminal's ledger.
    let pool = init_database(&fixture.temp_dir.path().join("ledger.sqlite"))
        .await
        .unwrap();
    sqlx::query("DROP TABLE ledger_entries")
        .execute(&pool)
        .await
        .unwrap();

    fixture
        .post("/api/review/toggle", json!({ "email": "a@x.com" }))
        .await;
    fixture.post("/api/review/submit", json!({})).await;
    let snapshot = fixture.settle().await;

    assert_eq!(snapshot["phase"], "READY");
    assert_eq!(registry.team("TX42")["presentMembers"], json!(["a@x.com"]));
    let kinds: Vec<&str> = snapshot["notices"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kind"].as_str().unwrap())
        .collect();
    assert_eq!(&kinds[kinds.len() - 2..], ["committed", "invalid"]);
    assert_eq!(
        last_notice(&snapshot)["message"],
        "Scan history could not be saved on this device"
    );
}

#[tokio::test]
async fn test_food_mode_shows_served_members() {
    let mut team = team_json("TX42", "Pit Crew");
    team["foodStatus"]["LUNCH"] = json!(["a@x.com"]);
    let registry = FakeRegistry::default().with_team(team);
    let fixture = TestFixture::new(&registry).await;

    let (status, body) = fixture
        .put("/api/terminal/mode", json!({ "mode": "FOOD", "mealType": "LUNCH" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mealType"], "LUNCH");

    let snapshot = fixture.scan("TX42").await;
    assert_eq!(row(&snapshot, "a@x.com")["completed"], true);
    assert_eq!(row(&snapshot, "b@x.com")["completed"], false);

    let (status, body) = fixture
        .post("/api/review/toggle", json!({ "email": "a@x.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    fixture
        .post("/api/review/toggle", json!({ "email": "b@x.com" }))
        .await;
    fixture.post("/api/review/submit", json!({})).await;
    fixture.settle().await;
    assert_eq!(
        registry.team("TX42")["foodStatus"]["LUNCH"],
        json!(["a@x.com", "b@x.com"])
    );
    assert_eq!(registry.team("TX42")["foodStatus"]["DINNER"], json!([]));
}

#[tokio::test]
async fn test_food_mode_without_meal_blocks_submit() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    fixture
        .put("/api/terminal/mode", json!({ "mode": "FOOD" }))
        .await;
    let snapshot = fixture.scan("TX42").await;
    assert_eq!(snapshot["review"]["canSubmit"], false);

    let (status, _) = fixture.post("/api/review/mark-all", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = fixture
        .put("/api/terminal/meal", json!({ "mealType": "DINNER" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["review"]["canSubmit"], true);
}

#[tokio::test]
async fn test_mode_change_rejected_during_review() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    fixture.scan("TX42").await;
    let (status, body) = fixture
        .put("/api/terminal/mode", json!({ "mode": "FOOD", "mealType": "LUNCH" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE");
    assert_eq!(body["error"]["details"]["phase"], "REVIEW");
}

#[tokio::test]
async fn test_rejected_commit_keeps_review() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    registry.fail_commits(true);
    let fixture = TestFixture::new(&registry).await;

    fixture.scan("TX42").await;
    fixture
        .post("/api/review/toggle", json!({ "email": "b@x.com" }))
        .await;
    fixture.post("/api/review/submit", json!({})).await;
    let snapshot = fixture.settle().await;

    assert_eq!(snapshot["phase"], "REVIEW");
    assert_eq!(last_notice(&snapshot)["kind"], "commit");
    assert_eq!(row(&snapshot, "b@x.com")["selected"], true);
    assert_eq!(fixture.ledger().await[0]["team"]["presentMembers"], json!([]));

    registry.fail_commits(false);
    fixture.post("/api/review/submit", json!({})).await;
    let snapshot = fixture.settle().await;
    assert_eq!(snapshot["phase"], "READY");
    assert_eq!(registry.team("TX42")["presentMembers"], json!(["b@x.com"]));
}

// ==================== LEDGER ====================

#[tokio::test]
async fn test_ledger_survives_restart() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    fixture.scan("TX42").await;
    let before = fixture.ledger().await;

    let fixture = fixture.restart().await;
    let after = fixture.ledger().await;
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_ledger_lookup_and_clear() {
    let registry = FakeRegistry::default().with_team(team_json("TX42", "Pit Crew"));
    let fixture = TestFixture::new(&registry).await;

    let (status, body) = fixture.get("/api/ledger/TX42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    fixture.scan("TX42").await;
    fixture.post("/api/review/dismiss", json!({})).await;

    let (status, body) = fixture
        .send(fixture.client.delete(fixture.url("/api/ledger")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], 1);
    assert!(fixture.ledger().await.is_empty());

    let (status, _) = fixture.post("/api/ledger/TX42/open", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
