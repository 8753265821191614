//! HTTP API through the full middleware stack

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use hashdice::{
    api::{build_app, AppState},
    config::ApiConfig,
    testing::{FixedOutcome, ScriptedOracle},
    BetSettlementEngine, Currency, HashdiceConfig, Identity, LedgerStore,
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    store: Arc<LedgerStore>,
    router: Router,
}

fn test_app(actual: f64) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HashdiceConfig::testing();
    config.storage.data_directory = dir.path().join("ledger").to_string_lossy().to_string();

    let store = Arc::new(LedgerStore::open(&config.storage).unwrap());
    store
        .register_currency(&Currency {
            casino_id: "casino-1".to_string(),
            key: "BTC".to_string(),
            display_unit_name: "satoshi".to_string(),
            display_unit_scale: 100_000_000,
        })
        .unwrap();
    store
        .credit_balance(&Identity::new("user-1", "exp-1", "casino-1"), "BTC", 100.0)
        .unwrap();
    store.fund_bankroll("casino-1", "BTC", 1000.0).unwrap();

    let engine = Arc::new(BetSettlementEngine::new(
        store.clone(),
        Arc::new(ScriptedOracle::new()),
        Arc::new(FixedOutcome(actual)),
        config.engine.clone(),
        Duration::from_secs(1),
    ));
    let router = build_app(Arc::new(AppState::new(engine)), &ApiConfig::default());

    TestApp {
        _dir: dir,
        store,
        router,
    }
}

fn authed(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", "user-1")
        .header("x-experience-id", "exp-1")
        .header("x-casino-id", "casino-1")
}

fn json_body(builder: axum::http::request::Builder, body: Value) -> Request<Body> {
    builder
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    assert!(response.headers().contains_key("x-request-id"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let app = test_app(2.0);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Running");
}

#[tokio::test]
async fn test_place_and_fetch_dice_bet() {
    let app = test_app(2.5);

    let (status, body) = send(
        &app,
        json_body(
            authed("POST", "/dice-bets"),
            json!({ "wager": 10.0, "target": 2.0, "currency": "BTC" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["diceBet"]["net"], 10.0);
    assert_eq!(body["diceBet"]["actual"], 2.5);
    assert_eq!(body["diceBet"]["currencyKey"], "BTC");

    let id = body["diceBet"]["id"].as_str().unwrap().to_string();
    let (status, fetched) = send(
        &app,
        authed("GET", &format!("/dice-bets/{}", id)).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["diceBet"]["id"], id.as_str());

    let balance = app
        .store
        .balance(&Identity::new("user-1", "exp-1", "casino-1"), "BTC")
        .unwrap()
        .unwrap();
    assert_eq!(balance.amount, 110.0);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = test_app(2.0);
    let request = json_body(
        Request::builder().method("POST").uri("/dice-bets"),
        json!({ "wager": 10.0, "target": 2.0, "currency": "BTC" }),
    );

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "NOT_AUTHENTICATED");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_settlement_errors_keep_their_code() {
    let app = test_app(2.0);

    let (status, body) = send(
        &app,
        json_body(
            authed("POST", "/dice-bets"),
            json!({ "wager": 500.0, "target": 2.0, "currency": "BTC" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");

    let (status, body) = send(
        &app,
        json_body(
            authed("POST", "/dice-bets"),
            json!({ "wager": 1.0, "target": 10_001.0, "currency": "BTC" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_rotate_hashchain() {
    let app = test_app(2.0);

    let (status, body) = send(
        &app,
        json_body(authed("POST", "/hashchain"), json!({ "clientSeed": "lucky" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = body["hashchainId"].as_str().unwrap();
    let active = app
        .store
        .active_hashchain(&Identity::new("user-1", "exp-1", "casino-1"))
        .unwrap()
        .unwrap();
    assert_eq!(active.id.to_string(), id);
    assert_eq!(active.client_seed, "lucky");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = test_app(2.0);

    let (status, body) = send(
        &app,
        json_body(authed("POST", "/hashchain"), json!({ "seed": "wrong field" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_other_players_bets_are_hidden() {
    let app = test_app(2.0);

    let (_, body) = send(
        &app,
        json_body(
            authed("POST", "/dice-bets"),
            json!({ "wager": 1.0, "target": 2.0, "currency": "BTC" }),
        ),
    )
    .await;
    let id = body["diceBet"]["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri(format!("/dice-bets/{}", id))
        .header("x-user-id", "user-2")
        .header("x-experience-id", "exp-1")
        .header("x-casino-id", "casino-1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}
