//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, Arc<api::state::AppState>, api::BackgroundTasks) {
    let (state, background) = api::create_default_state();
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state, background)
}

fn post_json(uri: &str, player: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(player) = player {
        builder = builder.header("X-Player-Id", player);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn top_up(app: &axum::Router, player: &str, cents: i64) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/player_v1/player/add-money",
            Some(player),
            serde_json::json!({ "amount": cents }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn balance_of(app: &axum::Router, player: &str) -> i64 {
    let response = app
        .clone()
        .oneshot(get(&format!("/player_v1/player/{player}/account")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["balance"].as_i64().unwrap()
}

/// Compensations are applied by the stage consumers after the saga returns.
async fn wait_for_balance(app: &axum::Router, player: &str, expected: i64) {
    for _ in 0..400 {
        if balance_of(app, player).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("balance of {player} never reached {expected}");
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, background) = setup();

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["pending_responses"], 0);
    background.shutdown().await;
}

#[tokio::test]
async fn test_add_money_and_read_account() {
    let (app, _, background) = setup();

    let response = app
        .clone()
        .oneshot(post_json(
            "/player_v1/player/add-money",
            Some("player-1"),
            serde_json::json!({ "amount": 2500 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["player_id"], "player-1");
    assert_eq!(json["amount"], 2500);
    assert_eq!(json["balance"], 2500);
    assert!(json["transaction_id"].as_str().is_some());

    top_up(&app, "player-1", 500).await;
    assert_eq!(balance_of(&app, "player-1").await, 3000);
    assert_eq!(balance_of(&app, "someone-else").await, 0);
    background.shutdown().await;
}

#[tokio::test]
async fn test_add_money_rejects_zero_and_negative_amounts() {
    let (app, _, background) = setup();

    for amount in [0, -100] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/player_v1/player/add-money",
                Some("player-1"),
                serde_json::json!({ "amount": amount }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(balance_of(&app, "player-1").await, 0);
    background.shutdown().await;
}

#[tokio::test]
async fn test_missing_player_header_is_unauthorized() {
    let (app, _, background) = setup();

    let response = app
        .clone()
        .oneshot(post_json(
            "/payment_v1/payment/buy",
            None,
            serde_json::json!({ "items": [{ "item_id": "sword" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(post_json(
            "/player_v1/player/add-money",
            Some("  "),
            serde_json::json!({ "amount": 100 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    background.shutdown().await;
}

#[tokio::test]
async fn test_buy_then_sell_round_trip() {
    let (app, state, background) = setup();
    top_up(&app, "player-1", 10_000).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/payment_v1/payment/buy",
            Some("player-1"),
            serde_json::json!({ "items": [{ "item_id": "sword" }, { "item_id": "potion" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let receipts = body_json(response).await;
    let receipts = receipts.as_array().unwrap();
    assert_eq!(receipts.len(), 2);
    for receipt in receipts {
        assert_eq!(receipt["player_id"], "player-1");
        assert_eq!(receipt["error"], "");
        assert!(receipt["inventory_id"].as_str().is_some());
        assert!(receipt["transaction_id"].as_str().is_some());
    }

    // sword 40.00 + potion 10.00
    assert_eq!(balance_of(&app, "player-1").await, 5_000);

    let response = app
        .clone()
        .oneshot(get("/inventory_v1/inventory/player-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let mut owned: Vec<String> = json["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["item_id"].as_str().unwrap().to_string())
        .collect();
    owned.sort();
    assert_eq!(owned, vec!["potion", "sword"]);

    let response = app
        .clone()
        .oneshot(post_json(
            "/payment_v1/payment/sell",
            Some("player-1"),
            serde_json::json!({ "items": [{ "item_id": "sword" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(balance_of(&app, "player-1").await, 9_000);
    let remaining = state
        .inventory
        .items_for(&domain::PlayerId::new("player-1"))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].item_id.as_str(), "potion");
    background.shutdown().await;
}

#[tokio::test]
async fn test_buy_with_insufficient_funds_is_rejected_and_compensated() {
    let (app, state, background) = setup();
    top_up(&app, "player-1", 5_000).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/payment_v1/payment/buy",
            Some("player-1"),
            serde_json::json!({ "items": [{ "item_id": "sword" }, { "item_id": "bow" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "error: buy item failed");

    wait_for_balance(&app, "player-1", 5_000).await;
    let owned = state
        .inventory
        .items_for(&domain::PlayerId::new("player-1"))
        .await
        .unwrap();
    assert!(owned.is_empty());
    background.shutdown().await;
}

#[tokio::test]
async fn test_sell_unowned_item_is_rejected() {
    let (app, _, background) = setup();

    let response = app
        .clone()
        .oneshot(post_json(
            "/payment_v1/payment/sell",
            Some("player-1"),
            serde_json::json!({ "items": [{ "item_id": "shield" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "error: sell item failed");
    assert_eq!(balance_of(&app, "player-1").await, 0);
    background.shutdown().await;
}

#[tokio::test]
async fn test_unknown_item_and_empty_request_are_bad_requests() {
    let (app, _, background) = setup();
    top_up(&app, "player-1", 10_000).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/payment_v1/payment/buy",
            Some("player-1"),
            serde_json::json!({ "items": [{ "item_id": "dragon" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("dragon"));

    let response = app
        .clone()
        .oneshot(post_json(
            "/payment_v1/payment/buy",
            Some("player-1"),
            serde_json::json!({ "items": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(balance_of(&app, "player-1").await, 10_000);
    background.shutdown().await;
}

#[tokio::test]
async fn test_metrics_endpoint_reports_sagas() {
    let (app, _, background) = setup();
    top_up(&app, "player-1", 10_000).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/payment_v1/payment/buy",
            Some("player-1"),
            serde_json::json!({ "items": [{ "item_id": "potion" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_executions_total"));
    background.shutdown().await;
}

#[tokio::test]
async fn test_overlong_ids_are_rejected_without_starting_a_saga() {
    let (app, state, background) = setup();
    top_up(&app, "player-1", 10_000).await;
    let long_item = "i".repeat(65);
    let long_player = "p".repeat(65);

    for (player, item) in [("player-1", long_item.as_str()), (long_player.as_str(), "sword")] {
        let request = post_json(
            "/payment_v1/payment/buy",
            Some(player),
            serde_json::json!({ "items": [{ "item_id": item }] }),
        );
        let response = tokio::time::timeout(Duration::from_millis(500), app.clone().oneshot(request))
            .await
            .expect("rejected before any stage timeout")
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .clone()
        .oneshot(post_json(
            "/player_v1/player/add-money",
            Some(&long_player),
            serde_json::json!({ "amount": 100 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(state.orchestrator.router().pending_count().await, 0);
    assert_eq!(balance_of(&app, "player-1").await, 10_000);
    background.shutdown().await;
}

#[tokio::test]
async fn test_configured_item_cap_limits_purchases() {
    let config = api::config::Config {
        inventory_item_cap: Some(1),
        ..api::config::Config::default()
    };
    let (state, background) = api::build_state(
        Arc::new(event_bus::InMemoryBus::new()),
        Arc::new(event_bus::InMemoryOffsetStore::new()),
        api::seeded_catalog(),
        &config,
    );
    let app = api::create_app(state.clone(), get_metrics_handle());
    top_up(&app, "player-1", 10_000).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/payment_v1/payment/buy",
            Some("player-1"),
            serde_json::json!({ "items": [{ "item_id": "potion" }, { "item_id": "potion" }] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    wait_for_balance(&app, "player-1", 10_000).await;
    background.shutdown().await;
}
