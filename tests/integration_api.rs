//! API integration tests.
//!
//! End-to-end scenarios over the real router and a real database.
//! Requires DATABASE_URL pointing at a migrated Postgres instance.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use ledgerd::api::{create_router, AppState};

mod common;

async fn test_app() -> (Router, common::TestEnv) {
    let env = common::setup_test_db().await;
    let app = create_router(AppState::new(env.pool.clone()));
    (app, env)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    api_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("X-Api-Key", key);
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_ledger(app: &Router, api_key: &str, name: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/v1/ledgers",
        Some(api_key),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "ledger creation failed: {body}");
    body["id"].as_str().unwrap().to_owned()
}

async fn create_account(app: &Router, api_key: &str, ledger_id: &str, name: &str, currency: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/v1/accounts",
        Some(api_key),
        Some(json!({ "ledger_id": ledger_id, "name": name, "currency": currency })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "account creation failed: {body}");
    body["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn test_post_and_trial_balance_e2e() {
    let (app, _env) = test_app().await;
    let key = common::ADMIN_KEY_A;

    let ledger_id = create_ledger(&app, key, "general").await;
    let cash = create_account(&app, key, &ledger_id, "Cash", "USD").await;
    let revenue = create_account(&app, key, &ledger_id, "Revenue", "USD").await;

    let posting = json!({
        "ledger_id": ledger_id,
        "reference": "r1",
        "currency": "USD",
        "entries": [
            { "account_id": cash, "direction": "DEBIT", "amount_minor": "100", "currency": "USD" },
            { "account_id": revenue, "direction": "CREDIT", "amount_minor": "100", "currency": "USD" }
        ]
    });

    let (status, body) = send(&app, Method::POST, "/v1/transactions", Some(key), Some(posting.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "posting failed: {body}");
    assert_eq!(body["created"], true);
    let transaction_id = body["transaction_id"].as_str().unwrap().to_owned();

    // Identical re-post resolves to the same transaction without effects.
    let (status, body) = send(&app, Method::POST, "/v1/transactions", Some(key), Some(posting)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], false);
    assert_eq!(body["transaction_id"], transaction_id.as_str());

    // Balances: DEBIT decreased Cash, CREDIT increased Revenue.
    let (status, body) = send(&app, Method::GET, "/v1/accounts", Some(key), None).await;
    assert_eq!(status, StatusCode::OK);
    let accounts = body["data"].as_array().unwrap();
    assert_eq!(accounts.len(), 2);
    let balance_of = |id: &str| {
        accounts
            .iter()
            .find(|a| a["id"] == id)
            .map(|a| a["balance_minor"].as_str().unwrap().to_owned())
            .unwrap()
    };
    assert_eq!(balance_of(&cash), "-100");
    assert_eq!(balance_of(&revenue), "100");

    // Trial balance: both totals 100, Cash DEBIT normal, Revenue CREDIT.
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/v1/ledgers/{ledger_id}/trial-balance"),
        Some(key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_debits_minor"], "100");
    assert_eq!(body["total_credits_minor"], "100");
    let lines = body["lines"].as_array().unwrap();
    let side_of = |id: &str| {
        lines
            .iter()
            .find(|l| l["account_id"] == id)
            .map(|l| l["side"].as_str().unwrap().to_owned())
            .unwrap()
    };
    assert_eq!(side_of(&cash), "DEBIT");
    assert_eq!(side_of(&revenue), "CREDIT");

    // One transaction and two entries listed.
    let (_, body) = send(&app, Method::GET, "/v1/transactions", Some(key), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = send(&app, Method::GET, "/v1/entries", Some(key), None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unbalanced_posting_rejected_without_side_effects() {
    let (app, _env) = test_app().await;
    let key = common::ADMIN_KEY_A;

    let ledger_id = create_ledger(&app, key, "general").await;
    let cash = create_account(&app, key, &ledger_id, "Cash", "USD").await;
    let revenue = create_account(&app, key, &ledger_id, "Revenue", "USD").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/transactions",
        Some(key),
        Some(json!({
            "ledger_id": ledger_id,
            "reference": "r1",
            "currency": "USD",
            "entries": [
                { "account_id": cash, "direction": "DEBIT", "amount_minor": "100", "currency": "USD" },
                { "account_id": revenue, "direction": "CREDIT", "amount_minor": "99", "currency": "USD" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVARIANT_VIOLATION");

    let (_, body) = send(&app, Method::GET, "/v1/transactions", Some(key), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
    let (_, body) = send(&app, Method::GET, "/v1/entries", Some(key), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_currency_mismatch_rejected_without_side_effects() {
    let (app, _env) = test_app().await;
    let key = common::ADMIN_KEY_A;

    let ledger_id = create_ledger(&app, key, "general").await;
    let cash_eur = create_account(&app, key, &ledger_id, "Cash", "EUR").await;
    let revenue = create_account(&app, key, &ledger_id, "Revenue", "USD").await;

    // Entries agree with the transaction currency, but the EUR account
    // cannot match the balance-update predicate.
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/transactions",
        Some(key),
        Some(json!({
            "ledger_id": ledger_id,
            "reference": "r1",
            "currency": "USD",
            "entries": [
                { "account_id": cash_eur, "direction": "DEBIT", "amount_minor": "100", "currency": "USD" },
                { "account_id": revenue, "direction": "CREDIT", "amount_minor": "100", "currency": "USD" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "account ledger/currency mismatch");

    let (_, body) = send(&app, Method::GET, "/v1/transactions", Some(key), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
    let (_, body) = send(&app, Method::GET, "/v1/accounts", Some(key), None).await;
    for account in body["data"].as_array().unwrap() {
        assert_eq!(account["balance_minor"], "0");
    }
}

#[tokio::test]
async fn test_account_listing_pagination() {
    let (app, _env) = test_app().await;
    let key = common::ADMIN_KEY_A;

    let ledger_id = create_ledger(&app, key, "general").await;
    let a = create_account(&app, key, &ledger_id, "a", "USD").await;
    let b = create_account(&app, key, &ledger_id, "b", "USD").await;
    let c = create_account(&app, key, &ledger_id, "c", "USD").await;

    let (status, body) = send(&app, Method::GET, "/v1/accounts?limit=2", Some(key), None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|x| x["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str()]);
    let cursor = body["next_cursor"].as_str().expect("expected next_cursor").to_owned();

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/v1/accounts?limit=2&cursor={cursor}"),
        Some(key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|x| x["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![c.as_str()]);
    assert!(body["next_cursor"].is_null());

    let (status, body) = send(&app, Method::GET, "/v1/accounts?limit=500", Some(key), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "oversized limit: {body}");
    let (status, _) = send(&app, Method::GET, "/v1/accounts?cursor=garbage", Some(key), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tenant_isolation_across_listings() {
    let (app, _env) = test_app().await;

    let ledger_a = create_ledger(&app, common::ADMIN_KEY_A, "a-ledger").await;
    create_account(&app, common::ADMIN_KEY_A, &ledger_a, "Cash", "USD").await;

    // Tenant B sees none of tenant A's rows.
    let (_, body) = send(&app, Method::GET, "/v1/ledgers", Some(common::ADMIN_KEY_B), None).await;
    assert!(body.as_array().unwrap().is_empty());
    let (_, body) = send(&app, Method::GET, "/v1/accounts", Some(common::ADMIN_KEY_B), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    // Direct lookups and the trial balance 404 across tenants.
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/v1/ledgers/{ledger_a}"),
        Some(common::ADMIN_KEY_B),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "LEDGER_NOT_FOUND");

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/v1/ledgers/{ledger_a}/trial-balance"),
        Some(common::ADMIN_KEY_B),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_key_lifecycle_and_admin_gating() {
    let (app, _env) = test_app().await;
    let admin = common::ADMIN_KEY_A;

    // Issue a SERVICE key.
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/admin/api-keys",
        Some(admin),
        Some(json!({ "name": "worker", "role": "SERVICE" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "key creation failed: {body}");
    let raw_service_key = body["api_key"].as_str().unwrap().to_owned();
    let service_key_id = body["key"]["id"].as_str().unwrap().to_owned();
    assert!(raw_service_key.starts_with("llk_"));

    // The service key works on regular endpoints...
    let (status, _) = send(&app, Method::GET, "/v1/ledgers", Some(&raw_service_key), None).await;
    assert_eq!(status, StatusCode::OK);

    // ...but is rejected on every admin endpoint.
    let (status, body) = send(&app, Method::GET, "/v1/admin/api-keys", Some(&raw_service_key), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");
    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/admin/api-keys",
        Some(&raw_service_key),
        Some(json!({ "name": "rogue", "role": "ADMIN" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admin lists both keys, then revokes the service key.
    let (_, body) = send(&app, Method::GET, "/v1/admin/api-keys", Some(admin), None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/v1/admin/api-keys/{service_key_id}/revoke"),
        Some(admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The revoked key no longer authenticates anywhere.
    let (status, body) = send(&app, Method::GET, "/v1/ledgers", Some(&raw_service_key), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid API key");

    // Revoking again reports the key as gone.
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/v1/admin/api-keys/{service_key_id}/revoke"),
        Some(admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "API key not found");
}

#[tokio::test]
async fn test_auth_edge_cases() {
    let (app, _env) = test_app().await;

    // No credential.
    let (status, body) = send(&app, Method::GET, "/v1/ledgers", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "API key is required");

    // Unknown credential.
    let (status, body) = send(&app, Method::GET, "/v1/ledgers", Some("llk_bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid API key");

    // Bearer fallback.
    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/ledgers")
        .header("Authorization", format!("Bearer {}", common::ADMIN_KEY_A))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health and readiness bypass auth.
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let (status, _) = send(&app, Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_echoed_and_generated() {
    let (app, _env) = test_app().await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header("X-Request-Id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-42"
    );

    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let generated = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_owned();
    assert!(uuid::Uuid::parse_str(&generated).is_ok());
}

#[tokio::test]
async fn test_invalid_uuid_path_is_invalid_input() {
    let (app, _env) = test_app().await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/v1/ledgers/not-a-uuid",
        Some(common::ADMIN_KEY_A),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_INPUT");
}
