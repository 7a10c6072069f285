//! API Routes
//!
//! HTTP endpoint definitions, request/response shaping, and the router.
//! Bodies use snake_case fields; monetary values travel as decimal strings
//! to preserve 64-bit precision across JSON.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::domain::{
    Account, ApiKey, AuthContext, Direction, Entry, Ledger, NewEntry, NewPosting, Role,
    TransactionRecord,
};
use crate::error::{AppError, AppResult};
use crate::service::{ListRequest, TrialBalance};

use super::middleware::{auth_middleware, request_id_middleware, require_admin};
use super::AppState;

/// Serializes `i64` minor units as decimal strings and accepts either a
/// string or a JSON integer on input.
pub(crate) mod minor_units {
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        struct MinorUnitsVisitor;

        impl<'de> de::Visitor<'de> for MinorUnitsVisitor {
            type Value = i64;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("minor units as a decimal string or integer")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
                Ok(v)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
                i64::try_from(v).map_err(|_| E::custom("amount out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
                v.parse().map_err(|_| E::custom("invalid minor-unit amount"))
            }
        }

        deserializer.deserialize_any(MinorUnitsVisitor)
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateLedgerRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Ledger> for LedgerResponse {
    fn from(ledger: Ledger) -> Self {
        Self {
            id: ledger.id,
            tenant_id: ledger.tenant_id,
            name: ledger.name,
            created_at: ledger.created_at,
            updated_at: ledger.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateAccountRequest {
    pub ledger_id: Uuid,
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub ledger_id: Uuid,
    pub name: String,
    pub currency: String,
    #[serde(with = "minor_units")]
    pub balance_minor: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            tenant_id: account.tenant_id,
            ledger_id: account.ledger_id,
            name: account.name,
            currency: account.currency,
            balance_minor: account.balance_minor,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PostEntryRequest {
    pub account_id: Uuid,
    pub direction: Direction,
    #[serde(with = "minor_units")]
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PostTransactionRequest {
    pub ledger_id: Uuid,
    pub reference: String,
    pub currency: String,
    pub entries: Vec<PostEntryRequest>,
}

#[derive(Debug, Serialize)]
pub struct PostTransactionResponse {
    pub transaction_id: Uuid,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub ledger_id: Uuid,
    pub reference: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionResponse {
    fn from(tx: TransactionRecord) -> Self {
        Self {
            id: tx.id,
            tenant_id: tx.tenant_id,
            ledger_id: tx.ledger_id,
            reference: tx.reference,
            currency: tx.currency,
            created_at: tx.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub direction: Direction,
    #[serde(with = "minor_units")]
    pub amount_minor: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<Entry> for EntryResponse {
    fn from(entry: Entry) -> Self {
        Self {
            id: entry.id,
            tenant_id: entry.tenant_id,
            transaction_id: entry.transaction_id,
            account_id: entry.account_id,
            direction: entry.direction,
            amount_minor: entry.amount_minor,
            currency: entry.currency,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub data: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub cursor: Option<String>,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct TrialBalanceLineResponse {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub side: Direction,
    #[serde(with = "minor_units")]
    pub amount_minor: i64,
}

#[derive(Debug, Serialize)]
pub struct TrialBalanceResponse {
    pub ledger_id: Uuid,
    pub lines: Vec<TrialBalanceLineResponse>,
    #[serde(with = "minor_units")]
    pub total_debits_minor: i64,
    #[serde(with = "minor_units")]
    pub total_credits_minor: i64,
}

impl From<TrialBalance> for TrialBalanceResponse {
    fn from(tb: TrialBalance) -> Self {
        Self {
            ledger_id: tb.ledger_id,
            lines: tb
                .lines
                .into_iter()
                .map(|line| TrialBalanceLineResponse {
                    account_id: line.account_id,
                    code: line.code,
                    name: line.name,
                    side: line.side,
                    amount_minor: line.amount_minor,
                })
                .collect(),
            total_debits_minor: tb.total_debits_minor,
            total_credits_minor: tb.total_credits_minor,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            tenant_id: key.tenant_id,
            name: key.name,
            role: key.role,
            created_at: key.created_at,
            revoked_at: key.revoked_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    /// The raw key; shown exactly once.
    pub api_key: String,
    pub key: ApiKeyResponse,
}

// =========================================================================
// Router
// =========================================================================

/// Builds the full application router.
///
/// `/health` and `/ready` bypass auth; everything under `/v1` requires a
/// credential; `/v1/admin` additionally requires the ADMIN role.
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api-keys", post(create_api_key).get(list_api_keys))
        .route("/api-keys/:key_id/revoke", post(revoke_api_key))
        .route_layer(middleware::from_fn(require_admin));

    let v1 = Router::new()
        .route("/ledgers", post(create_ledger).get(list_ledgers))
        .route("/ledgers/:ledger_id", get(get_ledger))
        .route("/ledgers/:ledger_id/trial-balance", get(trial_balance))
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/transactions", get(list_transactions).post(post_transaction))
        .route("/entries", get(list_entries))
        .nest("/admin", admin)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .nest("/v1", v1)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidInput(format!("invalid {what}: {raw}")))
}

// =========================================================================
// Health
// =========================================================================

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => Ok(Json(json!({ "ok": true }))),
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "NOT_READY", "message": "database unavailable" })),
            ))
        }
    }
}

// =========================================================================
// Ledgers
// =========================================================================

async fn create_ledger(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateLedgerRequest>,
) -> AppResult<(StatusCode, Json<LedgerResponse>)> {
    let ledger = state
        .ledgers
        .create_ledger(context.tenant_id, &request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(ledger.into())))
}

async fn list_ledgers(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> AppResult<Json<Vec<LedgerResponse>>> {
    let ledgers = state
        .ledgers
        .get_ledgers_by_tenant(context.tenant_id)
        .await?;
    Ok(Json(ledgers.into_iter().map(Into::into).collect()))
}

async fn get_ledger(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(ledger_id): Path<String>,
) -> AppResult<Json<LedgerResponse>> {
    let ledger_id = parse_uuid(&ledger_id, "ledger id")?;
    let ledger = state
        .ledgers
        .get_ledger_by_id(context.tenant_id, ledger_id)
        .await?;
    Ok(Json(ledger.into()))
}

async fn trial_balance(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(ledger_id): Path<String>,
) -> AppResult<Json<TrialBalanceResponse>> {
    let ledger_id = parse_uuid(&ledger_id, "ledger id")?;
    let report = state
        .reads
        .trial_balance(context.tenant_id, ledger_id)
        .await?;
    Ok(Json(report.into()))
}

// =========================================================================
// Accounts
// =========================================================================

async fn create_account(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateAccountRequest>,
) -> AppResult<(StatusCode, Json<AccountResponse>)> {
    let account = state
        .ledgers
        .create_account(
            context.tenant_id,
            request.ledger_id,
            &request.name,
            &request.currency,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

async fn list_accounts(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<PageResponse<AccountResponse>>> {
    let page = state
        .reads
        .list_accounts(ListRequest {
            tenant_id: context.tenant_id,
            limit: params.limit,
            cursor: params.cursor,
        })
        .await?;
    Ok(Json(PageResponse {
        data: page.data.into_iter().map(Into::into).collect(),
        next_cursor: page.next_cursor,
    }))
}

// =========================================================================
// Transactions & entries
// =========================================================================

async fn post_transaction(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<PostTransactionRequest>,
) -> AppResult<(StatusCode, Json<PostTransactionResponse>)> {
    let posting = NewPosting {
        tenant_id: context.tenant_id,
        ledger_id: request.ledger_id,
        reference: request.reference,
        currency: request.currency,
        entries: request
            .entries
            .into_iter()
            .map(|entry| NewEntry {
                account_id: entry.account_id,
                direction: entry.direction,
                amount_minor: entry.amount_minor,
                currency: entry.currency,
            })
            .collect(),
    };

    let outcome = state.posting.post_transaction(posting).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(PostTransactionResponse {
            transaction_id: outcome.transaction_id,
            created: outcome.created,
        }),
    ))
}

async fn list_transactions(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<PageResponse<TransactionResponse>>> {
    let page = state
        .reads
        .list_transactions(ListRequest {
            tenant_id: context.tenant_id,
            limit: params.limit,
            cursor: params.cursor,
        })
        .await?;
    Ok(Json(PageResponse {
        data: page.data.into_iter().map(Into::into).collect(),
        next_cursor: page.next_cursor,
    }))
}

async fn list_entries(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<PageResponse<EntryResponse>>> {
    let page = state
        .reads
        .list_entries(ListRequest {
            tenant_id: context.tenant_id,
            limit: params.limit,
            cursor: params.cursor,
        })
        .await?;
    Ok(Json(PageResponse {
        data: page.data.into_iter().map(Into::into).collect(),
        next_cursor: page.next_cursor,
    }))
}

// =========================================================================
// Admin: API keys
// =========================================================================

async fn create_api_key(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateApiKeyRequest>,
) -> AppResult<(StatusCode, Json<CreateApiKeyResponse>)> {
    let created = state
        .api_keys
        .create_api_key(&context, context.tenant_id, &request.name, request.role)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            api_key: created.api_key,
            key: created.key.into(),
        }),
    ))
}

async fn list_api_keys(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> AppResult<Json<Vec<ApiKeyResponse>>> {
    let keys = state.api_keys.list_api_keys(&context).await?;
    Ok(Json(keys.into_iter().map(Into::into).collect()))
}

async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Path(key_id): Path<String>,
) -> AppResult<StatusCode> {
    let key_id = parse_uuid(&key_id, "API key id")?;
    state.api_keys.revoke_api_key(&context, key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
