//! Repository layer
//!
//! Capability traits over tenant-isolated persistence, the opaque listing
//! cursor, and the Postgres implementation. Services depend only on the
//! traits; `PgRepository` satisfies all three.

pub mod cursor;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Account, ApiKey, Entry, Ledger, LedgerResult, NewPosting, Role, Tenant, TransactionRecord,
};

pub use cursor::PageCursor;
pub use postgres::PgRepository;

/// Result of `post_transaction`.
///
/// `created = false` means an identical `(tenant_id, reference)` was
/// already committed; no entries or balances changed and `transaction_id`
/// is the previously persisted id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostOutcome {
    pub transaction_id: Uuid,
    pub created: bool,
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Validated listing query. `limit` is already range-checked by the read
/// service; repositories fetch `limit + 1` rows to detect a next page.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub tenant_id: Uuid,
    pub limit: i64,
    pub cursor: Option<PageCursor>,
}

#[derive(Debug, Clone)]
pub struct NewLedger {
    pub tenant_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub tenant_id: Uuid,
    pub ledger_id: Uuid,
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub tenant_id: Uuid,
    pub name: String,
    pub role: Role,
    pub key_hash: String,
}

/// Write path and ledger CRUD.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Atomic posting write path: idempotent transaction insert, batch
    /// entry insert, and per-entry balance updates in ascending
    /// `account_id` order, all inside one tenant-bound DB transaction.
    async fn post_transaction(&self, posting: &NewPosting) -> LedgerResult<PostOutcome>;

    async fn create_ledger(&self, ledger: NewLedger) -> LedgerResult<Ledger>;

    async fn get_ledger(&self, tenant_id: Uuid, ledger_id: Uuid) -> LedgerResult<Option<Ledger>>;

    /// Ledgers for a tenant ordered by `(created_at, id)`.
    async fn list_ledgers(&self, tenant_id: Uuid) -> LedgerResult<Vec<Ledger>>;

    async fn create_account(&self, account: NewAccount) -> LedgerResult<Account>;
}

/// Cursor-paged listings and the trial-balance account scan.
#[async_trait]
pub trait LedgerReadRepository: Send + Sync {
    async fn list_accounts(&self, query: &ListQuery) -> LedgerResult<Page<Account>>;

    async fn list_transactions(&self, query: &ListQuery) -> LedgerResult<Page<TransactionRecord>>;

    async fn list_entries(&self, query: &ListQuery) -> LedgerResult<Page<Entry>>;

    /// All accounts of one ledger ordered by `(created_at, id)`.
    async fn ledger_accounts(&self, tenant_id: Uuid, ledger_id: Uuid)
        -> LedgerResult<Vec<Account>>;
}

/// API-key persistence. Not tenant-bound at the database level:
/// authentication has to resolve a key before any tenant is known.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn find_key_by_hash(&self, key_hash: &str) -> LedgerResult<Option<ApiKey>>;

    async fn insert_key(&self, key: NewApiKey) -> LedgerResult<ApiKey>;

    async fn list_keys(&self, tenant_id: Uuid) -> LedgerResult<Vec<ApiKey>>;

    /// Marks the key revoked. Returns false when the key does not exist,
    /// belongs to another tenant, or is already revoked.
    async fn revoke_key(&self, tenant_id: Uuid, api_key_id: Uuid) -> LedgerResult<bool>;

    /// Total key count across all tenants (zero-state detection).
    async fn count_keys(&self) -> LedgerResult<i64>;

    async fn create_tenant(&self, name: &str) -> LedgerResult<Tenant>;
}

/// Turns a `limit + 1` row fetch into a page: the extra row is dropped and
/// the cursor of the last kept row becomes `next_cursor`.
pub(crate) fn paginate<T>(
    mut rows: Vec<T>,
    limit: usize,
    cursor_of: impl Fn(&T) -> PageCursor,
) -> LedgerResult<Page<T>> {
    let next_cursor = if rows.len() > limit {
        rows.truncate(limit);
        Some(cursor_of(&rows[limit - 1]).encode()?)
    } else {
        None
    };
    Ok(Page {
        data: rows,
        next_cursor,
    })
}
