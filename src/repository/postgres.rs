//! Postgres repository.
//!
//! Raw-SQL persistence over a shared `PgPool`. Every tenant-scoped
//! operation runs inside a database transaction that first binds the
//! tenant id into the transaction-local session variable `app.tenant_id`;
//! row-level-security policies key on that variable, so the application
//! filter and the database enforce isolation independently. The binding
//! dies with the transaction, which is what makes it safe to combine with
//! connection pooling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, ApiKey, Direction, Entry, Ledger, LedgerError, LedgerResult, NewPosting, Role,
    Tenant, TransactionRecord,
};

use super::{
    paginate, ApiKeyRepository, LedgerReadRepository, LedgerRepository, ListQuery, NewAccount,
    NewApiKey, NewLedger, Page, PageCursor, PostOutcome,
};

type AccountRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    String,
    i64,
    DateTime<Utc>,
    DateTime<Utc>,
);
type LedgerRow = (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>);
type TransactionRow = (Uuid, Uuid, Uuid, String, String, DateTime<Utc>);
type EntryRow = (Uuid, Uuid, Uuid, Uuid, String, i64, String, DateTime<Utc>);
type ApiKeyRow = (
    Uuid,
    Uuid,
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

/// Concrete repository satisfying all three capability traits.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a transaction and binds the tenant id for RLS.
    ///
    /// `set_config(..., true)` scopes the setting to the transaction, so
    /// the binding is torn down at commit or rollback and never leaks to
    /// the next checkout of the pooled connection.
    async fn begin_tenant_tx(
        &self,
        tenant_id: Uuid,
    ) -> LedgerResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(log_repository_error)?;
        sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(log_repository_error)?;
        Ok(tx)
    }
}

/// Maps a database error to the domain taxonomy.
///
/// Constraint classes (foreign key, unique, check, not null) and invalid
/// text representation become `INVARIANT_VIOLATION`; numeric range errors
/// abort the transaction and surface as `REPOSITORY_ERROR`, as does
/// everything else. The original cause is logged here and not exposed.
fn translate_db_err(err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            let code = code.as_ref();
            if code == "22003" {
                tracing::warn!(sqlstate = code, "numeric range exceeded, aborting transaction");
                return LedgerError::repository("numeric range exceeded");
            }
            if code.starts_with("23") || code == "22P02" {
                let constraint = db.constraint().unwrap_or("unknown");
                return LedgerError::invariant(format!("constraint violation: {constraint}"));
            }
        }
    }
    log_repository_error(err)
}

fn log_repository_error(err: sqlx::Error) -> LedgerError {
    tracing::error!(error = %err, "database error");
    LedgerError::repository("database error")
}

fn parse_direction(raw: &str) -> LedgerResult<Direction> {
    Direction::parse(raw)
        .ok_or_else(|| LedgerError::repository(format!("corrupt entry direction: {raw}")))
}

fn parse_role(raw: &str) -> LedgerResult<Role> {
    Role::parse(raw).ok_or_else(|| LedgerError::repository(format!("corrupt key role: {raw}")))
}

fn ledger_from_row(row: LedgerRow) -> Ledger {
    let (id, tenant_id, name, created_at, updated_at) = row;
    Ledger {
        id,
        tenant_id,
        name,
        created_at,
        updated_at,
    }
}

fn account_from_row(row: AccountRow) -> Account {
    let (id, tenant_id, ledger_id, name, currency, balance_minor, created_at, updated_at) = row;
    Account {
        id,
        tenant_id,
        ledger_id,
        name,
        currency,
        balance_minor,
        created_at,
        updated_at,
    }
}

fn transaction_from_row(row: TransactionRow) -> TransactionRecord {
    let (id, tenant_id, ledger_id, reference, currency, created_at) = row;
    TransactionRecord {
        id,
        tenant_id,
        ledger_id,
        reference,
        currency,
        created_at,
    }
}

fn entry_from_row(row: EntryRow) -> LedgerResult<Entry> {
    let (id, tenant_id, transaction_id, account_id, direction, amount_minor, currency, created_at) =
        row;
    Ok(Entry {
        id,
        tenant_id,
        transaction_id,
        account_id,
        direction: parse_direction(&direction)?,
        amount_minor,
        currency,
        created_at,
    })
}

fn api_key_from_row(row: ApiKeyRow) -> LedgerResult<ApiKey> {
    let (id, tenant_id, name, role, key_hash, created_at, revoked_at) = row;
    Ok(ApiKey {
        id,
        tenant_id,
        name,
        role: parse_role(&role)?,
        key_hash,
        created_at,
        revoked_at,
    })
}

#[async_trait]
impl LedgerRepository for PgRepository {
    async fn post_transaction(&self, posting: &NewPosting) -> LedgerResult<PostOutcome> {
        let mut tx = self.begin_tenant_tx(posting.tenant_id).await?;

        // Idempotent header insert: on a (tenant_id, reference) conflict
        // nothing is written and no id comes back.
        let transaction_id = Uuid::new_v4();
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (id, tenant_id, ledger_id, reference, currency)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, reference) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(transaction_id)
        .bind(posting.tenant_id)
        .bind(posting.ledger_id)
        .bind(&posting.reference)
        .bind(&posting.currency)
        .fetch_optional(&mut *tx)
        .await
        .map_err(translate_db_err)?;

        let Some(transaction_id) = inserted else {
            let existing: Option<Uuid> = sqlx::query_scalar(
                "SELECT id FROM transactions WHERE tenant_id = $1 AND reference = $2",
            )
            .bind(posting.tenant_id)
            .bind(&posting.reference)
            .fetch_optional(&mut *tx)
            .await
            .map_err(translate_db_err)?;

            tx.commit().await.map_err(log_repository_error)?;

            return match existing {
                Some(id) => Ok(PostOutcome {
                    transaction_id: id,
                    created: false,
                }),
                // The conflicting row disappeared between the insert and
                // the lookup; not expected under forward-only posting.
                None => Err(LedgerError::repository(
                    "transaction vanished after reference conflict",
                )),
            };
        };

        // All entry rows in one batch.
        let ids: Vec<Uuid> = posting.entries.iter().map(|_| Uuid::new_v4()).collect();
        let account_ids: Vec<Uuid> = posting.entries.iter().map(|e| e.account_id).collect();
        let directions: Vec<String> = posting
            .entries
            .iter()
            .map(|e| e.direction.as_str().to_owned())
            .collect();
        let amounts: Vec<i64> = posting.entries.iter().map(|e| e.amount_minor).collect();

        sqlx::query(
            r#"
            INSERT INTO entries (id, tenant_id, transaction_id, account_id, direction, amount_minor, currency)
            SELECT unnest($1::uuid[]), $2, $3, unnest($4::uuid[]), unnest($5::text[]), unnest($6::bigint[]), $7
            "#,
        )
        .bind(&ids)
        .bind(posting.tenant_id)
        .bind(transaction_id)
        .bind(&account_ids)
        .bind(&directions)
        .bind(&amounts)
        .bind(&posting.currency)
        .execute(&mut *tx)
        .await
        .map_err(translate_db_err)?;

        // Balance deltas in ascending account_id order. Concurrent
        // postings over overlapping account sets take their row locks in
        // the same order and cannot deadlock.
        let mut ordered: Vec<_> = posting.entries.iter().collect();
        ordered.sort_by_key(|e| e.account_id);

        for entry in ordered {
            let delta = entry.direction.signed(entry.amount_minor);
            let updated: Option<Uuid> = sqlx::query_scalar(
                r#"
                UPDATE accounts
                SET balance_minor = balance_minor + $1, updated_at = NOW()
                WHERE id = $2 AND tenant_id = $3 AND ledger_id = $4 AND currency = $5
                RETURNING id
                "#,
            )
            .bind(delta)
            .bind(entry.account_id)
            .bind(posting.tenant_id)
            .bind(posting.ledger_id)
            .bind(&entry.currency)
            .fetch_optional(&mut *tx)
            .await
            .map_err(translate_db_err)?;

            if updated.is_none() {
                return Err(LedgerError::invariant("account ledger/currency mismatch"));
            }
        }

        tx.commit().await.map_err(log_repository_error)?;

        Ok(PostOutcome {
            transaction_id,
            created: true,
        })
    }

    async fn create_ledger(&self, ledger: NewLedger) -> LedgerResult<Ledger> {
        let mut tx = self.begin_tenant_tx(ledger.tenant_id).await?;

        let row: LedgerRow = sqlx::query_as(
            r#"
            INSERT INTO ledgers (id, tenant_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, tenant_id, name, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ledger.tenant_id)
        .bind(&ledger.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(translate_db_err)?;

        tx.commit().await.map_err(log_repository_error)?;
        Ok(ledger_from_row(row))
    }

    async fn get_ledger(&self, tenant_id: Uuid, ledger_id: Uuid) -> LedgerResult<Option<Ledger>> {
        let mut tx = self.begin_tenant_tx(tenant_id).await?;

        let row: Option<LedgerRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, created_at, updated_at
            FROM ledgers
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(ledger_id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(translate_db_err)?;

        tx.commit().await.map_err(log_repository_error)?;
        Ok(row.map(ledger_from_row))
    }

    async fn list_ledgers(&self, tenant_id: Uuid) -> LedgerResult<Vec<Ledger>> {
        let mut tx = self.begin_tenant_tx(tenant_id).await?;

        let rows: Vec<LedgerRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, created_at, updated_at
            FROM ledgers
            WHERE tenant_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(translate_db_err)?;

        tx.commit().await.map_err(log_repository_error)?;
        Ok(rows.into_iter().map(ledger_from_row).collect())
    }

    async fn create_account(&self, account: NewAccount) -> LedgerResult<Account> {
        let mut tx = self.begin_tenant_tx(account.tenant_id).await?;

        let ledger: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM ledgers WHERE id = $1 AND tenant_id = $2")
                .bind(account.ledger_id)
                .bind(account.tenant_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(translate_db_err)?;
        if ledger.is_none() {
            return Err(LedgerError::LedgerNotFound(account.ledger_id));
        }

        let row: AccountRow = sqlx::query_as(
            r#"
            INSERT INTO accounts (id, tenant_id, ledger_id, name, currency)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, tenant_id, ledger_id, name, currency, balance_minor, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account.tenant_id)
        .bind(account.ledger_id)
        .bind(&account.name)
        .bind(&account.currency)
        .fetch_one(&mut *tx)
        .await
        .map_err(translate_db_err)?;

        tx.commit().await.map_err(log_repository_error)?;
        Ok(account_from_row(row))
    }
}

#[async_trait]
impl LedgerReadRepository for PgRepository {
    async fn list_accounts(&self, query: &ListQuery) -> LedgerResult<Page<Account>> {
        let mut tx = self.begin_tenant_tx(query.tenant_id).await?;

        let rows: Vec<AccountRow> = match &query.cursor {
            Some(cursor) => {
                sqlx::query_as(
                    r#"
                    SELECT id, tenant_id, ledger_id, name, currency, balance_minor, created_at, updated_at
                    FROM accounts
                    WHERE tenant_id = $1
                      AND (created_at > $2 OR (created_at = $2 AND id > $3))
                    ORDER BY created_at ASC, id ASC
                    LIMIT $4
                    "#,
                )
                .bind(query.tenant_id)
                .bind(cursor.created_at)
                .bind(cursor.id)
                .bind(query.limit + 1)
                .fetch_all(&mut *tx)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, tenant_id, ledger_id, name, currency, balance_minor, created_at, updated_at
                    FROM accounts
                    WHERE tenant_id = $1
                    ORDER BY created_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(query.tenant_id)
                .bind(query.limit + 1)
                .fetch_all(&mut *tx)
                .await
            }
        }
        .map_err(translate_db_err)?;

        tx.commit().await.map_err(log_repository_error)?;

        let accounts: Vec<Account> = rows.into_iter().map(account_from_row).collect();
        paginate(accounts, query.limit as usize, |a| {
            PageCursor::new(a.created_at, a.id)
        })
    }

    async fn list_transactions(&self, query: &ListQuery) -> LedgerResult<Page<TransactionRecord>> {
        let mut tx = self.begin_tenant_tx(query.tenant_id).await?;

        let rows: Vec<TransactionRow> = match &query.cursor {
            Some(cursor) => {
                sqlx::query_as(
                    r#"
                    SELECT id, tenant_id, ledger_id, reference, currency, created_at
                    FROM transactions
                    WHERE tenant_id = $1
                      AND (created_at > $2 OR (created_at = $2 AND id > $3))
                    ORDER BY created_at ASC, id ASC
                    LIMIT $4
                    "#,
                )
                .bind(query.tenant_id)
                .bind(cursor.created_at)
                .bind(cursor.id)
                .bind(query.limit + 1)
                .fetch_all(&mut *tx)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, tenant_id, ledger_id, reference, currency, created_at
                    FROM transactions
                    WHERE tenant_id = $1
                    ORDER BY created_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(query.tenant_id)
                .bind(query.limit + 1)
                .fetch_all(&mut *tx)
                .await
            }
        }
        .map_err(translate_db_err)?;

        tx.commit().await.map_err(log_repository_error)?;

        let transactions: Vec<TransactionRecord> =
            rows.into_iter().map(transaction_from_row).collect();
        paginate(transactions, query.limit as usize, |t| {
            PageCursor::new(t.created_at, t.id)
        })
    }

    async fn list_entries(&self, query: &ListQuery) -> LedgerResult<Page<Entry>> {
        let mut tx = self.begin_tenant_tx(query.tenant_id).await?;

        // Entries filter by their own denormalized tenant_id; the query
        // stays single-table and fully RLS-covered.
        let rows: Vec<EntryRow> = match &query.cursor {
            Some(cursor) => {
                sqlx::query_as(
                    r#"
                    SELECT id, tenant_id, transaction_id, account_id, direction, amount_minor, currency, created_at
                    FROM entries
                    WHERE tenant_id = $1
                      AND (created_at > $2 OR (created_at = $2 AND id > $3))
                    ORDER BY created_at ASC, id ASC
                    LIMIT $4
                    "#,
                )
                .bind(query.tenant_id)
                .bind(cursor.created_at)
                .bind(cursor.id)
                .bind(query.limit + 1)
                .fetch_all(&mut *tx)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, tenant_id, transaction_id, account_id, direction, amount_minor, currency, created_at
                    FROM entries
                    WHERE tenant_id = $1
                    ORDER BY created_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(query.tenant_id)
                .bind(query.limit + 1)
                .fetch_all(&mut *tx)
                .await
            }
        }
        .map_err(translate_db_err)?;

        tx.commit().await.map_err(log_repository_error)?;

        let entries: Vec<Entry> = rows
            .into_iter()
            .map(entry_from_row)
            .collect::<LedgerResult<_>>()?;
        paginate(entries, query.limit as usize, |e| {
            PageCursor::new(e.created_at, e.id)
        })
    }

    async fn ledger_accounts(
        &self,
        tenant_id: Uuid,
        ledger_id: Uuid,
    ) -> LedgerResult<Vec<Account>> {
        let mut tx = self.begin_tenant_tx(tenant_id).await?;

        let rows: Vec<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, ledger_id, name, currency, balance_minor, created_at, updated_at
            FROM accounts
            WHERE tenant_id = $1 AND ledger_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .bind(ledger_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(translate_db_err)?;

        tx.commit().await.map_err(log_repository_error)?;
        Ok(rows.into_iter().map(account_from_row).collect())
    }
}

#[async_trait]
impl ApiKeyRepository for PgRepository {
    async fn find_key_by_hash(&self, key_hash: &str) -> LedgerResult<Option<ApiKey>> {
        let row: Option<ApiKeyRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, role, key_hash, created_at, revoked_at
            FROM api_keys
            WHERE key_hash = $1
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(translate_db_err)?;

        row.map(api_key_from_row).transpose()
    }

    async fn insert_key(&self, key: NewApiKey) -> LedgerResult<ApiKey> {
        let row: ApiKeyRow = sqlx::query_as(
            r#"
            INSERT INTO api_keys (id, tenant_id, name, role, key_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, tenant_id, name, role, key_hash, created_at, revoked_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key.tenant_id)
        .bind(&key.name)
        .bind(key.role.as_str())
        .bind(&key.key_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(translate_db_err)?;

        api_key_from_row(row)
    }

    async fn list_keys(&self, tenant_id: Uuid) -> LedgerResult<Vec<ApiKey>> {
        let rows: Vec<ApiKeyRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, role, key_hash, created_at, revoked_at
            FROM api_keys
            WHERE tenant_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(translate_db_err)?;

        rows.into_iter().map(api_key_from_row).collect()
    }

    async fn revoke_key(&self, tenant_id: Uuid, api_key_id: Uuid) -> LedgerResult<bool> {
        let rows = sqlx::query(
            r#"
            UPDATE api_keys
            SET revoked_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(api_key_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await
        .map_err(translate_db_err)?
        .rows_affected();

        Ok(rows > 0)
    }

    async fn count_keys(&self) -> LedgerResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM api_keys")
            .fetch_one(&self.pool)
            .await
            .map_err(translate_db_err)
    }

    async fn create_tenant(&self, name: &str) -> LedgerResult<Tenant> {
        let row: (Uuid, String, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO tenants (id, name)
            VALUES ($1, $2)
            RETURNING id, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(translate_db_err)?;

        Ok(Tenant {
            id: row.0,
            name: row.1,
            created_at: row.2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direction_rejects_unknown() {
        assert!(parse_direction("DEBIT").is_ok());
        let err = parse_direction("SIDEWAYS").unwrap_err();
        assert_eq!(err.code(), "REPOSITORY_ERROR");
    }

    #[test]
    fn test_parse_role_rejects_unknown() {
        assert!(parse_role("ADMIN").is_ok());
        assert!(parse_role("ROOT").is_err());
    }

    #[test]
    fn test_entry_row_mapping() {
        let row: EntryRow = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "CREDIT".into(),
            250,
            "USD".into(),
            Utc::now(),
        );
        let entry = entry_from_row(row).unwrap();
        assert_eq!(entry.direction, Direction::Credit);
        assert_eq!(entry.amount_minor, 250);
    }
}
