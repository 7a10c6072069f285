//! In-memory repository fake for unit tests.
//!
//! Implements all three repository capability traits over a mutex-guarded
//! state. Mutations stage a full copy of the state and swap it in on
//! success, mirroring the all-or-nothing behavior of the database
//! transaction. Timestamps come from a monotonic tick so listing order is
//! deterministic.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::domain::{
    Account, ApiKey, Entry, Ledger, LedgerError, LedgerResult, NewPosting, Tenant,
    TransactionRecord,
};
use crate::repository::{
    paginate, ApiKeyRepository, LedgerReadRepository, LedgerRepository, ListQuery, NewAccount,
    NewApiKey, NewLedger, Page, PageCursor, PostOutcome,
};

#[derive(Debug, Default, Clone)]
struct State {
    tenants: Vec<Tenant>,
    ledgers: Vec<Ledger>,
    accounts: Vec<Account>,
    transactions: Vec<TransactionRecord>,
    entries: Vec<Entry>,
    keys: Vec<ApiKey>,
    ticks: i64,
}

impl State {
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        self.ticks += 1;
        base + Duration::seconds(self.ticks)
    }
}

#[derive(Debug, Default)]
pub(crate) struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test seeding shortcut; production tenants come from bootstrap.
    pub fn seed_tenant(&self, name: &str) -> Tenant {
        let mut state = self.state.lock().unwrap();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            created_at: state.next_timestamp(),
        };
        state.tenants.push(tenant.clone());
        tenant
    }

    pub fn account_balance(&self, account_id: Uuid) -> Option<i64> {
        let state = self.state.lock().unwrap();
        state
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .map(|a| a.balance_minor)
    }

    pub fn entries_for_account(&self, account_id: Uuid) -> Vec<Entry> {
        let state = self.state.lock().unwrap();
        state
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Forces an account balance, bypassing posting (overflow scenarios).
    pub fn set_balance(&self, account_id: Uuid, balance_minor: i64) {
        let mut state = self.state.lock().unwrap();
        if let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) {
            account.balance_minor = balance_minor;
        }
    }
}

fn sort_by_created_at_then_id<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, Uuid)) {
    items.sort_by_key(key);
}

fn after_cursor(cursor: &Option<PageCursor>, created_at: DateTime<Utc>, id: Uuid) -> bool {
    match cursor {
        None => true,
        Some(c) => created_at > c.created_at || (created_at == c.created_at && id > c.id),
    }
}

#[async_trait]
impl LedgerRepository for InMemoryRepository {
    async fn post_transaction(&self, posting: &NewPosting) -> LedgerResult<PostOutcome> {
        let mut state = self.state.lock().unwrap();

        if let Some(existing) = state
            .transactions
            .iter()
            .find(|t| t.tenant_id == posting.tenant_id && t.reference == posting.reference)
        {
            return Ok(PostOutcome {
                transaction_id: existing.id,
                created: false,
            });
        }

        // Stage every mutation on a copy; swap in only on success.
        let mut staged = state.clone();
        let created_at = staged.next_timestamp();
        let transaction_id = Uuid::new_v4();
        staged.transactions.push(TransactionRecord {
            id: transaction_id,
            tenant_id: posting.tenant_id,
            ledger_id: posting.ledger_id,
            reference: posting.reference.clone(),
            currency: posting.currency.clone(),
            created_at,
        });

        for entry in &posting.entries {
            staged.entries.push(Entry {
                id: Uuid::new_v4(),
                tenant_id: posting.tenant_id,
                transaction_id,
                account_id: entry.account_id,
                direction: entry.direction,
                amount_minor: entry.amount_minor,
                currency: entry.currency.clone(),
                created_at,
            });
        }

        let mut ordered: Vec<_> = posting.entries.iter().collect();
        ordered.sort_by_key(|e| e.account_id);
        for entry in ordered {
            let delta = entry.direction.signed(entry.amount_minor);
            let account = staged.accounts.iter_mut().find(|a| {
                a.id == entry.account_id
                    && a.tenant_id == posting.tenant_id
                    && a.ledger_id == posting.ledger_id
                    && a.currency == entry.currency
            });
            let Some(account) = account else {
                return Err(LedgerError::invariant("account ledger/currency mismatch"));
            };
            account.balance_minor = account
                .balance_minor
                .checked_add(delta)
                .ok_or_else(|| LedgerError::repository("numeric range exceeded"))?;
            account.updated_at = created_at;
        }

        *state = staged;
        Ok(PostOutcome {
            transaction_id,
            created: true,
        })
    }

    async fn create_ledger(&self, ledger: NewLedger) -> LedgerResult<Ledger> {
        let mut state = self.state.lock().unwrap();
        let now = state.next_timestamp();
        let created = Ledger {
            id: Uuid::new_v4(),
            tenant_id: ledger.tenant_id,
            name: ledger.name,
            created_at: now,
            updated_at: now,
        };
        state.ledgers.push(created.clone());
        Ok(created)
    }

    async fn get_ledger(&self, tenant_id: Uuid, ledger_id: Uuid) -> LedgerResult<Option<Ledger>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ledgers
            .iter()
            .find(|l| l.id == ledger_id && l.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_ledgers(&self, tenant_id: Uuid) -> LedgerResult<Vec<Ledger>> {
        let state = self.state.lock().unwrap();
        let mut ledgers: Vec<Ledger> = state
            .ledgers
            .iter()
            .filter(|l| l.tenant_id == tenant_id)
            .cloned()
            .collect();
        sort_by_created_at_then_id(&mut ledgers, |l| (l.created_at, l.id));
        Ok(ledgers)
    }

    async fn create_account(&self, account: NewAccount) -> LedgerResult<Account> {
        let mut state = self.state.lock().unwrap();
        if !state
            .ledgers
            .iter()
            .any(|l| l.id == account.ledger_id && l.tenant_id == account.tenant_id)
        {
            return Err(LedgerError::LedgerNotFound(account.ledger_id));
        }
        let now = state.next_timestamp();
        let created = Account {
            id: Uuid::new_v4(),
            tenant_id: account.tenant_id,
            ledger_id: account.ledger_id,
            name: account.name,
            currency: account.currency,
            balance_minor: 0,
            created_at: now,
            updated_at: now,
        };
        state.accounts.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl LedgerReadRepository for InMemoryRepository {
    async fn list_accounts(&self, query: &ListQuery) -> LedgerResult<Page<Account>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Account> = state
            .accounts
            .iter()
            .filter(|a| a.tenant_id == query.tenant_id)
            .filter(|a| after_cursor(&query.cursor, a.created_at, a.id))
            .cloned()
            .collect();
        sort_by_created_at_then_id(&mut rows, |a| (a.created_at, a.id));
        rows.truncate(query.limit as usize + 1);
        paginate(rows, query.limit as usize, |a| {
            PageCursor::new(a.created_at, a.id)
        })
    }

    async fn list_transactions(&self, query: &ListQuery) -> LedgerResult<Page<TransactionRecord>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<TransactionRecord> = state
            .transactions
            .iter()
            .filter(|t| t.tenant_id == query.tenant_id)
            .filter(|t| after_cursor(&query.cursor, t.created_at, t.id))
            .cloned()
            .collect();
        sort_by_created_at_then_id(&mut rows, |t| (t.created_at, t.id));
        rows.truncate(query.limit as usize + 1);
        paginate(rows, query.limit as usize, |t| {
            PageCursor::new(t.created_at, t.id)
        })
    }

    async fn list_entries(&self, query: &ListQuery) -> LedgerResult<Page<Entry>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Entry> = state
            .entries
            .iter()
            .filter(|e| e.tenant_id == query.tenant_id)
            .filter(|e| after_cursor(&query.cursor, e.created_at, e.id))
            .cloned()
            .collect();
        sort_by_created_at_then_id(&mut rows, |e| (e.created_at, e.id));
        rows.truncate(query.limit as usize + 1);
        paginate(rows, query.limit as usize, |e| {
            PageCursor::new(e.created_at, e.id)
        })
    }

    async fn ledger_accounts(
        &self,
        tenant_id: Uuid,
        ledger_id: Uuid,
    ) -> LedgerResult<Vec<Account>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Account> = state
            .accounts
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.ledger_id == ledger_id)
            .cloned()
            .collect();
        sort_by_created_at_then_id(&mut rows, |a| (a.created_at, a.id));
        Ok(rows)
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryRepository {
    async fn find_key_by_hash(&self, key_hash: &str) -> LedgerResult<Option<ApiKey>> {
        let state = self.state.lock().unwrap();
        Ok(state.keys.iter().find(|k| k.key_hash == key_hash).cloned())
    }

    async fn insert_key(&self, key: NewApiKey) -> LedgerResult<ApiKey> {
        let mut state = self.state.lock().unwrap();
        if state.keys.iter().any(|k| k.key_hash == key.key_hash) {
            return Err(LedgerError::invariant("constraint violation: api_keys_key_hash_key"));
        }
        let created = ApiKey {
            id: Uuid::new_v4(),
            tenant_id: key.tenant_id,
            name: key.name,
            role: key.role,
            key_hash: key.key_hash,
            created_at: state.next_timestamp(),
            revoked_at: None,
        };
        state.keys.push(created.clone());
        Ok(created)
    }

    async fn list_keys(&self, tenant_id: Uuid) -> LedgerResult<Vec<ApiKey>> {
        let state = self.state.lock().unwrap();
        let mut keys: Vec<ApiKey> = state
            .keys
            .iter()
            .filter(|k| k.tenant_id == tenant_id)
            .cloned()
            .collect();
        sort_by_created_at_then_id(&mut keys, |k| (k.created_at, k.id));
        Ok(keys)
    }

    async fn revoke_key(&self, tenant_id: Uuid, api_key_id: Uuid) -> LedgerResult<bool> {
        let mut state = self.state.lock().unwrap();
        let now = state.next_timestamp();
        match state
            .keys
            .iter_mut()
            .find(|k| k.id == api_key_id && k.tenant_id == tenant_id && k.revoked_at.is_none())
        {
            Some(key) => {
                key.revoked_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_keys(&self) -> LedgerResult<i64> {
        let state = self.state.lock().unwrap();
        Ok(state.keys.len() as i64)
    }

    async fn create_tenant(&self, name: &str) -> LedgerResult<Tenant> {
        let mut state = self.state.lock().unwrap();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            created_at: state.next_timestamp(),
        };
        state.tenants.push(tenant.clone());
        Ok(tenant)
    }
}
