//! Ledger service.
//!
//! Tenant-scoped ledger and account creation plus lookups. Everything here
//! is forward-only: ledgers and accounts are never deleted.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Account, Ledger, LedgerError, LedgerResult};
use crate::repository::{LedgerRepository, NewAccount, NewLedger};

#[derive(Clone)]
pub struct LedgerService {
    repo: Arc<dyn LedgerRepository>,
}

impl LedgerService {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    pub async fn create_ledger(&self, tenant_id: Uuid, name: &str) -> LedgerResult<Ledger> {
        if tenant_id.is_nil() {
            return Err(LedgerError::invariant("tenant must not be empty"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invariant("ledger name must not be empty"));
        }
        self.repo
            .create_ledger(NewLedger {
                tenant_id,
                name: name.to_owned(),
            })
            .await
    }

    pub async fn get_ledger_by_id(&self, tenant_id: Uuid, ledger_id: Uuid) -> LedgerResult<Ledger> {
        self.repo
            .get_ledger(tenant_id, ledger_id)
            .await?
            .ok_or(LedgerError::LedgerNotFound(ledger_id))
    }

    pub async fn get_ledgers_by_tenant(&self, tenant_id: Uuid) -> LedgerResult<Vec<Ledger>> {
        self.repo.list_ledgers(tenant_id).await
    }

    pub async fn create_account(
        &self,
        tenant_id: Uuid,
        ledger_id: Uuid,
        name: &str,
        currency: &str,
    ) -> LedgerResult<Account> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invariant("account name must not be empty"));
        }
        let currency = currency.trim();
        if currency.is_empty() {
            return Err(LedgerError::invariant("account currency must not be empty"));
        }
        self.repo
            .create_account(NewAccount {
                tenant_id,
                ledger_id,
                name: name.to_owned(),
                currency: currency.to_owned(),
            })
            .await
    }
}
