//! Read service.
//!
//! Validates listing queries, decodes cursors, and delegates to the read
//! repository. Also produces the per-ledger trial balance.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Account, Direction, Entry, LedgerError, LedgerResult, TransactionRecord};
use crate::repository::{LedgerReadRepository, LedgerRepository, ListQuery, Page, PageCursor};

/// Unvalidated listing request as it arrives from the HTTP layer.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub tenant_id: Uuid,
    pub limit: i64,
    pub cursor: Option<String>,
}

/// One account line of a trial balance. `code` is the account identifier;
/// real chart-of-accounts codes are out of scope.
#[derive(Debug, Clone)]
pub struct TrialBalanceLine {
    pub account_id: Uuid,
    pub code: String,
    pub name: String,
    pub side: Direction,
    pub amount_minor: i64,
}

/// Per-ledger trial balance: accounts classified by normal side with
/// absolute balances; the two totals must match.
#[derive(Debug, Clone)]
pub struct TrialBalance {
    pub ledger_id: Uuid,
    pub lines: Vec<TrialBalanceLine>,
    pub total_debits_minor: i64,
    pub total_credits_minor: i64,
}

#[derive(Clone)]
pub struct ReadService {
    reads: Arc<dyn LedgerReadRepository>,
    ledgers: Arc<dyn LedgerRepository>,
}

impl ReadService {
    pub fn new(reads: Arc<dyn LedgerReadRepository>, ledgers: Arc<dyn LedgerRepository>) -> Self {
        Self { reads, ledgers }
    }

    fn validate(&self, request: &ListRequest) -> LedgerResult<ListQuery> {
        if request.tenant_id.is_nil() {
            return Err(LedgerError::invariant("tenant must not be empty"));
        }
        if !(1..=200).contains(&request.limit) {
            return Err(LedgerError::invariant("limit must be between 1 and 200"));
        }
        let cursor = match request.cursor.as_deref() {
            None => None,
            Some("") => return Err(LedgerError::invariant("cursor must not be empty")),
            Some(raw) => Some(PageCursor::decode(raw)?),
        };
        Ok(ListQuery {
            tenant_id: request.tenant_id,
            limit: request.limit,
            cursor,
        })
    }

    pub async fn list_accounts(&self, request: ListRequest) -> LedgerResult<Page<Account>> {
        let query = self.validate(&request)?;
        self.reads.list_accounts(&query).await
    }

    pub async fn list_transactions(
        &self,
        request: ListRequest,
    ) -> LedgerResult<Page<TransactionRecord>> {
        let query = self.validate(&request)?;
        self.reads.list_transactions(&query).await
    }

    pub async fn list_entries(&self, request: ListRequest) -> LedgerResult<Page<Entry>> {
        let query = self.validate(&request)?;
        self.reads.list_entries(&query).await
    }

    /// Builds the trial balance for one ledger.
    ///
    /// An account with balance ≤ 0 is DEBIT normal, otherwise CREDIT
    /// normal; lines carry absolute values. Diverging totals indicate
    /// corruption the write path is designed to make impossible, so they
    /// surface as a repository error rather than a client error.
    pub async fn trial_balance(
        &self,
        tenant_id: Uuid,
        ledger_id: Uuid,
    ) -> LedgerResult<TrialBalance> {
        self.ledgers
            .get_ledger(tenant_id, ledger_id)
            .await?
            .ok_or(LedgerError::LedgerNotFound(ledger_id))?;

        let accounts = self.reads.ledger_accounts(tenant_id, ledger_id).await?;

        let mut lines = Vec::with_capacity(accounts.len());
        let mut total_debits: i64 = 0;
        let mut total_credits: i64 = 0;

        for account in accounts {
            let amount = account
                .balance_minor
                .checked_abs()
                .ok_or_else(|| LedgerError::repository("trial balance amount out of range"))?;
            let side = if account.balance_minor <= 0 {
                Direction::Debit
            } else {
                Direction::Credit
            };
            match side {
                Direction::Debit => {
                    total_debits = total_debits
                        .checked_add(amount)
                        .ok_or_else(|| LedgerError::repository("trial balance total out of range"))?;
                }
                Direction::Credit => {
                    total_credits = total_credits
                        .checked_add(amount)
                        .ok_or_else(|| LedgerError::repository("trial balance total out of range"))?;
                }
            }
            lines.push(TrialBalanceLine {
                account_id: account.id,
                code: account.id.to_string(),
                name: account.name,
                side,
                amount_minor: amount,
            });
        }

        if total_debits != total_credits {
            tracing::error!(
                %ledger_id,
                total_debits,
                total_credits,
                "trial balance totals diverge"
            );
            return Err(LedgerError::repository("trial balance totals diverge"));
        }

        Ok(TrialBalance {
            ledger_id,
            lines,
            total_debits_minor: total_debits,
            total_credits_minor: total_credits,
        })
    }
}
