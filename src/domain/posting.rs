//! Posting input types and pre-validation.
//!
//! Validation here is purely in-process; it runs before any database
//! transaction is opened. Everything it accepts is structurally sound:
//! at least two entries, positive amounts, one currency, and equal debit
//! and credit totals.

use uuid::Uuid;

use super::error::{LedgerError, LedgerResult};
use super::types::Direction;

/// One entry of a posting request.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub account_id: Uuid,
    pub direction: Direction,
    pub amount_minor: i64,
    pub currency: String,
}

/// A balanced posting to be persisted atomically.
#[derive(Debug, Clone)]
pub struct NewPosting {
    pub tenant_id: Uuid,
    pub ledger_id: Uuid,
    pub reference: String,
    pub currency: String,
    pub entries: Vec<NewEntry>,
}

impl NewPosting {
    /// Checks the balancing invariants.
    ///
    /// Totals are summed in `i128` so the check itself cannot overflow no
    /// matter how many `i64` amounts are involved.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.reference.trim().is_empty() {
            return Err(LedgerError::invariant("reference must not be empty"));
        }
        if self.currency.trim().is_empty() {
            return Err(LedgerError::invariant("currency must not be empty"));
        }
        if self.entries.len() < 2 {
            return Err(LedgerError::invariant(
                "a transaction requires at least two entries",
            ));
        }

        let mut debits: i128 = 0;
        let mut credits: i128 = 0;
        for entry in &self.entries {
            if entry.amount_minor <= 0 {
                return Err(LedgerError::invariant(
                    "entry amounts must be positive minor units",
                ));
            }
            if entry.currency != self.currency {
                return Err(LedgerError::invariant(format!(
                    "entry currency {} does not match transaction currency {}",
                    entry.currency, self.currency
                )));
            }
            match entry.direction {
                Direction::Debit => debits += i128::from(entry.amount_minor),
                Direction::Credit => credits += i128::from(entry.amount_minor),
            }
        }

        if debits != credits {
            return Err(LedgerError::invariant(format!(
                "debits ({debits}) and credits ({credits}) must balance"
            )));
        }

        Ok(())
    }
}
