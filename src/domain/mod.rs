//! Domain module
//!
//! Core domain types, error taxonomy, and posting validation.

pub mod error;
pub mod posting;
pub mod types;

pub use error::{LedgerError, LedgerResult};
pub use posting::{NewEntry, NewPosting};
pub use types::{
    Account, ApiKey, AuthContext, Direction, Entry, Ledger, Role, Tenant, TransactionRecord,
};
