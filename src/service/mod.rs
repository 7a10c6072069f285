//! Service layer
//!
//! Stateless services that validate domain invariants and delegate to the
//! repository traits. Construction wiring lives in `api::AppState`.

pub mod api_key;
pub mod ledger;
pub mod posting;
pub mod read;

pub use api_key::{ApiKeyService, BootstrapOutcome, BootstrapRequest, CreatedApiKey};
pub use ledger::LedgerService;
pub use posting::PostingService;
pub use read::{ListRequest, ReadService, TrialBalance, TrialBalanceLine};
