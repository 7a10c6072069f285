//! Posting service.
//!
//! Checks the balancing invariants in-process, then hands the posting to
//! the repository's atomic write path. Retrying with the same reference is
//! always safe: the `(tenant_id, reference)` idempotency key resolves every
//! repeat to the originally persisted transaction.

use std::sync::Arc;

use crate::domain::{LedgerResult, NewPosting};
use crate::repository::{LedgerRepository, PostOutcome};

#[derive(Clone)]
pub struct PostingService {
    repo: Arc<dyn LedgerRepository>,
}

impl PostingService {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    /// Persists a balanced posting exactly once per `(tenant, reference)`.
    pub async fn post_transaction(&self, posting: NewPosting) -> LedgerResult<PostOutcome> {
        posting.validate()?;
        self.repo.post_transaction(&posting).await
    }
}
