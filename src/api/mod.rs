//! API module
//!
//! HTTP endpoints, middleware, and service wiring.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use sqlx::PgPool;

use crate::repository::PgRepository;
use crate::service::{ApiKeyService, LedgerService, PostingService, ReadService};

pub use routes::create_router;

/// Shared handler state: the pool (readiness probe) and the services, all
/// backed by one `PgRepository`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub posting: PostingService,
    pub reads: ReadService,
    pub ledgers: LedgerService,
    pub api_keys: ApiKeyService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let repo = Arc::new(PgRepository::new(pool.clone()));
        Self {
            posting: PostingService::new(repo.clone()),
            reads: ReadService::new(repo.clone(), repo.clone()),
            ledgers: LedgerService::new(repo.clone()),
            api_keys: ApiKeyService::new(repo),
            pool,
        }
    }
}
