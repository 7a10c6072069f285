//! Common test utilities

use std::sync::{Mutex, MutexGuard};

use sha2::Digest;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

// Tests share one database; serialize them so truncation in one test
// cannot race another.
static DB_LOCK: Mutex<()> = Mutex::new(());

/// Raw admin key for tenant A (64 hex chars after the prefix).
pub const ADMIN_KEY_A: &str =
    "llk_0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

/// Raw admin key for tenant B.
pub const ADMIN_KEY_B: &str =
    "llk_fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210";

pub struct TestEnv {
    pub pool: PgPool,
    pub tenant_a: Uuid,
    pub tenant_b: Uuid,
    _guard: MutexGuard<'static, ()>,
}

fn sha256_hex(raw: &str) -> String {
    hex::encode(sha2::Sha256::digest(raw.as_bytes()))
}

/// Setup test database - truncate tables and seed two tenants with one
/// admin key each. Ledgers and accounts are created through the API so
/// the RLS-covered tables are only ever written via the service path.
pub async fn setup_test_db() -> TestEnv {
    let guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query("TRUNCATE TABLE entries, transactions, accounts, ledgers, api_keys, tenants CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    let tenant_a = seed_tenant(&pool, "tenant-a", "root-a", ADMIN_KEY_A).await;
    let tenant_b = seed_tenant(&pool, "tenant-b", "root-b", ADMIN_KEY_B).await;

    TestEnv {
        pool,
        tenant_a,
        tenant_b,
        _guard: guard,
    }
}

async fn seed_tenant(pool: &PgPool, name: &str, key_name: &str, raw_key: &str) -> Uuid {
    let tenant_id = Uuid::new_v4();
    sqlx::query("INSERT INTO tenants (id, name) VALUES ($1, $2)")
        .bind(tenant_id)
        .bind(name)
        .execute(pool)
        .await
        .expect("Failed to seed tenant");

    sqlx::query(
        r#"
        INSERT INTO api_keys (id, tenant_id, name, role, key_hash)
        VALUES ($1, $2, $3, 'ADMIN', $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(key_name)
    .bind(sha256_hex(raw_key))
    .execute(pool)
    .await
    .expect("Failed to seed API key");

    tenant_id
}
