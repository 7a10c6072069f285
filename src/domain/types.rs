//! Core entity types.
//!
//! All monetary values are signed 64-bit integers in minor units. DEBIT
//! entries decrease an account balance, CREDIT entries increase it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entry direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    /// Signed contribution of an entry of this direction to an account
    /// balance.
    pub fn signed(self, amount_minor: i64) -> i64 {
        match self {
            Self::Debit => -amount_minor,
            Self::Credit => amount_minor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEBIT" => Some(Self::Debit),
            "CREDIT" => Some(Self::Credit),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API key role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Service,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Service => "SERVICE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADMIN" => Some(Self::Admin),
            "SERVICE" => Some(Self::Service),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root of isolation; every other entity belongs to exactly one tenant.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Tenant-scoped grouping of accounts.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Balance-bearing entity within a ledger and a single currency.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub ledger_id: Uuid,
    pub name: String,
    pub currency: String,
    pub balance_minor: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted transaction header. `(tenant_id, reference)` is unique and
/// serves as the idempotency key.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub ledger_id: Uuid,
    pub reference: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// One directional contribution against one account. Carries a
/// denormalized `tenant_id` so listings stay single-table and RLS-covered.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub direction: Direction,
    pub amount_minor: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Stored API key. Only the SHA-256 hex digest of the raw key is kept;
/// `revoked_at = None` means active.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub role: Role,
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Per-request identity resolved by the auth middleware and threaded into
/// every service call.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
