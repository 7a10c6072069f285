//! API-key service.
//!
//! Issues opaque keys (`llk_` + 64 hex characters from 32 random bytes),
//! stores only their SHA-256 hex digests, and authenticates requests by
//! digest lookup. The raw key is returned exactly once, at creation.

use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{ApiKey, AuthContext, LedgerError, LedgerResult, Role};
use crate::repository::{ApiKeyRepository, NewApiKey};

const KEY_PREFIX: &str = "llk_";

/// Result of `create_api_key`: the raw key plus the stored record.
#[derive(Debug, Clone)]
pub struct CreatedApiKey {
    pub api_key: String,
    pub key: ApiKey,
}

/// Zero-state provisioning input (from configuration, not HTTP).
#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    pub tenant_name: String,
    pub key_name: String,
    pub raw_api_key: String,
}

#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub created: bool,
    pub tenant_id: Option<Uuid>,
    pub api_key_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ApiKeyService {
    repo: Arc<dyn ApiKeyRepository>,
}

impl ApiKeyService {
    pub fn new(repo: Arc<dyn ApiKeyRepository>) -> Self {
        Self { repo }
    }

    fn generate_raw_key() -> String {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        format!("{KEY_PREFIX}{}", hex::encode(random_bytes))
    }

    fn hash_raw_key(raw: &str) -> String {
        hex::encode(Sha256::digest(raw.as_bytes()))
    }

    /// Resolves a raw credential to its tenant and role.
    pub async fn authenticate(&self, raw_key: &str) -> LedgerResult<AuthContext> {
        let raw_key = raw_key.trim();
        if raw_key.is_empty() {
            return Err(LedgerError::Unauthorized("API key is required"));
        }

        let key = self
            .repo
            .find_key_by_hash(&Self::hash_raw_key(raw_key))
            .await?
            .ok_or(LedgerError::Unauthorized("Invalid API key"))?;

        if !key.is_active() {
            return Err(LedgerError::Unauthorized("Invalid API key"));
        }

        Ok(AuthContext {
            api_key_id: key.id,
            tenant_id: key.tenant_id,
            role: key.role,
        })
    }

    /// Issues a new key for the actor's own tenant. Admin only.
    pub async fn create_api_key(
        &self,
        actor: &AuthContext,
        tenant_id: Uuid,
        name: &str,
        role: Role,
    ) -> LedgerResult<CreatedApiKey> {
        if !actor.is_admin() {
            return Err(LedgerError::Forbidden("ADMIN role required".into()));
        }
        if actor.tenant_id != tenant_id {
            return Err(LedgerError::Forbidden(
                "cannot issue API keys for another tenant".into(),
            ));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invariant("API key name must not be empty"));
        }

        let raw = Self::generate_raw_key();
        let key = self
            .repo
            .insert_key(NewApiKey {
                tenant_id,
                name: name.to_owned(),
                role,
                key_hash: Self::hash_raw_key(&raw),
            })
            .await?;

        tracing::info!(api_key_id = %key.id, tenant_id = %tenant_id, "issued API key");
        Ok(CreatedApiKey { api_key: raw, key })
    }

    /// Lists the actor's tenant keys. Admin only.
    pub async fn list_api_keys(&self, actor: &AuthContext) -> LedgerResult<Vec<ApiKey>> {
        if !actor.is_admin() {
            return Err(LedgerError::Forbidden("ADMIN role required".into()));
        }
        self.repo.list_keys(actor.tenant_id).await
    }

    /// Revokes an active tenant-owned key. Admin only.
    pub async fn revoke_api_key(&self, actor: &AuthContext, api_key_id: Uuid) -> LedgerResult<()> {
        if !actor.is_admin() {
            return Err(LedgerError::Forbidden("ADMIN role required".into()));
        }
        let revoked = self.repo.revoke_key(actor.tenant_id, api_key_id).await?;
        if !revoked {
            return Err(LedgerError::invariant("API key not found"));
        }
        tracing::info!(api_key_id = %api_key_id, "revoked API key");
        Ok(())
    }

    /// Creates the first tenant and ADMIN key when the key table is empty;
    /// a no-op on any later run, so startup can call it unconditionally.
    pub async fn bootstrap_initial_admin(
        &self,
        request: &BootstrapRequest,
    ) -> LedgerResult<BootstrapOutcome> {
        if request.tenant_name.trim().is_empty()
            || request.key_name.trim().is_empty()
            || request.raw_api_key.trim().is_empty()
        {
            return Err(LedgerError::invariant(
                "bootstrap tenant name, key name, and API key are all required",
            ));
        }

        if self.repo.count_keys().await? > 0 {
            return Ok(BootstrapOutcome {
                created: false,
                tenant_id: None,
                api_key_id: None,
            });
        }

        let tenant = self.repo.create_tenant(request.tenant_name.trim()).await?;
        let key = self
            .repo
            .insert_key(NewApiKey {
                tenant_id: tenant.id,
                name: request.key_name.trim().to_owned(),
                role: Role::Admin,
                key_hash: Self::hash_raw_key(request.raw_api_key.trim()),
            })
            .await?;

        tracing::info!(tenant_id = %tenant.id, api_key_id = %key.id, "bootstrapped initial admin");
        Ok(BootstrapOutcome {
            created: true,
            tenant_id: Some(tenant.id),
            api_key_id: Some(key.id),
        })
    }
}
