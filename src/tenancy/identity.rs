use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

use crate::config;

/// Tenant-claim field names, in priority order. The first populated one wins.
/// Older identity payloads used camelCase and `tenant_*` spellings; all of
/// them are still in circulation.
pub const TENANT_CLAIM_FIELDS: &[&str] =
    &["company_id", "companyId", "tenant_id", "tenantId", "company"];

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

/// External "current user" collaborator. Given the caller's credential it
/// returns the identity payload the tenant claim is extracted from.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn current_user(&self, bearer: &str) -> Result<Value, IdentityError>;
}

/// HTTP implementation backed by the configured identity endpoint. Every call
/// carries a hard timeout; an unbounded upstream here would stall requests
/// for all tenants, not just the caller's.
pub struct HttpIdentityGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpIdentityGateway {
    /// Build from configuration; `None` when no endpoint is configured.
    pub fn from_config() -> Option<Self> {
        let identity = &config::config().identity;
        let endpoint = identity.endpoint.clone()?;

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(identity.timeout_ms))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to build identity client: {}", e);
                return None;
            }
        };

        Some(Self { client, endpoint })
    }
}

#[async_trait]
impl IdentityGateway for HttpIdentityGateway {
    async fn current_user(&self, bearer: &str) -> Result<Value, IdentityError> {
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IdentityError::Unavailable(format!(
                "identity endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))
    }
}

/// Pick the tenant claim out of an identity payload.
///
/// The payload is treated as an unordered bag of fields; candidates are
/// checked in `TENANT_CLAIM_FIELDS` order, both at the top level and one
/// level down under `user` (some identity services nest the account there).
pub fn tenant_claim(payload: &Value) -> Option<String> {
    for scope in [Some(payload), payload.get("user")].into_iter().flatten() {
        for field in TENANT_CLAIM_FIELDS {
            match scope.get(field) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                _ => continue,
            }
        }
    }
    None
}
