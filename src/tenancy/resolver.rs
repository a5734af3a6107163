//! Tenant resolution from multiple request sources.
//!
//! Strategies run in fixed priority order; the first to resolve wins. A
//! strategy either resolves a tenant, declares itself not applicable (the
//! chain continues), or hard-fails (the chain stops). The explicit header is
//! the canonical hard-failure case: a wrong explicit identifier must never
//! silently resolve through a weaker source.

use async_trait::async_trait;
use axum::http::HeaderMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::auth::Claims;
use crate::config;
use crate::is_production;
use crate::tenancy::directory::{
    DirectoryError, TenantBootstrap, TenantDirectory, TenantLookup,
};
use crate::tenancy::identity::{tenant_claim, HttpIdentityGateway, IdentityGateway};
use crate::tenancy::tenant::{is_valid_namespace, Tenant};

/// Out-of-band tenant identifier header.
pub const X_COMPANY_ID: &str = "x-company-id";

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("No tenant identifier in request")]
    NoCandidateIdentifier,

    #[error("Tenant identifier not found")]
    IdentifierNotFound,

    #[error("Identity lookup unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error(transparent)]
    Store(#[from] DirectoryError),
}

/// What the request itself offers for resolution. Built once by the gate and
/// owned by the request; strategies only borrow it.
#[derive(Debug, Default)]
pub struct RequestContext {
    pub explicit_id: Option<String>,
    pub host: Option<String>,
    pub claims: Option<Claims>,
    pub bearer: Option<String>,
}

impl RequestContext {
    pub fn from_request(
        headers: &HeaderMap,
        claims: Option<Claims>,
        bearer: Option<String>,
    ) -> Self {
        let explicit_id = headers
            .get(X_COMPANY_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            explicit_id,
            host: host_from_headers(headers),
            claims,
            bearer,
        }
    }
}

/// Inbound host with any port stripped, lowercased.
fn host_from_headers(headers: &HeaderMap) -> Option<String> {
    let host = headers.get("host").and_then(|v| v.to_str().ok())?;
    let host = host.split(':').next().unwrap_or(host).trim().to_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

pub enum Resolution {
    Resolved(Tenant),
    NotApplicable,
    HardFailure(ResolutionError),
}

#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    async fn resolve(&self, ctx: &RequestContext) -> Resolution;

    fn name(&self) -> &'static str;
}

/// Strategy 1: explicit identifier header. Present-but-unresolvable is a hard
/// failure; falling through here could route a mistyped id to someone else's
/// data.
pub struct ExplicitIdStrategy {
    directory: Arc<dyn TenantLookup>,
}

#[async_trait]
impl ResolveStrategy for ExplicitIdStrategy {
    async fn resolve(&self, ctx: &RequestContext) -> Resolution {
        let Some(raw) = ctx.explicit_id.as_deref() else {
            return Resolution::NotApplicable;
        };

        let Ok(id) = raw.parse::<uuid::Uuid>() else {
            return Resolution::HardFailure(ResolutionError::IdentifierNotFound);
        };

        match self.directory.get_by_id(id).await {
            Ok(Some(tenant)) => Resolution::Resolved(tenant),
            Ok(None) => Resolution::HardFailure(ResolutionError::IdentifierNotFound),
            Err(e) => Resolution::HardFailure(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "explicit"
    }
}

/// Strategy 2: match the inbound host against tenant domains, then try a
/// namespace derived from the first subdomain label. Misses fall through.
pub struct HostStrategy {
    directory: Arc<dyn TenantLookup>,
}

impl HostStrategy {
    fn namespace_hint(host: &str) -> Option<String> {
        let label = host.split('.').next()?;
        let slug: String = label
            .chars()
            .map(|c| if c == '-' { '_' } else { c })
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();

        let hint = format!("tenant_{}", slug);
        is_valid_namespace(&hint).then_some(hint)
    }
}

#[async_trait]
impl ResolveStrategy for HostStrategy {
    async fn resolve(&self, ctx: &RequestContext) -> Resolution {
        let Some(host) = ctx.host.as_deref() else {
            return Resolution::NotApplicable;
        };

        match self.directory.get_by_domain(host).await {
            Ok(Some(tenant)) => return Resolution::Resolved(tenant),
            Ok(None) => {}
            Err(e) => return Resolution::HardFailure(e.into()),
        }

        if let Some(hint) = Self::namespace_hint(host) {
            match self.directory.get_by_namespace(&hint).await {
                Ok(Some(tenant)) => return Resolution::Resolved(tenant),
                Ok(None) => {}
                Err(e) => return Resolution::HardFailure(e.into()),
            }
        }

        Resolution::NotApplicable
    }

    fn name(&self) -> &'static str {
        "host"
    }
}

/// Strategy 3: tenant claim from the authenticated identity. Checks the local
/// claims first (typed field, then legacy spellings), then asks the identity
/// service with the caller's credential. The upstream call is bounded by the
/// gateway's timeout; when it fails the chain stops rather than guessing.
pub struct IdentityClaimStrategy {
    directory: Arc<dyn TenantLookup>,
    gateway: Option<Arc<dyn IdentityGateway>>,
}

impl IdentityClaimStrategy {
    async fn candidate(&self, ctx: &RequestContext) -> Result<Option<String>, ResolutionError> {
        if let Some(claims) = &ctx.claims {
            if let Some(id) = claims.company_id {
                return Ok(Some(id.to_string()));
            }
            let extra = serde_json::Value::Object(claims.extra.clone());
            if let Some(value) = tenant_claim(&extra) {
                return Ok(Some(value));
            }
        }

        if let (Some(gateway), Some(bearer)) = (&self.gateway, ctx.bearer.as_deref()) {
            let payload = gateway
                .current_user(bearer)
                .await
                .map_err(|e| ResolutionError::UpstreamUnavailable(e.to_string()))?;
            return Ok(tenant_claim(&payload));
        }

        Ok(None)
    }
}

#[async_trait]
impl ResolveStrategy for IdentityClaimStrategy {
    async fn resolve(&self, ctx: &RequestContext) -> Resolution {
        let candidate = match self.candidate(ctx).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return Resolution::NotApplicable,
            Err(e) => return Resolution::HardFailure(e),
        };

        let lookup = match candidate.parse::<uuid::Uuid>() {
            Ok(id) => self.directory.get_by_id(id).await,
            // Some identity payloads carry the tenant name, not the id
            Err(_) => self.directory.get_by_name(&candidate).await,
        };

        match lookup {
            Ok(Some(tenant)) => Resolution::Resolved(tenant),
            Ok(None) => {
                warn!("Identity claim '{}' does not match any tenant", candidate);
                Resolution::NotApplicable
            }
            Err(e) => Resolution::HardFailure(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Strategy 4: bootstrap tenant fallback, for non-production operation only.
/// Auto-registers the tenant on first use so a fresh checkout works without
/// seeding. Every use is logged; this must stay disabled in production.
pub struct DefaultTenantStrategy {
    directory: Arc<dyn TenantBootstrap>,
    enabled: bool,
    tenant_name: String,
}

#[async_trait]
impl ResolveStrategy for DefaultTenantStrategy {
    async fn resolve(&self, _ctx: &RequestContext) -> Resolution {
        if !self.enabled {
            return Resolution::NotApplicable;
        }

        match self.directory.get_by_name(&self.tenant_name).await {
            Ok(Some(tenant)) => {
                warn!("Falling back to bootstrap tenant '{}'", self.tenant_name);
                Resolution::Resolved(tenant)
            }
            Ok(None) => match self
                .directory
                .register_tenant(&self.tenant_name, None)
                .await
            {
                Ok(tenant) => {
                    warn!(
                        "Auto-registered bootstrap tenant '{}' (namespace {})",
                        tenant.name, tenant.namespace
                    );
                    Resolution::Resolved(tenant)
                }
                Err(e) => Resolution::HardFailure(e.into()),
            },
            Err(e) => Resolution::HardFailure(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "default"
    }
}

/// Fixed-priority strategy chain.
pub struct TenantResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl TenantResolver {
    pub fn new(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self { strategies }
    }

    /// Standard chain wired against the shared directory and the configured
    /// identity gateway.
    pub fn from_config() -> Self {
        let directory = TenantDirectory::shared();
        let tenancy = &config::config().tenancy;

        if tenancy.default_tenant_enabled {
            if is_production!() {
                error!(
                    "Bootstrap tenant fallback is ENABLED in production; every \
                     unresolved request will be routed to '{}'",
                    tenancy.default_tenant
                );
            } else {
                warn!(
                    "Bootstrap tenant fallback enabled (tenant '{}')",
                    tenancy.default_tenant
                );
            }
        }

        let gateway: Option<Arc<dyn IdentityGateway>> = HttpIdentityGateway::from_config()
            .map(|g| Arc::new(g) as Arc<dyn IdentityGateway>);

        Self::new(vec![
            Box::new(ExplicitIdStrategy {
                directory: directory.clone(),
            }),
            Box::new(HostStrategy {
                directory: directory.clone(),
            }),
            Box::new(IdentityClaimStrategy {
                directory: directory.clone(),
                gateway,
            }),
            Box::new(DefaultTenantStrategy {
                directory,
                enabled: tenancy.default_tenant_enabled,
                tenant_name: tenancy.default_tenant.clone(),
            }),
        ])
    }

    /// Process-wide resolver built once from configuration.
    pub fn shared() -> &'static TenantResolver {
        static INSTANCE: Lazy<TenantResolver> = Lazy::new(TenantResolver::from_config);
        &INSTANCE
    }

    pub async fn resolve(&self, ctx: &RequestContext) -> Result<Tenant, ResolutionError> {
        for strategy in &self.strategies {
            match strategy.resolve(ctx).await {
                Resolution::Resolved(tenant) => {
                    debug!(
                        "Resolved tenant '{}' via {} strategy",
                        tenant.name,
                        strategy.name()
                    );
                    return Ok(tenant);
                }
                Resolution::NotApplicable => continue,
                Resolution::HardFailure(e) => {
                    warn!("Tenant resolution failed in {} strategy: {}", strategy.name(), e);
                    return Err(e);
                }
            }
        }

        Err(ResolutionError::NoCandidateIdentifier)
    }
}
