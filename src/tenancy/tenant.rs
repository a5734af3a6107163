use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant (company) row from the global `tenants` table.
///
/// `namespace` is the tenant's dedicated schema inside the shared database.
/// Once provisioned the mapping never changes; deactivation flips `is_active`
/// and leaves the namespace data in place.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub namespace: String,
    pub domain: Option<String>,
    pub is_active: bool,
    // Resource ceilings; enforced elsewhere, carried here as metadata
    pub max_users: Option<i32>,
    pub max_objects: Option<i32>,
    pub max_storage_mb: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derive the namespace for a tenant name.
///
/// Readable names become readable namespaces (`acme` -> `tenant_acme`) so the
/// subdomain heuristic in resolution can find them. Names that do not slug
/// down to a usable identifier fall back to a hash prefix, which keeps any
/// name representable. Derivation only happens at registration; the stored
/// mapping never changes afterwards.
pub fn namespace_for(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    let starts_alpha = slug.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if !slug.is_empty() && slug.len() <= 40 && starts_alpha {
        return format!("tenant_{}", slug);
    }

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    // First 16 hex chars keeps identifiers well under Postgres's 63-byte cap
    format!("tenant_{}", &hash[..16])
}

/// Validate namespace identifiers before they get near DDL. Accepts names
/// starting with "tenant_" followed by [a-zA-Z0-9_]+, max 63 bytes.
pub fn is_valid_namespace(name: &str) -> bool {
    if name.len() > 63 {
        return false;
    }
    match name.strip_prefix("tenant_") {
        Some(rest) if !rest.is_empty() => {
            rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Validate tenant names supplied through the provisioning path.
pub fn validate_tenant_name(name: &str) -> Result<(), String> {
    if name.len() < 2 {
        return Err("Tenant name must be at least 2 characters".to_string());
    }
    if name.len() > 100 {
        return Err("Tenant name must be less than 100 characters".to_string());
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err("Tenant name can only contain letters, numbers, hyphens, and underscores".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_names_become_readable_namespaces() {
        assert_eq!(namespace_for("acme"), "tenant_acme");
        assert_eq!(namespace_for("Acme-North"), "tenant_acme_north");
        assert_eq!(namespace_for("default"), "tenant_default");
    }

    #[test]
    fn unusable_names_fall_back_to_hash() {
        let ns = namespace_for("壱");
        assert!(ns.starts_with("tenant_"));
        assert_eq!(ns.len(), "tenant_".len() + 16);
        assert_eq!(ns, namespace_for("壱"));

        // Leading digit is not a usable identifier start
        let numeric = namespace_for("1234");
        assert_eq!(numeric.len(), "tenant_".len() + 16);
    }

    #[test]
    fn derived_namespaces_validate() {
        assert!(is_valid_namespace(&namespace_for("acme")));
        assert!(is_valid_namespace(&namespace_for("Ünïcode Näme")));
        assert!(is_valid_namespace(&namespace_for(&"long-name-".repeat(12))));
    }

    #[test]
    fn validates_namespaces() {
        assert!(is_valid_namespace("tenant_123abc_DEF"));
        assert!(is_valid_namespace("tenant_default"));
        assert!(!is_valid_namespace("tenant_"));
        assert!(!is_valid_namespace("public"));
        assert!(!is_valid_namespace("tenant-123"));
        assert!(!is_valid_namespace("tenant_; DROP SCHEMA"));
        assert!(!is_valid_namespace(&format!("tenant_{}", "x".repeat(64))));
    }

    #[test]
    fn validates_tenant_names() {
        assert!(validate_tenant_name("acme").is_ok());
        assert!(validate_tenant_name("acme-north_2").is_ok());
        assert!(validate_tenant_name("a").is_err());
        assert!(validate_tenant_name("bad name").is_err());
        assert!(validate_tenant_name(&"x".repeat(101)).is_err());
    }
}
