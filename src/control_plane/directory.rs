//! # Tenant Directory
//!
//! Storage and retrieval of onboarded tenants.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::errors::{ControlPlaneError, ControlPlaneResult};
use super::tenant::Tenant;

/// In-memory tenant directory
///
/// Tenants are immutable after onboarding except for their redirect URL list.
#[derive(Debug, Clone, Default)]
pub struct TenantDirectory {
    /// Tenants by id
    tenants: Arc<RwLock<HashMap<String, Tenant>>>,
    /// Tenant id by public domain
    domains: Arc<RwLock<HashMap<String, String>>>,
}

impl TenantDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a tenant id
    pub fn validate_id(tenant_id: &str) -> ControlPlaneResult<()> {
        let invalid = |reason: &str| ControlPlaneError::InvalidTenantName {
            name: tenant_id.to_string(),
            reason: reason.to_string(),
        };

        if tenant_id.len() < 3 || tenant_id.len() > 63 {
            return Err(invalid("Id must be 3-63 characters"));
        }

        if !tenant_id
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase())
            .unwrap_or(false)
        {
            return Err(invalid("Id must start with a lowercase letter"));
        }

        if !tenant_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid(
                "Id must contain only lowercase letters, numbers, and hyphens",
            ));
        }

        if tenant_id.ends_with('-') {
            return Err(invalid("Id must not end with a hyphen"));
        }

        if tenant_id.contains("--") {
            return Err(invalid("Id must not contain consecutive hyphens"));
        }

        Ok(())
    }

    /// Onboard a tenant
    pub fn onboard(&self, tenant: Tenant) -> ControlPlaneResult<()> {
        Self::validate_id(&tenant.tenant_id)?;
        let domain = tenant.domain.to_ascii_lowercase();

        // Lock order: domains, then tenants
        let mut domains = self.domains.write();
        let mut tenants = self.tenants.write();

        if tenants.contains_key(&tenant.tenant_id) {
            return Err(ControlPlaneError::InvalidTenantName {
                name: tenant.tenant_id.clone(),
                reason: "Id already onboarded".to_string(),
            });
        }
        if domains.contains_key(&domain) {
            return Err(ControlPlaneError::TenantDomainExists { domain });
        }

        info!(
            tenant_id = %tenant.tenant_id,
            domain = %domain,
            isolation = %tenant.isolation,
            "tenant onboarded"
        );
        domains.insert(domain, tenant.tenant_id.clone());
        tenants.insert(tenant.tenant_id.clone(), tenant);

        Ok(())
    }

    /// Get tenant by id
    pub fn get(&self, tenant_id: &str) -> ControlPlaneResult<Tenant> {
        self.tenants
            .read()
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| ControlPlaneError::TenantNotFound {
                tenant: tenant_id.to_string(),
            })
    }

    /// Get tenant by public domain
    pub fn get_by_domain(&self, domain: &str) -> ControlPlaneResult<Tenant> {
        let tenant_id = self
            .domains
            .read()
            .get(&domain.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ControlPlaneError::TenantNotFound {
                tenant: domain.to_string(),
            })?;

        self.get(&tenant_id)
    }

    /// Replace the redirect URL list (operator action)
    pub fn update_redirect_urls(
        &self,
        tenant_id: &str,
        redirect_urls: Vec<String>,
    ) -> ControlPlaneResult<Tenant> {
        let mut tenants = self.tenants.write();
        let tenant = tenants
            .get_mut(tenant_id)
            .ok_or_else(|| ControlPlaneError::TenantNotFound {
                tenant: tenant_id.to_string(),
            })?;

        tenant.auth.allowed_redirect_urls = redirect_urls;
        tenant.updated_at = Utc::now();
        info!(
            tenant_id = %tenant_id,
            count = tenant.auth.allowed_redirect_urls.len(),
            "tenant redirect urls updated"
        );

        Ok(tenant.clone())
    }

    /// Count onboarded tenants
    pub fn count(&self) -> usize {
        self.tenants.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::tenant::IsolationLevel;

    #[test]
    fn test_onboard_and_lookup() {
        let directory = TenantDirectory::new();
        directory
            .onboard(Tenant::new("acme", "acme.agency.app", IsolationLevel::Rls))
            .unwrap();

        let tenant = directory.get("acme").unwrap();
        assert_eq!(tenant.domain, "acme.agency.app");

        let by_domain = directory.get_by_domain("ACME.agency.app").unwrap();
        assert_eq!(by_domain.tenant_id, "acme");

        assert!(matches!(
            directory.get("globex"),
            Err(ControlPlaneError::TenantNotFound { .. })
        ));
        assert_eq!(directory.count(), 1);
    }

    #[test]
    fn test_id_validation() {
        assert!(TenantDirectory::validate_id("acme").is_ok());
        assert!(TenantDirectory::validate_id("acme-corp").is_ok());
        assert!(TenantDirectory::validate_id("tenant-a").is_ok());

        assert!(TenantDirectory::validate_id("ab").is_err()); // Too short
        assert!(TenantDirectory::validate_id("1acme").is_err()); // Starts with digit
        assert!(TenantDirectory::validate_id("acme-").is_err());
        assert!(TenantDirectory::validate_id("acme--corp").is_err());
        assert!(TenantDirectory::validate_id("Acme").is_err());
    }

    #[test]
    fn test_duplicate_domain() {
        let directory = TenantDirectory::new();
        directory
            .onboard(Tenant::new("acme", "acme.agency.app", IsolationLevel::Rls))
            .unwrap();

        let result = directory.onboard(Tenant::new(
            "acme-two",
            "acme.agency.app",
            IsolationLevel::Schema,
        ));
        assert!(matches!(
            result,
            Err(ControlPlaneError::TenantDomainExists { .. })
        ));

        let result = directory.onboard(Tenant::new("acme", "other.agency.app", IsolationLevel::Rls));
        assert!(result.is_err());
        assert_eq!(directory.count(), 1);
    }

    #[test]
    fn test_update_redirect_urls() {
        let directory = TenantDirectory::new();
        directory
            .onboard(Tenant::new("acme", "acme.agency.app", IsolationLevel::Rls))
            .unwrap();

        let updated = directory
            .update_redirect_urls("acme", vec!["https://acme.agency.app/home".to_string()])
            .unwrap();
        assert_eq!(updated.auth.allowed_redirect_urls.len(), 1);
        assert_eq!(
            directory.get("acme").unwrap().auth.callback_url().unwrap(),
            "https://acme.agency.app/home"
        );

        assert!(directory.update_redirect_urls("nobody", vec![]).is_err());
    }
}
