use chrono::Utc;
use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::common::Page;
use crate::errors::ServiceError;
use crate::models::Tenant;
use crate::repositories::TenantRepository;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTenantInput {
    /// Defaults to the caller's tenant
    #[validate(length(min = 1, max = 64))]
    pub tenant_id: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub gateways: Vec<String>,
    #[validate(length(min = 1))]
    pub wallet_id: String,
}

/// Tenant records that route payments to gateways and settlement wallets.
#[derive(Clone)]
pub struct TenantService {
    tenants: Arc<dyn TenantRepository>,
}

impl TenantService {
    pub fn new(tenants: Arc<dyn TenantRepository>) -> Self {
        Self { tenants }
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        caller_tenant_id: &str,
        input: CreateTenantInput,
    ) -> Result<Tenant, ServiceError> {
        input.validate()?;
        let tenant_id = input
            .tenant_id
            .unwrap_or_else(|| caller_tenant_id.to_string());
        if self.tenants.find(&tenant_id).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Tenant {} already exists",
                tenant_id
            )));
        }

        let mut tenant = Tenant::new(tenant_id, input.name);
        tenant.description = input.description;
        tenant.gateways = input.gateways;
        tenant.wallet_id = Some(input.wallet_id);
        tenant.updated_at = Utc::now();
        self.tenants.save(&tenant).await?;

        counter!("basket_api.tenants.created", 1);
        info!(tenant_id = %tenant.tenant_id, "Created tenant");
        Ok(tenant)
    }

    pub async fn list(&self, page: Page) -> Result<(Vec<Tenant>, u64), ServiceError> {
        self.tenants.list(page).await
    }

    pub async fn get(&self, tenant_id: &str) -> Result<Tenant, ServiceError> {
        self.tenants
            .find(tenant_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Tenant {} not found", tenant_id)))
    }
}
