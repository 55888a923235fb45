use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    BasketFilter, BasketRepository, PaymentFilter, PaymentRepository, TenantRepository,
    VoucherFilter, VoucherRepository,
};
use crate::common::Page;
use crate::errors::ServiceError;
use crate::models::{Basket, BasketStatus, Payment, Tenant, Voucher, VoucherStatus};

/// Newest first, then one page of the result.
fn paginate<T, K: Ord>(mut rows: Vec<T>, page: Page, key: impl Fn(&T) -> K) -> (Vec<T>, u64) {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    let total = rows.len() as u64;
    let items = rows
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect();
    (items, total)
}

#[derive(Debug, Default)]
pub struct InMemoryBasketRepository {
    baskets: DashMap<Uuid, Basket>,
}

impl InMemoryBasketRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BasketRepository for InMemoryBasketRepository {
    async fn find(&self, tenant_id: &str, id: Uuid) -> Result<Option<Basket>, ServiceError> {
        Ok(self
            .baskets
            .get(&id)
            .filter(|b| b.tenant_id == tenant_id && !b.is_deleted)
            .map(|b| b.clone()))
    }

    async fn find_active_for_user(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Option<Basket>, ServiceError> {
        Ok(self
            .baskets
            .iter()
            .filter(|b| {
                b.tenant_id == tenant_id
                    && b.user_id == user_id
                    && b.status == BasketStatus::Active
                    && !b.is_deleted
            })
            .max_by_key(|b| b.created_at)
            .map(|b| b.clone()))
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &BasketFilter,
        page: Page,
    ) -> Result<(Vec<Basket>, u64), ServiceError> {
        let rows = self
            .baskets
            .iter()
            .filter(|b| b.tenant_id == tenant_id && !b.is_deleted && filter.matches(b))
            .map(|b| b.clone())
            .collect();
        Ok(paginate(rows, page, |b: &Basket| b.created_at))
    }

    async fn save(&self, basket: &Basket) -> Result<(), ServiceError> {
        self.baskets.insert(basket.id, basket.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVoucherRepository {
    vouchers: DashMap<Uuid, Voucher>,
}

impl InMemoryVoucherRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VoucherRepository for InMemoryVoucherRepository {
    async fn find(&self, tenant_id: &str, id: Uuid) -> Result<Option<Voucher>, ServiceError> {
        Ok(self
            .vouchers
            .get(&id)
            .filter(|v| v.tenant_id == tenant_id && !v.is_deleted)
            .map(|v| v.clone()))
    }

    async fn find_by_code(
        &self,
        tenant_id: &str,
        code: &str,
    ) -> Result<Option<Voucher>, ServiceError> {
        Ok(self
            .vouchers
            .iter()
            .find(|v| v.tenant_id == tenant_id && v.code == code && !v.is_deleted)
            .map(|v| v.clone()))
    }

    async fn find_active_by_code(
        &self,
        tenant_id: &str,
        code: &str,
        user_id: Option<&str>,
    ) -> Result<Option<Voucher>, ServiceError> {
        Ok(self
            .vouchers
            .iter()
            .find(|v| {
                v.tenant_id == tenant_id
                    && v.code == code
                    && v.status == VoucherStatus::Active
                    && !v.is_deleted
                    && (v.user_id.is_none() || v.user_id.as_deref() == user_id)
            })
            .map(|v| v.clone()))
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &VoucherFilter,
        page: Page,
    ) -> Result<(Vec<Voucher>, u64), ServiceError> {
        let rows = self
            .vouchers
            .iter()
            .filter(|v| v.tenant_id == tenant_id && !v.is_deleted && filter.matches(v))
            .map(|v| v.clone())
            .collect();
        Ok(paginate(rows, page, |v: &Voucher| v.created_at))
    }

    async fn insert(&self, voucher: &Voucher) -> Result<(), ServiceError> {
        if self
            .find_by_code(&voucher.tenant_id, &voucher.code)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "Voucher code {} already exists",
                voucher.code
            )));
        }
        self.vouchers.insert(voucher.id, voucher.clone());
        Ok(())
    }

    async fn save(&self, voucher: &Voucher) -> Result<(), ServiceError> {
        self.vouchers.insert(voucher.id, voucher.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPaymentRepository {
    payments: DashMap<Uuid, Payment>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn find(&self, tenant_id: &str, id: Uuid) -> Result<Option<Payment>, ServiceError> {
        Ok(self
            .payments
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id && !p.is_deleted)
            .map(|p| p.clone()))
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &PaymentFilter,
        page: Page,
    ) -> Result<(Vec<Payment>, u64), ServiceError> {
        let rows = self
            .payments
            .iter()
            .filter(|p| p.tenant_id == tenant_id && !p.is_deleted && filter.matches(p))
            .map(|p| p.clone())
            .collect();
        Ok(paginate(rows, page, |p: &Payment| p.created_at))
    }

    async fn save(&self, payment: &Payment) -> Result<(), ServiceError> {
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTenantRepository {
    tenants: DashMap<String, Tenant>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find(&self, tenant_id: &str) -> Result<Option<Tenant>, ServiceError> {
        Ok(self.tenants.get(tenant_id).map(|t| t.clone()))
    }

    async fn list(&self, page: Page) -> Result<(Vec<Tenant>, u64), ServiceError> {
        let rows = self.tenants.iter().map(|t| t.clone()).collect();
        Ok(paginate(rows, page, |t| t.created_at))
    }

    async fn save(&self, tenant: &Tenant) -> Result<(), ServiceError> {
        self.tenants.insert(tenant.tenant_id.clone(), tenant.clone());
        Ok(())
    }
}
