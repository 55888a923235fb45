//! Persistence seams for baskets, vouchers, payments and tenants.
//!
//! Every entity is stored as one tenant-scoped document; writes are whole-row
//! upserts, so concurrent writers to the same record follow last-write-wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::common::Page;
use crate::errors::ServiceError;
use crate::models::{Basket, BasketStatus, Payment, PaymentStatus, Tenant, Voucher, VoucherStatus};

pub mod database;
pub mod memory;

pub use database::{
    SeaOrmBasketRepository, SeaOrmPaymentRepository, SeaOrmTenantRepository,
    SeaOrmVoucherRepository,
};
pub use memory::{
    InMemoryBasketRepository, InMemoryPaymentRepository, InMemoryTenantRepository,
    InMemoryVoucherRepository,
};

#[derive(Debug, Clone, Default)]
pub struct BasketFilter {
    pub user_id: Option<String>,
    pub status: Option<BasketStatus>,
    pub created_at_from: Option<DateTime<Utc>>,
    pub created_at_to: Option<DateTime<Utc>>,
}

impl BasketFilter {
    pub fn matches(&self, basket: &Basket) -> bool {
        self.user_id.as_deref().map_or(true, |u| basket.user_id == u)
            && self.status.map_or(true, |s| basket.status == s)
            && self.created_at_from.map_or(true, |from| basket.created_at >= from)
            && self.created_at_to.map_or(true, |to| basket.created_at <= to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VoucherFilter {
    pub status: Option<VoucherStatus>,
    pub user_id: Option<String>,
    pub created_at_from: Option<DateTime<Utc>>,
    pub created_at_to: Option<DateTime<Utc>>,
}

impl VoucherFilter {
    pub fn matches(&self, voucher: &Voucher) -> bool {
        self.status.map_or(true, |s| voucher.status == s)
            && self
                .user_id
                .as_deref()
                .map_or(true, |u| voucher.user_id.as_deref() == Some(u))
            && self.created_at_from.map_or(true, |from| voucher.created_at >= from)
            && self.created_at_to.map_or(true, |to| voucher.created_at <= to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub user_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub basket_id: Option<Uuid>,
    pub created_at_from: Option<DateTime<Utc>>,
    pub created_at_to: Option<DateTime<Utc>>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.user_id
            .as_deref()
            .map_or(true, |u| payment.user_id.as_deref() == Some(u))
            && self.status.map_or(true, |s| payment.status == s)
            && self.basket_id.map_or(true, |b| payment.basket_id == Some(b))
            && self.created_at_from.map_or(true, |from| payment.created_at >= from)
            && self.created_at_to.map_or(true, |to| payment.created_at <= to)
    }
}

#[async_trait]
pub trait BasketRepository: Send + Sync {
    async fn find(&self, tenant_id: &str, id: Uuid) -> Result<Option<Basket>, ServiceError>;

    /// Most recent `active` basket of the user, if any.
    async fn find_active_for_user(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Option<Basket>, ServiceError>;

    async fn list(
        &self,
        tenant_id: &str,
        filter: &BasketFilter,
        page: Page,
    ) -> Result<(Vec<Basket>, u64), ServiceError>;

    async fn save(&self, basket: &Basket) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait VoucherRepository: Send + Sync {
    async fn find(&self, tenant_id: &str, id: Uuid) -> Result<Option<Voucher>, ServiceError>;

    async fn find_by_code(&self, tenant_id: &str, code: &str)
        -> Result<Option<Voucher>, ServiceError>;

    /// Active voucher with `code` usable by `user_id`: unrestricted vouchers always
    /// qualify, restricted ones only for their own user.
    async fn find_active_by_code(
        &self,
        tenant_id: &str,
        code: &str,
        user_id: Option<&str>,
    ) -> Result<Option<Voucher>, ServiceError>;

    async fn list(
        &self,
        tenant_id: &str,
        filter: &VoucherFilter,
        page: Page,
    ) -> Result<(Vec<Voucher>, u64), ServiceError>;

    /// Inserts a new voucher; a duplicate code within the tenant is a conflict.
    async fn insert(&self, voucher: &Voucher) -> Result<(), ServiceError>;

    async fn save(&self, voucher: &Voucher) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find(&self, tenant_id: &str, id: Uuid) -> Result<Option<Payment>, ServiceError>;

    async fn list(
        &self,
        tenant_id: &str,
        filter: &PaymentFilter,
        page: Page,
    ) -> Result<(Vec<Payment>, u64), ServiceError>;

    async fn save(&self, payment: &Payment) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find(&self, tenant_id: &str) -> Result<Option<Tenant>, ServiceError>;

    async fn list(&self, page: Page) -> Result<(Vec<Tenant>, u64), ServiceError>;

    async fn save(&self, tenant: &Tenant) -> Result<(), ServiceError>;
}
