use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    BasketFilter, BasketRepository, PaymentFilter, PaymentRepository, TenantRepository,
    VoucherFilter, VoucherRepository,
};
use crate::common::Page;
use crate::entities::{basket, payment, tenant, voucher};
use crate::errors::ServiceError;
use crate::models::{Basket, BasketStatus, Payment, Tenant, Voucher, VoucherStatus};

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Counts the filtered query, then fetches one page of it.
async fn fetch_page<E, T>(
    db: &DatabaseConnection,
    query: Select<E>,
    page: Page,
) -> Result<(Vec<T>, u64), ServiceError>
where
    E: EntityTrait,
    E::Model: Sync,
    T: TryFrom<E::Model, Error = ServiceError>,
{
    let total = query.clone().count(db).await?;
    let rows = query
        .offset(page.offset)
        .limit(page.limit)
        .all(db)
        .await?;
    let items = rows
        .into_iter()
        .map(T::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((items, total))
}

#[derive(Debug, Clone)]
pub struct SeaOrmBasketRepository {
    base: BaseRepository,
}

impl SeaOrmBasketRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    fn scoped(tenant_id: &str) -> Select<basket::Entity> {
        basket::Entity::find()
            .filter(basket::Column::TenantId.eq(tenant_id))
            .filter(basket::Column::IsDeleted.eq(false))
    }
}

#[async_trait]
impl BasketRepository for SeaOrmBasketRepository {
    async fn find(&self, tenant_id: &str, id: Uuid) -> Result<Option<Basket>, ServiceError> {
        Self::scoped(tenant_id)
            .filter(basket::Column::Id.eq(id))
            .one(self.base.get_db())
            .await?
            .map(Basket::try_from)
            .transpose()
    }

    async fn find_active_for_user(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Option<Basket>, ServiceError> {
        Self::scoped(tenant_id)
            .filter(basket::Column::UserId.eq(user_id))
            .filter(basket::Column::Status.eq(BasketStatus::Active))
            .order_by_desc(basket::Column::CreatedAt)
            .one(self.base.get_db())
            .await?
            .map(Basket::try_from)
            .transpose()
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &BasketFilter,
        page: Page,
    ) -> Result<(Vec<Basket>, u64), ServiceError> {
        let mut query = Self::scoped(tenant_id);
        if let Some(user_id) = &filter.user_id {
            query = query.filter(basket::Column::UserId.eq(user_id.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(basket::Column::Status.eq(status));
        }
        if let Some(from) = filter.created_at_from {
            query = query.filter(basket::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.created_at_to {
            query = query.filter(basket::Column::CreatedAt.lte(to));
        }
        let query = query.order_by_desc(basket::Column::CreatedAt);
        fetch_page(self.base.get_db(), query, page).await
    }

    async fn save(&self, basket: &Basket) -> Result<(), ServiceError> {
        let db = self.base.get_db();
        let model = basket::ActiveModel::from_domain(basket)?;
        if basket::Entity::find_by_id(basket.id).one(db).await?.is_some() {
            model.update(db).await?;
        } else {
            model.insert(db).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SeaOrmVoucherRepository {
    base: BaseRepository,
}

impl SeaOrmVoucherRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    fn scoped(tenant_id: &str) -> Select<voucher::Entity> {
        voucher::Entity::find()
            .filter(voucher::Column::TenantId.eq(tenant_id))
            .filter(voucher::Column::IsDeleted.eq(false))
    }
}

#[async_trait]
impl VoucherRepository for SeaOrmVoucherRepository {
    async fn find(&self, tenant_id: &str, id: Uuid) -> Result<Option<Voucher>, ServiceError> {
        Self::scoped(tenant_id)
            .filter(voucher::Column::Id.eq(id))
            .one(self.base.get_db())
            .await?
            .map(Voucher::try_from)
            .transpose()
    }

    async fn find_by_code(
        &self,
        tenant_id: &str,
        code: &str,
    ) -> Result<Option<Voucher>, ServiceError> {
        Self::scoped(tenant_id)
            .filter(voucher::Column::Code.eq(code))
            .one(self.base.get_db())
            .await?
            .map(Voucher::try_from)
            .transpose()
    }

    async fn find_active_by_code(
        &self,
        tenant_id: &str,
        code: &str,
        user_id: Option<&str>,
    ) -> Result<Option<Voucher>, ServiceError> {
        let mut owner = Condition::any().add(voucher::Column::UserId.is_null());
        if let Some(user_id) = user_id {
            owner = owner.add(voucher::Column::UserId.eq(user_id));
        }
        Self::scoped(tenant_id)
            .filter(voucher::Column::Code.eq(code))
            .filter(voucher::Column::Status.eq(VoucherStatus::Active))
            .filter(owner)
            .one(self.base.get_db())
            .await?
            .map(Voucher::try_from)
            .transpose()
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &VoucherFilter,
        page: Page,
    ) -> Result<(Vec<Voucher>, u64), ServiceError> {
        let mut query = Self::scoped(tenant_id);
        if let Some(status) = filter.status {
            query = query.filter(voucher::Column::Status.eq(status));
        }
        if let Some(user_id) = &filter.user_id {
            query = query.filter(voucher::Column::UserId.eq(user_id.as_str()));
        }
        if let Some(from) = filter.created_at_from {
            query = query.filter(voucher::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.created_at_to {
            query = query.filter(voucher::Column::CreatedAt.lte(to));
        }
        let query = query.order_by_desc(voucher::Column::CreatedAt);
        fetch_page(self.base.get_db(), query, page).await
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
        voucher::ActiveModel::from_domain(voucher)?
            .insert(self.base.get_db())
            .await?;
        Ok(())
    }

    async fn save(&self, voucher: &Voucher) -> Result<(), ServiceError> {
        let db = self.base.get_db();
        let model = voucher::ActiveModel::from_domain(voucher)?;
        if voucher::Entity::find_by_id(voucher.id).one(db).await?.is_some() {
            model.update(db).await?;
        } else {
            model.insert(db).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SeaOrmPaymentRepository {
    base: BaseRepository,
}

impl SeaOrmPaymentRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl PaymentRepository for SeaOrmPaymentRepository {
    async fn find(&self, tenant_id: &str, id: Uuid) -> Result<Option<Payment>, ServiceError> {
        payment::Entity::find_by_id(id)
            .filter(payment::Column::TenantId.eq(tenant_id))
            .filter(payment::Column::IsDeleted.eq(false))
            .one(self.base.get_db())
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &PaymentFilter,
        page: Page,
    ) -> Result<(Vec<Payment>, u64), ServiceError> {
        let mut query = payment::Entity::find()
            .filter(payment::Column::TenantId.eq(tenant_id))
            .filter(payment::Column::IsDeleted.eq(false));
        if let Some(user_id) = &filter.user_id {
            query = query.filter(payment::Column::UserId.eq(user_id.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(payment::Column::Status.eq(status));
        }
        if let Some(basket_id) = filter.basket_id {
            query = query.filter(payment::Column::BasketId.eq(basket_id));
        }
        if let Some(from) = filter.created_at_from {
            query = query.filter(payment::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.created_at_to {
            query = query.filter(payment::Column::CreatedAt.lte(to));
        }
        let query = query.order_by_desc(payment::Column::CreatedAt);
        fetch_page(self.base.get_db(), query, page).await
    }

    async fn save(&self, payment: &Payment) -> Result<(), ServiceError> {
        let db = self.base.get_db();
        let model = payment::ActiveModel::from_domain(payment)?;
        if payment::Entity::find_by_id(payment.id).one(db).await?.is_some() {
            model.update(db).await?;
        } else {
            model.insert(db).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SeaOrmTenantRepository {
    base: BaseRepository,
}

impl SeaOrmTenantRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl TenantRepository for SeaOrmTenantRepository {
    async fn find(&self, tenant_id: &str) -> Result<Option<Tenant>, ServiceError> {
        tenant::Entity::find_by_id(tenant_id.to_string())
            .one(self.base.get_db())
            .await?
            .map(Tenant::try_from)
            .transpose()
    }

    async fn list(&self, page: Page) -> Result<(Vec<Tenant>, u64), ServiceError> {
        let query = tenant::Entity::find().order_by_desc(tenant::Column::CreatedAt);
        fetch_page(self.base.get_db(), query, page).await
    }

    async fn save(&self, tenant: &Tenant) -> Result<(), ServiceError> {
        let db = self.base.get_db();
        let model = tenant::ActiveModel::from_domain(tenant)?;
        if tenant::Entity::find_by_id(tenant.tenant_id.clone())
            .one(db)
            .await?
            .is_some()
        {
            model.update(db).await?;
        } else {
            model.insert(db).await?;
        }
        Ok(())
    }
}
