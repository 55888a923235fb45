use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Voucher, VoucherStatus};
use crate::money::Currency;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: String,
    pub code: String,
    pub status: VoucherStatus,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub cap: Option<Decimal>,
    pub currency: String,
    #[sea_orm(nullable)]
    pub expired_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub max_uses: Option<i64>,
    pub redeemed: i64,
    #[sea_orm(nullable)]
    pub user_id: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub limited_products: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub meta_data: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Voucher {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Voucher {
            id: model.id,
            tenant_id: model.tenant_id,
            code: model.code,
            status: model.status,
            rate: model.rate,
            cap: model.cap,
            currency: Currency::from_str(&model.currency).map_err(|_| {
                ServiceError::SerializationError(format!("Unknown currency {}", model.currency))
            })?,
            expired_at: model.expired_at,
            max_uses: model.max_uses,
            redeemed: model.redeemed,
            user_id: model.user_id,
            limited_products: model
                .limited_products
                .map(serde_json::from_value)
                .transpose()?,
            meta_data: model.meta_data,
            created_at: model.created_at,
            updated_at: model.updated_at,
            is_deleted: model.is_deleted,
        })
    }
}

impl ActiveModel {
    pub fn from_domain(voucher: &Voucher) -> Result<Self, ServiceError> {
        Ok(ActiveModel {
            id: Set(voucher.id),
            tenant_id: Set(voucher.tenant_id.clone()),
            code: Set(voucher.code.clone()),
            status: Set(voucher.status),
            rate: Set(voucher.rate),
            cap: Set(voucher.cap),
            currency: Set(voucher.currency.to_string()),
            expired_at: Set(voucher.expired_at),
            max_uses: Set(voucher.max_uses),
            redeemed: Set(voucher.redeemed),
            user_id: Set(voucher.user_id.clone()),
            limited_products: Set(voucher
                .limited_products
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?),
            meta_data: Set(voucher.meta_data.clone()),
            created_at: Set(voucher.created_at),
            updated_at: Set(voucher.updated_at),
            is_deleted: Set(voucher.is_deleted),
        })
    }
}
