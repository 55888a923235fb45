use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Basket, BasketStatus};
use crate::money::Currency;

/// Basket row; items and the applied discount are stored as JSON documents
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "baskets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: String,
    pub status: BasketStatus,
    pub currency: String,
    #[sea_orm(nullable)]
    pub callback_url: Option<String>,
    #[sea_orm(nullable)]
    pub checkout_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub payment_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub invoice_id: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub discount: Option<Json>,
    #[sea_orm(column_type = "Json")]
    pub items: Json,
    #[sea_orm(column_type = "Json", nullable)]
    pub meta_data: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Basket {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Basket {
            id: model.id,
            tenant_id: model.tenant_id,
            user_id: model.user_id,
            status: model.status,
            currency: Currency::from_str(&model.currency).map_err(|_| {
                ServiceError::SerializationError(format!("Unknown currency {}", model.currency))
            })?,
            callback_url: model.callback_url,
            checkout_at: model.checkout_at,
            payment_id: model.payment_id,
            invoice_id: model.invoice_id,
            discount: model.discount.map(serde_json::from_value).transpose()?,
            items: serde_json::from_value(model.items)?,
            meta_data: model.meta_data,
            created_at: model.created_at,
            updated_at: model.updated_at,
            is_deleted: model.is_deleted,
        })
    }
}

impl ActiveModel {
    pub fn from_domain(basket: &Basket) -> Result<Self, ServiceError> {
        Ok(ActiveModel {
            id: Set(basket.id),
            tenant_id: Set(basket.tenant_id.clone()),
            user_id: Set(basket.user_id.clone()),
            status: Set(basket.status),
            currency: Set(basket.currency.to_string()),
            callback_url: Set(basket.callback_url.clone()),
            checkout_at: Set(basket.checkout_at),
            payment_id: Set(basket.payment_id),
            invoice_id: Set(basket.invoice_id.clone()),
            discount: Set(basket
                .discount
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?),
            items: Set(serde_json::to_value(&basket.items)?),
            meta_data: Set(basket.meta_data.clone()),
            created_at: Set(basket.created_at),
            updated_at: Set(basket.updated_at),
            is_deleted: Set(basket.is_deleted),
        })
    }
}
