use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Payment, PaymentStatus};
use crate::money::Currency;

/// Payment row; attempts ("tries") are kept as a JSON map keyed by attempt id
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: String,
    #[sea_orm(nullable)]
    pub user_id: Option<String>,
    #[sea_orm(nullable)]
    pub wallet_id: Option<String>,
    #[sea_orm(nullable)]
    pub basket_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub original_amount: Decimal,
    pub currency: String,
    pub description: String,
    pub callback_url: String,
    pub status: PaymentStatus,
    #[sea_orm(column_type = "Json")]
    pub tries: Json,
    #[sea_orm(nullable)]
    pub verified_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub failure_reason: Option<String>,
    pub duration_secs: i64,
    #[sea_orm(column_type = "Json")]
    pub available_gateways: Json,
    pub accept_wallet: bool,
    #[sea_orm(nullable)]
    pub voucher_code: Option<String>,
    #[sea_orm(nullable)]
    pub proposal_id: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub meta_data: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Payment {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: model.id,
            tenant_id: model.tenant_id,
            user_id: model.user_id,
            wallet_id: model.wallet_id,
            basket_id: model.basket_id,
            amount: model.amount,
            original_amount: model.original_amount,
            currency: Currency::from_str(&model.currency).map_err(|_| {
                ServiceError::SerializationError(format!("Unknown currency {}", model.currency))
            })?,
            description: model.description,
            callback_url: model.callback_url,
            status: model.status,
            tries: serde_json::from_value(model.tries)?,
            verified_at: model.verified_at,
            failure_reason: model.failure_reason,
            duration_secs: model.duration_secs,
            available_gateways: serde_json::from_value(model.available_gateways)?,
            accept_wallet: model.accept_wallet,
            voucher_code: model.voucher_code,
            proposal_id: model.proposal_id,
            meta_data: model.meta_data,
            created_at: model.created_at,
            updated_at: model.updated_at,
            is_deleted: model.is_deleted,
        })
    }
}

impl ActiveModel {
    pub fn from_domain(payment: &Payment) -> Result<Self, ServiceError> {
        Ok(ActiveModel {
            id: Set(payment.id),
            tenant_id: Set(payment.tenant_id.clone()),
            user_id: Set(payment.user_id.clone()),
            wallet_id: Set(payment.wallet_id.clone()),
            basket_id: Set(payment.basket_id),
            amount: Set(payment.amount),
            original_amount: Set(payment.original_amount),
            currency: Set(payment.currency.to_string()),
            description: Set(payment.description.clone()),
            callback_url: Set(payment.callback_url.clone()),
            status: Set(payment.status),
            tries: Set(serde_json::to_value(&payment.tries)?),
            verified_at: Set(payment.verified_at),
            failure_reason: Set(payment.failure_reason.clone()),
            duration_secs: Set(payment.duration_secs),
            available_gateways: Set(serde_json::to_value(&payment.available_gateways)?),
            accept_wallet: Set(payment.accept_wallet),
            voucher_code: Set(payment.voucher_code.clone()),
            proposal_id: Set(payment.proposal_id.clone()),
            meta_data: Set(payment.meta_data.clone()),
            created_at: Set(payment.created_at),
            updated_at: Set(payment.updated_at),
            is_deleted: Set(payment.is_deleted),
        })
    }
}
