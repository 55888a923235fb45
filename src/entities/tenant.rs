use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::models::Tenant;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: String,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub gateways: Json,
    #[sea_orm(nullable)]
    pub wallet_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Tenant {
    type Error = ServiceError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Tenant {
            tenant_id: model.tenant_id,
            name: model.name,
            description: model.description,
            gateways: serde_json::from_value(model.gateways)?,
            wallet_id: model.wallet_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl ActiveModel {
    pub fn from_domain(tenant: &Tenant) -> Result<Self, ServiceError> {
        Ok(ActiveModel {
            tenant_id: Set(tenant.tenant_id.clone()),
            name: Set(tenant.name.clone()),
            description: Set(tenant.description.clone()),
            gateways: Set(serde_json::to_value(&tenant.gateways)?),
            wallet_id: Set(tenant.wallet_id.clone()),
            created_at: Set(tenant.created_at),
            updated_at: Set(tenant.updated_at),
        })
    }
}
