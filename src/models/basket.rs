use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{sea_query::StringLen, DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::money::{decimal_amount, deserialize_amount, deserialize_optional_amount, Currency};

/// Basket lifecycle.
///
/// `active → reserved → locked → paid` is the happy path; `cancelled` and
/// `expired` are reachable from any non-terminal state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BasketStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "reserved")]
    Reserved,
    #[sea_orm(string_value = "locked")]
    Locked,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl BasketStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled | Self::Expired)
    }

    pub fn can_transition_to(self, next: BasketStatus) -> bool {
        use BasketStatus::*;
        matches!(
            (self, next),
            (Active, Reserved | Locked | Cancelled | Expired)
                | (Reserved, Locked | Cancelled | Expired)
                | (Locked, Paid | Cancelled | Expired)
        )
    }
}

/// Entitlement granted by a SaaS package once paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub asset: String,
    #[serde(deserialize_with = "deserialize_amount")]
    pub quota: Decimal,
    /// Consumption priority (0, 1 or 2)
    #[serde(default)]
    pub order: u8,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub meta_data: Option<Value>,
}

/// Kind-specific payload of a basket item, tagged by `item_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum ItemKind {
    RetailProduct,
    SaasPackage {
        /// Subscription length in days
        #[serde(default)]
        plan_duration: Option<i64>,
        #[serde(default)]
        bundles: Vec<Bundle>,
    },
}

impl Default for ItemKind {
    fn default() -> Self {
        ItemKind::RetailProduct
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketItem {
    pub id: Uuid,
    pub product_url: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_amount")]
    pub unit_price: Decimal,
    #[serde(deserialize_with = "deserialize_amount")]
    pub quantity: Decimal,
    pub currency: Currency,
    #[serde(flatten)]
    pub kind: ItemKind,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub reserve_url: Option<String>,
    #[serde(default)]
    pub validation_url: Option<String>,
    #[serde(default)]
    pub revenue_share_id: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub meta_data: Option<Value>,
    /// Set once the fulfillment record for this line exists
    #[serde(default)]
    pub enrollment_id: Option<String>,
}

/// Largest quantity a single basket line may carry.
pub const MAX_ITEM_QUANTITY: u32 = 1_000_000;

impl BasketItem {
    /// Line total: `unit_price × quantity − discount`.
    pub fn price(&self) -> Decimal {
        self.checked_price().unwrap_or(Decimal::MAX)
    }

    /// Line total, or `None` when it does not fit in a `Decimal`.
    pub fn checked_price(&self) -> Option<Decimal> {
        self.unit_price
            .checked_mul(self.quantity)?
            .checked_sub(self.discount.unwrap_or_default())
            .map(decimal_amount)
    }

    /// Rejects quantities above [`MAX_ITEM_QUANTITY`] and totals that overflow.
    pub fn ensure_in_range(&self) -> Result<(), ServiceError> {
        if self.quantity > Decimal::from(MAX_ITEM_QUANTITY) {
            return Err(ServiceError::ValidationError(format!(
                "Item quantity must not exceed {}",
                MAX_ITEM_QUANTITY
            )));
        }
        if self.checked_price().is_none() {
            return Err(ServiceError::ValidationError(format!(
                "Line total of {} is out of range",
                self.name
            )));
        }
        Ok(())
    }

    /// Two items describe the same line when every field but id and quantity matches.
    pub fn is_same_line(&self, other: &BasketItem) -> bool {
        self.merge_key() == other.merge_key()
    }

    fn merge_key(&self) -> BasketItem {
        BasketItem {
            id: Uuid::nil(),
            quantity: Decimal::ZERO,
            ..self.clone()
        }
    }

    pub fn is_subscription(&self) -> bool {
        matches!(self.kind, ItemKind::SaasPackage { .. })
    }
}

/// Snapshot of the voucher applied to a basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub voucher_id: Uuid,
    pub code: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(deserialize_with = "deserialize_amount")]
    pub discount: Decimal,
}

/// Quantity change for an existing line; exactly one field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasketItemChange {
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub new_quantity: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub quantity_change: Option<Decimal>,
}

impl BasketItemChange {
    pub fn resolve(&self, current: Decimal) -> Result<Decimal, ServiceError> {
        match (self.new_quantity, self.quantity_change) {
            (Some(quantity), None) => Ok(decimal_amount(quantity)),
            (None, Some(change)) => current
                .checked_add(change)
                .map(decimal_amount)
                .ok_or_else(|| {
                    ServiceError::ValidationError("Item quantity is out of range".to_string())
                }),
            _ => Err(ServiceError::ValidationError(
                "Exactly one of new_quantity or quantity_change must be set".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basket {
    pub id: Uuid,
    pub tenant_id: String,
    pub user_id: String,
    pub status: BasketStatus,
    pub currency: Currency,
    pub callback_url: Option<String>,
    pub checkout_at: Option<DateTime<Utc>>,
    pub payment_id: Option<Uuid>,
    pub invoice_id: Option<String>,
    pub discount: Option<AppliedDiscount>,
    pub items: BTreeMap<Uuid, BasketItem>,
    pub meta_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Basket {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            status: BasketStatus::Active,
            currency,
            callback_url: None,
            checkout_at: None,
            payment_id: None,
            invoice_id: None,
            discount: None,
            items: BTreeMap::new(),
            meta_data: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        let total = self
            .items
            .values()
            .fold(Decimal::ZERO, |sum, item| sum.saturating_add(item.price()));
        decimal_amount(total)
    }

    pub fn discount_value(&self) -> Decimal {
        self.discount
            .as_ref()
            .map(|d| d.discount)
            .unwrap_or_default()
    }

    /// Amount due; never negative.
    pub fn amount(&self) -> Decimal {
        decimal_amount((self.subtotal() - self.discount_value()).max(Decimal::ZERO))
    }

    pub fn description(&self) -> String {
        format!("basket id = {} - total price = {}", self.id, self.subtotal())
    }

    pub fn is_modifiable(&self) -> bool {
        self.status == BasketStatus::Active
    }

    pub fn ensure_modifiable(&self) -> Result<(), ServiceError> {
        if self.is_modifiable() {
            Ok(())
        } else {
            Err(ServiceError::InvalidState(format!(
                "Basket {} is {}, not active",
                self.id, self.status
            )))
        }
    }

    pub fn transition_to(&mut self, next: BasketStatus) -> Result<(), ServiceError> {
        if !self.status.can_transition_to(next) {
            return Err(ServiceError::InvalidState(format!(
                "Basket {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Adds a line, merging into an identical existing line. Returns the affected item id.
    pub fn add_item(&mut self, mut item: BasketItem, exclusive: bool) -> Result<Uuid, ServiceError> {
        self.ensure_modifiable()?;
        if item.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Item quantity must be greater than zero".to_string(),
            ));
        }
        if item.currency != self.currency {
            return Err(ServiceError::ValidationError(format!(
                "Currency exchange is not supported: item is {} but basket is {}",
                item.currency, self.currency
            )));
        }

        item.ensure_in_range()?;

        if exclusive {
            self.items.clear();
        }

        if let Some(existing) = self.items.values_mut().find(|line| line.is_same_line(&item)) {
            let mut merged = existing.clone();
            merged.quantity = existing
                .quantity
                .checked_add(item.quantity)
                .map(decimal_amount)
                .unwrap_or(Decimal::MAX);
            merged.ensure_in_range()?;
            *existing = merged;
            let id = existing.id;
            self.touch();
            return Ok(id);
        }

        item.id = Uuid::now_v7();
        let id = item.id;
        self.items.insert(id, item);
        self.touch();
        Ok(id)
    }

    /// Applies a quantity change; a result of zero or less removes the line.
    /// With `silent`, a missing item is a no-op instead of an error.
    pub fn update_item(
        &mut self,
        item_id: Uuid,
        change: &BasketItemChange,
        silent: bool,
    ) -> Result<(), ServiceError> {
        self.ensure_modifiable()?;
        let Some(item) = self.items.get_mut(&item_id) else {
            if silent {
                // Still reject malformed changes
                change.resolve(Decimal::ZERO)?;
                return Ok(());
            }
            return Err(ServiceError::NotFound(format!(
                "Item {} not found in basket {}",
                item_id, self.id
            )));
        };

        let quantity = change.resolve(item.quantity)?;
        if quantity <= Decimal::ZERO {
            self.items.remove(&item_id);
        } else {
            let mut updated = item.clone();
            updated.quantity = quantity;
            updated.ensure_in_range()?;
            *item = updated;
        }
        self.touch();
        Ok(())
    }

    /// Removes a line; an unknown id is a no-op.
    pub fn remove_item(&mut self, item_id: Uuid) -> Result<Option<BasketItem>, ServiceError> {
        self.ensure_modifiable()?;
        let removed = self.items.remove(&item_id);
        if removed.is_some() {
            self.touch();
        }
        Ok(removed)
    }

    pub fn detail(&self) -> BasketDetail {
        BasketDetail {
            id: self.id,
            user_id: self.user_id.clone(),
            status: self.status,
            currency: self.currency,
            callback_url: self.callback_url.clone(),
            checkout_at: self.checkout_at,
            payment_id: self.payment_id,
            invoice_id: self.invoice_id.clone(),
            discount: self.discount.clone(),
            items: self.items.values().cloned().collect(),
            subtotal: self.subtotal(),
            amount: self.amount(),
            meta_data: self.meta_data.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Basket as returned by the API: items as a list plus computed totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketDetail {
    pub id: Uuid,
    pub user_id: String,
    pub status: BasketStatus,
    pub currency: Currency,
    pub callback_url: Option<String>,
    pub checkout_at: Option<DateTime<Utc>>,
    pub payment_id: Option<Uuid>,
    pub invoice_id: Option<String>,
    pub discount: Option<AppliedDiscount>,
    pub items: Vec<BasketItem>,
    pub subtotal: Decimal,
    pub amount: Decimal,
    pub meta_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
