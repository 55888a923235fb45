use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rust_decimal::Decimal;
use sea_orm::{sea_query::StringLen, DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::basket::Basket;
use crate::errors::ServiceError;
use crate::money::{decimal_amount, Currency};

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
pub enum VoucherStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "used")]
    Used,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: Uuid,
    pub tenant_id: String,
    pub code: String,
    pub status: VoucherStatus,
    /// Percentage, 0 < rate ≤ 100
    pub rate: Decimal,
    pub cap: Option<Decimal>,
    pub currency: Currency,
    pub expired_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub redeemed: i64,
    /// Restricts redemption to one user
    pub user_id: Option<String>,
    /// Product URLs the discount applies to
    pub limited_products: Option<Vec<String>>,
    pub meta_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// Random URL-safe code from 10 bytes of entropy.
pub fn generate_code() -> String {
    let mut bytes = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl Voucher {
    /// `min(amount × rate / 100, cap)`
    pub fn calculate_discount(&self, amount: Decimal) -> Decimal {
        let discount = amount * self.rate / Decimal::ONE_HUNDRED;
        let bounded = match self.cap {
            Some(cap) => discount.min(cap),
            None => discount,
        };
        decimal_amount(bounded)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.map_or(false, |at| at < now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.map_or(false, |max| self.redeemed >= max)
    }

    pub fn ensure_redeemable(&self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if self.status != VoucherStatus::Active {
            return Err(ServiceError::InvalidVoucher(format!(
                "Voucher {} is {}",
                self.code, self.status
            )));
        }
        if self.is_expired_at(now) {
            return Err(ServiceError::InvalidVoucher(format!(
                "Voucher {} has expired",
                self.code
            )));
        }
        if self.is_exhausted() {
            return Err(ServiceError::InvalidVoucher(format!(
                "Voucher {} has reached its usage limit",
                self.code
            )));
        }
        Ok(())
    }

    /// Amount the rate applies to: the subtotal, or only the matching lines for
    /// product-limited vouchers. `None` when no line qualifies.
    pub fn discount_basis(&self, basket: &Basket) -> Option<Decimal> {
        match self.limited_products.as_deref() {
            Some(products) if !products.is_empty() => {
                let matching: Vec<Decimal> = basket
                    .items
                    .values()
                    .filter(|item| products.iter().any(|p| p == &item.product_url))
                    .map(|item| item.price())
                    .collect();
                if matching.is_empty() {
                    None
                } else {
                    Some(decimal_amount(matching.into_iter().sum()))
                }
            }
            _ => Some(basket.subtotal()),
        }
    }

    /// Counts one redemption; flips to `used` when the limit is hit.
    pub fn redeem(&mut self) {
        self.redeemed += 1;
        if self.is_exhausted() {
            self.status = VoucherStatus::Used;
        }
        self.updated_at = Utc::now();
    }

    /// Gives one redemption back, never below zero.
    pub fn release(&mut self) {
        self.redeemed = (self.redeemed - 1).max(0);
        if self.status == VoucherStatus::Used && !self.is_exhausted() {
            self.status = VoucherStatus::Active;
        }
        self.updated_at = Utc::now();
    }
}
