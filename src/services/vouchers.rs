use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::common::Page;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::voucher::generate_code;
use crate::models::{AppliedDiscount, Basket, Voucher, VoucherStatus};
use crate::money::{decimal_amount, Currency};
use crate::repositories::{VoucherFilter, VoucherRepository};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVoucherInput {
    /// Generated when absent
    #[validate(length(min = 3, max = 64))]
    pub code: Option<String>,
    pub rate: Decimal,
    pub cap: Option<Decimal>,
    pub currency: Option<Currency>,
    pub expired_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub max_uses: Option<i64>,
    pub user_id: Option<String>,
    pub limited_products: Option<Vec<String>>,
    pub meta_data: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateVoucherInput {
    pub status: Option<VoucherStatus>,
    pub rate: Option<Decimal>,
    pub cap: Option<Decimal>,
    pub expired_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub max_uses: Option<i64>,
    pub limited_products: Option<Vec<String>>,
    pub meta_data: Option<Value>,
}

fn check_terms(rate: Decimal, cap: Option<Decimal>) -> Result<(), ServiceError> {
    if rate <= Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(format!(
            "Voucher rate must be in (0, 100], got {}",
            rate
        )));
    }
    if let Some(cap) = cap {
        if cap <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Voucher cap must be greater than zero".to_string(),
            ));
        }
    }
    Ok(())
}

/// Vouchers and their effect on basket totals.
///
/// Redemption counters move only when a basket switches vouchers; item edits
/// recompute the discount value in place.
#[derive(Clone)]
pub struct VoucherService {
    vouchers: Arc<dyn VoucherRepository>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl VoucherService {
    pub fn new(
        vouchers: Arc<dyn VoucherRepository>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            vouchers,
            event_sender,
            config,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        tenant_id: &str,
        input: CreateVoucherInput,
    ) -> Result<Voucher, ServiceError> {
        input.validate()?;
        check_terms(input.rate, input.cap)?;

        let now = Utc::now();
        let voucher = Voucher {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            code: input.code.unwrap_or_else(generate_code),
            status: VoucherStatus::Active,
            rate: decimal_amount(input.rate),
            cap: input.cap.map(decimal_amount),
            currency: input.currency.unwrap_or_else(|| self.config.currency()),
            expired_at: input.expired_at,
            max_uses: input.max_uses,
            redeemed: 0,
            user_id: input.user_id,
            limited_products: input.limited_products,
            meta_data: input.meta_data,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        };
        self.vouchers.insert(&voucher).await?;

        self.event_sender
            .send_or_log(Event::VoucherCreated(voucher.id))
            .await;
        counter!("basket_api.vouchers.created", 1);
        info!(voucher_id = %voucher.id, code = %voucher.code, "Created voucher");
        Ok(voucher)
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &VoucherFilter,
        page: Page,
    ) -> Result<(Vec<Voucher>, u64), ServiceError> {
        self.vouchers.list(tenant_id, filter, page).await
    }

    pub async fn get_by_code(&self, tenant_id: &str, code: &str) -> Result<Voucher, ServiceError> {
        self.vouchers
            .find_by_code(tenant_id, code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Voucher {} not found", code)))
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        tenant_id: &str,
        code: &str,
        input: UpdateVoucherInput,
    ) -> Result<Voucher, ServiceError> {
        input.validate()?;
        let mut voucher = self.get_by_code(tenant_id, code).await?;

        let rate = input.rate.unwrap_or(voucher.rate);
        let cap = input.cap.or(voucher.cap);
        check_terms(rate, cap)?;
        voucher.rate = decimal_amount(rate);
        voucher.cap = cap.map(decimal_amount);

        if let Some(status) = input.status {
            voucher.status = status;
        }
        if let Some(expired_at) = input.expired_at {
            voucher.expired_at = Some(expired_at);
        }
        if let Some(max_uses) = input.max_uses {
            voucher.max_uses = Some(max_uses);
        }
        if let Some(products) = input.limited_products {
            voucher.limited_products = Some(products);
        }
        if let Some(meta_data) = input.meta_data {
            voucher.meta_data = Some(meta_data);
        }
        voucher.updated_at = Utc::now();

        self.vouchers.save(&voucher).await?;
        info!(voucher_id = %voucher.id, "Updated voucher");
        Ok(voucher)
    }

    fn discount_for(voucher: &Voucher, basket: &Basket) -> Result<Decimal, ServiceError> {
        voucher
            .discount_basis(basket)
            .map(|basis| voucher.calculate_discount(basis))
            .ok_or_else(|| {
                ServiceError::InvalidVoucher(format!(
                    "Voucher {} does not apply to any item in the basket",
                    voucher.code
                ))
            })
    }

    /// Applies `code` to the basket, or clears the discount when `code` is empty.
    ///
    /// Voucher counters are persisted here; the caller persists the basket.
    #[instrument(skip(self, basket), fields(basket_id = %basket.id))]
    pub async fn apply_to_basket(
        &self,
        basket: &mut Basket,
        code: Option<&str>,
    ) -> Result<(), ServiceError> {
        basket.ensure_modifiable()?;
        let tenant_id = basket.tenant_id.clone();
        let now = Utc::now();

        let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
            if let Some(previous) = basket.discount.take() {
                self.release(&tenant_id, previous.voucher_id, basket.id).await?;
                basket.touch();
            }
            return Ok(());
        };

        // Same voucher again: refresh the value only
        if let Some(applied) = basket.discount.clone().filter(|d| d.code == code) {
            let voucher = self
                .vouchers
                .find(&tenant_id, applied.voucher_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Voucher {} not found", code)))?;
            if voucher.is_expired_at(now) {
                return Err(ServiceError::InvalidVoucher(format!(
                    "Voucher {} has expired",
                    code
                )));
            }
            let discount = Self::discount_for(&voucher, basket)?;
            basket.discount = Some(AppliedDiscount { discount, ..applied });
            basket.touch();
            return Ok(());
        }

        let mut voucher = self
            .vouchers
            .find_active_by_code(&tenant_id, code, Some(&basket.user_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound("Voucher not found".to_string()))?;
        voucher.ensure_redeemable(now)?;
        if voucher.currency != basket.currency {
            return Err(ServiceError::InvalidVoucher(format!(
                "Voucher {} is in {} but the basket is in {}",
                voucher.code, voucher.currency, basket.currency
            )));
        }
        let discount = Self::discount_for(&voucher, basket)?;

        if let Some(previous) = basket.discount.take() {
            self.release(&tenant_id, previous.voucher_id, basket.id).await?;
        }

        voucher.redeem();
        self.vouchers.save(&voucher).await?;

        basket.discount = Some(AppliedDiscount {
            voucher_id: voucher.id,
            code: voucher.code.clone(),
            user_id: Some(basket.user_id.clone()),
            discount,
        });
        basket.touch();

        self.event_sender
            .send_or_log(Event::VoucherApplied {
                voucher_id: voucher.id,
                basket_id: basket.id,
            })
            .await;
        counter!("basket_api.vouchers.applied", 1);
        info!(voucher_id = %voucher.id, %discount, "Applied voucher to basket");
        Ok(())
    }

    /// Recomputes the applied discount against the current items without touching counters.
    pub async fn refresh_discount(&self, basket: &mut Basket) -> Result<(), ServiceError> {
        let Some(applied) = basket.discount.clone() else {
            return Ok(());
        };
        let Some(voucher) = self
            .vouchers
            .find(&basket.tenant_id, applied.voucher_id)
            .await?
        else {
            warn!(voucher_id = %applied.voucher_id, "applied voucher no longer exists");
            return Ok(());
        };
        let discount = voucher
            .discount_basis(basket)
            .map(|basis| voucher.calculate_discount(basis))
            .unwrap_or_default();
        basket.discount = Some(AppliedDiscount { discount, ..applied });
        Ok(())
    }

    /// Gives back the redemption held by a basket that will never be paid.
    pub async fn release_applied(&self, basket: &Basket) -> Result<(), ServiceError> {
        match &basket.discount {
            Some(applied) => {
                self.release(&basket.tenant_id, applied.voucher_id, basket.id)
                    .await
            }
            None => Ok(()),
        }
    }

    async fn release(
        &self,
        tenant_id: &str,
        voucher_id: Uuid,
        basket_id: Uuid,
    ) -> Result<(), ServiceError> {
        let Some(mut voucher) = self.vouchers.find(tenant_id, voucher_id).await? else {
            warn!(%voucher_id, "previously applied voucher not found; nothing to release");
            return Ok(());
        };
        voucher.release();
        self.vouchers.save(&voucher).await?;
        self.event_sender
            .send_or_log(Event::VoucherReleased {
                voucher_id,
                basket_id,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BasketItem, ItemKind};
    use crate::repositories::InMemoryVoucherRepository;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn service() -> (VoucherService, Arc<InMemoryVoucherRepository>, mpsc::Receiver<Event>) {
        let repo = Arc::new(InMemoryVoucherRepository::new());
        let (tx, rx) = mpsc::channel(32);
        let config = Arc::new(AppConfig::new(
            "sqlite::memory:".into(),
            "http://localhost:8080".into(),
            "test".into(),
        ));
        let svc = VoucherService::new(repo.clone(), Arc::new(EventSender::new(tx)), config);
        (svc, repo, rx)
    }

    fn input(code: &str, rate: Decimal) -> CreateVoucherInput {
        CreateVoucherInput {
            code: Some(code.to_string()),
            rate,
            cap: None,
            currency: None,
            expired_at: None,
            max_uses: None,
            user_id: None,
            limited_products: None,
            meta_data: None,
        }
    }

    fn basket_with(product: &str, unit_price: Decimal) -> Basket {
        let mut basket = Basket::new("t1", "u1", Currency::Irr);
        basket
            .add_item(
                BasketItem {
                    id: Uuid::nil(),
                    product_url: product.to_string(),
                    name: "item".into(),
                    description: None,
                    unit_price,
                    quantity: dec!(1),
                    currency: Currency::Irr,
                    kind: ItemKind::RetailProduct,
                    discount: None,
                    webhook_url: None,
                    reserve_url: None,
                    validation_url: None,
                    revenue_share_id: None,
                    tax_id: None,
                    merchant: None,
                    variant: None,
                    meta_data: None,
                    enrollment_id: None,
                },
                false,
            )
            .unwrap();
        basket
    }

    #[tokio::test]
    async fn create_rejects_out_of_range_rate() {
        let (svc, _, _rx) = service();
        assert_matches!(
            svc.create("t1", input("ZERO", dec!(0))).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            svc.create("t1", input("HUGE", dec!(100.5))).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn create_generates_code_and_rejects_duplicates() {
        let (svc, _, _rx) = service();
        let mut generated = input("unused", dec!(10));
        generated.code = None;
        let voucher = svc.create("t1", generated).await.unwrap();
        assert_eq!(voucher.code.len(), 14);
        assert_eq!(voucher.currency, Currency::Irr);

        svc.create("t1", input("SAVE10", dec!(10))).await.unwrap();
        assert_matches!(
            svc.create("t1", input("SAVE10", dec!(20))).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn swapping_vouchers_moves_counters() {
        let (svc, repo, _rx) = service();
        let a = svc.create("t1", input("AAA", dec!(10))).await.unwrap();
        let b = svc.create("t1", input("BBB", dec!(20))).await.unwrap();
        let mut basket = basket_with("p1", dec!(100));

        svc.apply_to_basket(&mut basket, Some("AAA")).await.unwrap();
        assert_eq!(basket.discount_value(), dec!(10));
        assert_eq!(repo.find("t1", a.id).await.unwrap().unwrap().redeemed, 1);

        svc.apply_to_basket(&mut basket, Some("BBB")).await.unwrap();
        assert_eq!(basket.discount_value(), dec!(20));
        assert_eq!(repo.find("t1", a.id).await.unwrap().unwrap().redeemed, 0);
        assert_eq!(repo.find("t1", b.id).await.unwrap().unwrap().redeemed, 1);

        svc.apply_to_basket(&mut basket, None).await.unwrap();
        assert!(basket.discount.is_none());
        assert_eq!(repo.find("t1", b.id).await.unwrap().unwrap().redeemed, 0);
    }

    #[tokio::test]
    async fn reapplying_same_voucher_does_not_count_twice() {
        let (svc, repo, _rx) = service();
        let mut single_use = input("ONCE", dec!(50));
        single_use.max_uses = Some(1);
        let voucher = svc.create("t1", single_use).await.unwrap();
        let mut basket = basket_with("p1", dec!(80));

        svc.apply_to_basket(&mut basket, Some("ONCE")).await.unwrap();
        svc.apply_to_basket(&mut basket, Some("ONCE")).await.unwrap();

        let stored = repo.find("t1", voucher.id).await.unwrap().unwrap();
        assert_eq!(stored.redeemed, 1);
        assert_eq!(stored.status, VoucherStatus::Used);
        assert_eq!(basket.discount_value(), dec!(40));
    }

    #[tokio::test]
    async fn exhausted_voucher_cannot_be_applied_elsewhere() {
        let (svc, _, _rx) = service();
        let mut single_use = input("ONCE", dec!(50));
        single_use.max_uses = Some(1);
        svc.create("t1", single_use).await.unwrap();

        let mut first = basket_with("p1", dec!(80));
        svc.apply_to_basket(&mut first, Some("ONCE")).await.unwrap();

        let mut second = basket_with("p1", dec!(80));
        assert_matches!(
            svc.apply_to_basket(&mut second, Some("ONCE")).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn expired_and_foreign_currency_vouchers_are_rejected() {
        let (svc, _, _rx) = service();
        let mut expired = input("OLD", dec!(10));
        expired.expired_at = Some(Utc::now() - chrono::Duration::days(1));
        svc.create("t1", expired).await.unwrap();
        let mut dollars = input("USD10", dec!(10));
        dollars.currency = Some(Currency::Usd);
        svc.create("t1", dollars).await.unwrap();

        let mut basket = basket_with("p1", dec!(80));
        assert_matches!(
            svc.apply_to_basket(&mut basket, Some("OLD")).await,
            Err(ServiceError::InvalidVoucher(_))
        );
        assert_matches!(
            svc.apply_to_basket(&mut basket, Some("USD10")).await,
            Err(ServiceError::InvalidVoucher(_))
        );
    }

    #[tokio::test]
    async fn limited_voucher_needs_a_matching_item() {
        let (svc, _, _rx) = service();
        let mut limited = input("ONLYP2", dec!(50));
        limited.limited_products = Some(vec!["p2".into()]);
        svc.create("t1", limited).await.unwrap();

        let mut basket = basket_with("p1", dec!(80));
        assert_matches!(
            svc.apply_to_basket(&mut basket, Some("ONLYP2")).await,
            Err(ServiceError::InvalidVoucher(_))
        );
    }

    #[tokio::test]
    async fn user_restricted_voucher_is_invisible_to_others() {
        let (svc, _, _rx) = service();
        let mut personal = input("MINE", dec!(10));
        personal.user_id = Some("someone-else".into());
        svc.create("t1", personal).await.unwrap();

        let mut basket = basket_with("p1", dec!(80));
        assert_matches!(
            svc.apply_to_basket(&mut basket, Some("MINE")).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn refresh_recomputes_without_counting() {
        let (svc, repo, _rx) = service();
        let voucher = svc.create("t1", input("TEN", dec!(10))).await.unwrap();
        let mut basket = basket_with("p1", dec!(100));
        svc.apply_to_basket(&mut basket, Some("TEN")).await.unwrap();

        let id = basket.items.keys().next().copied().unwrap();
        basket
            .update_item(
                id,
                &crate::models::BasketItemChange {
                    new_quantity: Some(dec!(3)),
                    ..Default::default()
                },
                false,
            )
            .unwrap();
        svc.refresh_discount(&mut basket).await.unwrap();

        assert_eq!(basket.discount_value(), dec!(30));
        assert_eq!(repo.find("t1", voucher.id).await.unwrap().unwrap().redeemed, 1);
    }
}
