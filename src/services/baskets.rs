use metrics::counter;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::vouchers::VoucherService;
use crate::clients::ProductCatalog;
use crate::common::{validate_url, Page};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Basket, BasketItemChange, BasketStatus};
use crate::money::{decimal_amount, Currency};
use crate::repositories::{BasketFilter, BasketRepository};
use crate::webhooks::{notify_items, ItemEvent, ItemNotifier};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateBasketInput {
    #[validate(custom = "validate_url")]
    pub callback_url: Option<String>,
    pub currency: Option<Currency>,
    pub meta_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemInput {
    #[validate(custom = "validate_url")]
    pub product_url: String,
    #[serde(default = "one")]
    pub quantity: Decimal,
    pub currency: Option<Currency>,
    /// Replace every other line in the basket
    #[serde(default)]
    pub exclusive: bool,
}

fn one() -> Decimal {
    Decimal::ONE
}

/// Status changes a client may request on a basket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasketAction {
    #[serde(alias = "reserved")]
    Reserve,
    #[serde(alias = "cancelled")]
    Cancel,
    #[serde(alias = "expired")]
    Expire,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoucherCode {
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBasketInput {
    #[validate(custom = "validate_url")]
    pub callback_url: Option<String>,
    pub invoice_id: Option<String>,
    pub meta_data: Option<Value>,
    /// `{"code": null}` clears the applied voucher
    pub voucher: Option<VoucherCode>,
    pub status: Option<BasketAction>,
}

#[derive(Clone)]
pub struct BasketService {
    baskets: Arc<dyn BasketRepository>,
    vouchers: Arc<VoucherService>,
    catalog: Arc<dyn ProductCatalog>,
    notifier: Arc<dyn ItemNotifier>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl BasketService {
    pub fn new(
        baskets: Arc<dyn BasketRepository>,
        vouchers: Arc<VoucherService>,
        catalog: Arc<dyn ProductCatalog>,
        notifier: Arc<dyn ItemNotifier>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            baskets,
            vouchers,
            catalog,
            notifier,
            event_sender,
            config,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        tenant_id: &str,
        user_id: &str,
        input: CreateBasketInput,
    ) -> Result<Basket, ServiceError> {
        input.validate()?;
        let mut basket = Basket::new(
            tenant_id,
            user_id,
            input.currency.unwrap_or_else(|| self.config.currency()),
        );
        basket.callback_url = input.callback_url;
        basket.meta_data = input.meta_data;
        self.baskets.save(&basket).await?;

        self.event_sender
            .send_or_log(Event::BasketCreated(basket.id))
            .await;
        info!(basket_id = %basket.id, "Created basket");
        Ok(basket)
    }

    /// The user's active basket, created on demand.
    pub async fn get_or_create_active(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Basket, ServiceError> {
        match self.baskets.find_active_for_user(tenant_id, user_id).await? {
            Some(basket) => Ok(basket),
            None => {
                self.create(tenant_id, user_id, CreateBasketInput::default())
                    .await
            }
        }
    }

    pub async fn get(&self, tenant_id: &str, basket_id: Uuid) -> Result<Basket, ServiceError> {
        self.baskets
            .find(tenant_id, basket_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Basket {} not found", basket_id)))
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &BasketFilter,
        page: Page,
    ) -> Result<(Vec<Basket>, u64), ServiceError> {
        self.baskets.list(tenant_id, filter, page).await
    }

    pub async fn save(&self, basket: &Basket) -> Result<(), ServiceError> {
        self.baskets.save(basket).await
    }

    /// Resolves the product and adds it; without `basket_id` the user's active basket is used.
    #[instrument(skip(self, input), fields(product_url = %input.product_url))]
    pub async fn add_item(
        &self,
        tenant_id: &str,
        user_id: &str,
        basket_id: Option<Uuid>,
        input: AddItemInput,
    ) -> Result<Basket, ServiceError> {
        input.validate()?;
        let mut basket = match basket_id {
            Some(id) => self.get(tenant_id, id).await?,
            None => self.get_or_create_active(tenant_id, user_id).await?,
        };
        basket.ensure_modifiable()?;

        let product = self.catalog.get_product(&input.product_url).await?;
        let item = product.into_item(
            input.product_url,
            decimal_amount(input.quantity),
            input.currency,
            basket.currency,
        );
        let item_id = basket.add_item(item, input.exclusive)?;
        self.vouchers.refresh_discount(&mut basket).await?;
        self.baskets.save(&basket).await?;

        self.event_sender
            .send_or_log(Event::BasketItemAdded {
                basket_id: basket.id,
                item_id,
            })
            .await;
        info!(basket_id = %basket.id, %item_id, "Added item to basket");
        Ok(basket)
    }

    #[instrument(skip(self, change))]
    pub async fn update_item(
        &self,
        tenant_id: &str,
        basket_id: Uuid,
        item_id: Uuid,
        change: BasketItemChange,
    ) -> Result<Basket, ServiceError> {
        let mut basket = self.get(tenant_id, basket_id).await?;
        basket.update_item(item_id, &change, false)?;
        self.vouchers.refresh_discount(&mut basket).await?;
        self.baskets.save(&basket).await?;

        self.event_sender
            .send_or_log(Event::BasketItemUpdated { basket_id, item_id })
            .await;
        Ok(basket)
    }

    #[instrument(skip(self))]
    pub async fn delete_item(
        &self,
        tenant_id: &str,
        basket_id: Uuid,
        item_id: Uuid,
    ) -> Result<Basket, ServiceError> {
        let mut basket = self.get(tenant_id, basket_id).await?;
        if basket.remove_item(item_id)?.is_some() {
            self.vouchers.refresh_discount(&mut basket).await?;
            self.baskets.save(&basket).await?;
            self.event_sender
                .send_or_log(Event::BasketItemRemoved { basket_id, item_id })
                .await;
        }
        Ok(basket)
    }

    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        tenant_id: &str,
        basket_id: Uuid,
        input: UpdateBasketInput,
    ) -> Result<Basket, ServiceError> {
        input.validate()?;
        let mut basket = self.get(tenant_id, basket_id).await?;

        if let Some(voucher) = input.voucher {
            self.vouchers
                .apply_to_basket(&mut basket, voucher.code.as_deref())
                .await?;
        }
        if let Some(callback_url) = input.callback_url {
            basket.callback_url = Some(callback_url);
        }
        if let Some(invoice_id) = input.invoice_id {
            basket.invoice_id = Some(invoice_id);
        }
        if let Some(meta_data) = input.meta_data {
            basket.meta_data = Some(meta_data);
        }
        basket.touch();

        match input.status {
            Some(BasketAction::Reserve) => self.reserve_basket(&mut basket).await?,
            Some(BasketAction::Cancel) => self.cancel_basket(&mut basket).await?,
            Some(BasketAction::Expire) => self.expire_basket(&mut basket).await?,
            None => self.baskets.save(&basket).await?,
        }
        Ok(basket)
    }

    pub async fn reserve(&self, tenant_id: &str, basket_id: Uuid) -> Result<Basket, ServiceError> {
        let mut basket = self.get(tenant_id, basket_id).await?;
        self.reserve_basket(&mut basket).await?;
        Ok(basket)
    }

    pub async fn cancel(&self, tenant_id: &str, basket_id: Uuid) -> Result<Basket, ServiceError> {
        let mut basket = self.get(tenant_id, basket_id).await?;
        self.cancel_basket(&mut basket).await?;
        Ok(basket)
    }

    pub async fn expire(&self, tenant_id: &str, basket_id: Uuid) -> Result<Basket, ServiceError> {
        let mut basket = self.get(tenant_id, basket_id).await?;
        self.expire_basket(&mut basket).await?;
        Ok(basket)
    }

    /// active → reserved; every item with a `reserve_url` is told to hold stock.
    pub async fn reserve_basket(&self, basket: &mut Basket) -> Result<(), ServiceError> {
        basket.transition_to(BasketStatus::Reserved)?;
        self.baskets.save(basket).await?;
        self.announce_reserved(basket).await;
        Ok(())
    }

    /// Reservation side effects for a basket whose new state is already stored.
    pub async fn announce_reserved(&self, basket: &Basket) {
        notify_items(self.notifier.as_ref(), ItemEvent::Reserved, basket);
        self.event_sender
            .send_or_log(Event::BasketReserved(basket.id))
            .await;
        info!(basket_id = %basket.id, "Reserved basket");
    }

    /// Cancels the basket, releasing held stock and the voucher redemption.
    pub async fn cancel_basket(&self, basket: &mut Basket) -> Result<(), ServiceError> {
        basket.transition_to(BasketStatus::Cancelled)?;
        self.vouchers.release_applied(basket).await?;
        self.baskets.save(basket).await?;
        notify_items(self.notifier.as_ref(), ItemEvent::Released, basket);
        self.event_sender
            .send_or_log(Event::BasketCancelled(basket.id))
            .await;
        counter!("basket_api.baskets.cancelled", 1);
        info!(basket_id = %basket.id, "Cancelled basket");
        Ok(())
    }

    pub async fn expire_basket(&self, basket: &mut Basket) -> Result<(), ServiceError> {
        basket.transition_to(BasketStatus::Expired)?;
        self.vouchers.release_applied(basket).await?;
        self.baskets.save(basket).await?;
        notify_items(self.notifier.as_ref(), ItemEvent::Released, basket);
        self.event_sender
            .send_or_log(Event::BasketExpired(basket.id))
            .await;
        info!(basket_id = %basket.id, "Expired basket");
        Ok(())
    }
}
