//! Basket → payment → fulfillment.
//!
//! `checkout` locks a basket behind a started payment; `validate` is where the
//! gateway round-trip lands and turns a settled payment into a paid basket.

use chrono::Utc;
use futures::future::join_all;
use metrics::counter;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::baskets::BasketService;
use super::payments::{CreatePaymentInput, PaymentService, StartPaymentInput};
use crate::clients::{AccountingClient, EnrollmentClient, EnrollmentRequest, ProductCatalog};
use crate::common::is_valid_url;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Basket, BasketStatus, PaymentStatus};
use crate::webhooks::{notify_items, ItemEvent, ItemNotifier};

#[derive(Clone)]
pub struct CheckoutService {
    baskets: Arc<BasketService>,
    payments: Arc<PaymentService>,
    catalog: Arc<dyn ProductCatalog>,
    accounting: Arc<dyn AccountingClient>,
    enrollments: Arc<dyn EnrollmentClient>,
    notifier: Arc<dyn ItemNotifier>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        baskets: Arc<BasketService>,
        payments: Arc<PaymentService>,
        catalog: Arc<dyn ProductCatalog>,
        accounting: Arc<dyn AccountingClient>,
        enrollments: Arc<dyn EnrollmentClient>,
        notifier: Arc<dyn ItemNotifier>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            baskets,
            payments,
            catalog,
            accounting,
            enrollments,
            notifier,
            event_sender,
            config,
        }
    }

    fn validate_url(&self, basket_id: Uuid) -> String {
        format!(
            "{}/baskets/{}/validate",
            self.config.public_base_url(),
            basket_id
        )
    }

    /// Locks the basket behind a started payment and returns where to send the payer.
    #[instrument(skip(self, callback_url))]
    pub async fn checkout(
        &self,
        tenant_id: &str,
        basket_id: Uuid,
        callback_url: Option<String>,
    ) -> Result<String, ServiceError> {
        let mut basket = self.baskets.get(tenant_id, basket_id).await?;

        if let Some(url) = callback_url {
            if !is_valid_url(&url) {
                return Err(ServiceError::ValidationError(format!(
                    "Invalid URL: {}",
                    url
                )));
            }
            basket.callback_url = Some(url);
        }

        if matches!(basket.status, BasketStatus::Locked | BasketStatus::Reserved) {
            if let Some(payment_id) = basket.payment_id {
                self.baskets.save(&basket).await?;
                return Ok(self.payments.start_link(payment_id));
            }
        }
        if !matches!(basket.status, BasketStatus::Active | BasketStatus::Reserved) {
            return Err(ServiceError::InvalidState(format!(
                "Basket {} is {} and cannot be checked out",
                basket.id, basket.status
            )));
        }
        if basket.items.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Basket {} is empty",
                basket.id
            )));
        }

        self.validate_items(&basket).await?;
        let reserving = basket.status == BasketStatus::Active;

        let wallet = self
            .accounting
            .get_or_create_user_wallet(tenant_id, &basket.user_id)
            .await?;

        let mut payment = self
            .payments
            .create(
                tenant_id,
                CreatePaymentInput {
                    user_id: Some(basket.user_id.clone()),
                    wallet_id: Some(wallet.id),
                    basket_id: Some(basket.id),
                    amount: basket.amount(),
                    original_amount: Some(basket.subtotal()),
                    currency: Some(basket.currency),
                    description: basket.description(),
                    callback_url: self.validate_url(basket.id),
                    duration_secs: None,
                    available_gateways: None,
                    accept_wallet: None,
                    voucher_code: basket.discount.as_ref().map(|d| d.code.clone()),
                    meta_data: None,
                },
            )
            .await?;
        let outcome = self
            .payments
            .start_payment(&mut payment, Some(&basket.user_id), StartPaymentInput::default())
            .await?;

        // nothing about the basket is stored until the payment has started
        basket.payment_id = Some(payment.id);
        basket.transition_to(BasketStatus::Locked)?;
        self.baskets.save(&basket).await?;
        if reserving {
            self.baskets.announce_reserved(&basket).await;
        }

        self.event_sender
            .send_or_log(Event::BasketCheckedOut {
                basket_id: basket.id,
                payment_id: payment.id,
            })
            .await;
        counter!("basket_api.checkouts.started", 1);
        info!(basket_id = %basket.id, payment_id = %payment.id, "Checked out basket");
        Ok(outcome.redirect_url)
    }

    /// Every line with a `validation_url` must still be sold at its price and in stock.
    async fn validate_items(&self, basket: &Basket) -> Result<(), ServiceError> {
        let items: Vec<_> = basket
            .items
            .values()
            .filter(|item| item.validation_url.is_some())
            .collect();
        let results = join_all(items.iter().map(|item| self.catalog.validate_item(item))).await;

        for (item, result) in items.into_iter().zip(results) {
            if !result? {
                return Err(ServiceError::ValidationError(format!(
                    "Item {} ({}) is no longer available as priced",
                    item.id, item.name
                )));
            }
        }
        Ok(())
    }

    /// Settles the basket's payment and fulfills the basket once it succeeded.
    #[instrument(skip(self))]
    pub async fn validate(&self, tenant_id: &str, basket_id: Uuid) -> Result<Basket, ServiceError> {
        let mut basket = self.baskets.get(tenant_id, basket_id).await?;
        if basket.status != BasketStatus::Locked {
            return Err(ServiceError::InvalidState(format!(
                "Basket {} is {}, not locked",
                basket.id, basket.status
            )));
        }
        let payment_id = basket.payment_id.ok_or_else(|| {
            ServiceError::InvalidState(format!("Basket {} has no payment", basket.id))
        })?;

        let payment = self.payments.settle(tenant_id, payment_id).await?;
        if payment.status != PaymentStatus::Success {
            counter!("basket_api.checkouts.unpaid", 1);
            return Err(ServiceError::PaymentNotSuccessful(format!(
                "Payment {} is {}",
                payment.id, payment.status
            )));
        }

        self.enroll_items(&mut basket).await?;

        basket.checkout_at = Some(Utc::now());
        basket.transition_to(BasketStatus::Paid)?;
        self.baskets.save(&basket).await?;
        notify_items(self.notifier.as_ref(), ItemEvent::Purchased, &basket);

        self.event_sender
            .send_or_log(Event::BasketPaid {
                basket_id: basket.id,
                payment_id,
            })
            .await;
        counter!("basket_api.checkouts.paid", 1);
        Ok(basket)
    }

    /// Creates enrollments for paid SaaS lines that do not have one yet.
    async fn enroll_items(&self, basket: &mut Basket) -> Result<(), ServiceError> {
        let pending: Vec<(Uuid, EnrollmentRequest)> = basket
            .items
            .values()
            .filter(|item| item.enrollment_id.is_none())
            .filter_map(|item| {
                EnrollmentRequest::purchased(&basket.user_id, basket.invoice_id.clone(), item)
                    .map(|request| (item.id, request))
            })
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let tenant_id = basket.tenant_id.clone();
        let results = join_all(
            pending
                .iter()
                .map(|(_, request)| self.enrollments.create_enrollment(&tenant_id, request)),
        )
        .await;

        let mut failure = None;
        for ((item_id, _), result) in pending.iter().zip(results) {
            match result {
                Ok(enrollment) => {
                    if let Some(item) = basket.items.get_mut(item_id) {
                        item.enrollment_id = Some(enrollment.id.clone());
                    }
                    self.event_sender
                        .send_or_log(Event::EnrollmentCreated {
                            basket_id: basket.id,
                            item_id: *item_id,
                            enrollment_id: enrollment.id,
                        })
                        .await;
                }
                Err(e) => {
                    warn!(basket_id = %basket.id, %item_id, error = %e, "enrollment failed");
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            // keep the ids that did succeed so a retry skips them
            Some(e) => {
                basket.touch();
                self.baskets.save(basket).await?;
                Err(e)
            }
            None => Ok(()),
        }
    }
}
