use chrono::Utc;
use futures::future::join_all;
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::clients::{
    AccountingClient, GatewayPurchaseRequest, PaymentGateway, ProposalRequest, Wallet,
};
use crate::common::{validate_url, Page};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Payment, PaymentAttempt, PaymentStatus};
use crate::money::{decimal_amount, Currency};
use crate::repositories::{PaymentFilter, PaymentRepository, TenantRepository};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentInput {
    pub user_id: Option<String>,
    pub wallet_id: Option<String>,
    pub basket_id: Option<Uuid>,
    pub amount: Decimal,
    pub original_amount: Option<Decimal>,
    pub currency: Option<Currency>,
    #[validate(length(min = 1, max = 512))]
    pub description: String,
    #[validate(custom = "validate_url")]
    pub callback_url: String,
    #[validate(range(min = 1, max = 31_536_000))]
    pub duration_secs: Option<i64>,
    pub available_gateways: Option<Vec<String>>,
    pub accept_wallet: Option<bool>,
    pub voucher_code: Option<String>,
    pub meta_data: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartPaymentInput {
    pub gateway: Option<String>,
    pub amount: Option<Decimal>,
    pub phone: Option<String>,
}

/// Where to send the payer next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub payment_id: Uuid,
    pub redirect_url: String,
}

/// Payment plus what the payer can use to settle it.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentDetail {
    #[serde(flatten)]
    pub payment: Payment,
    pub gateways: Vec<String>,
    pub wallets: Option<Vec<Wallet>>,
}

/// Payment orchestration: gateway attempts, verification and fund transfer.
#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    tenants: Arc<dyn TenantRepository>,
    gateway: Arc<dyn PaymentGateway>,
    accounting: Arc<dyn AccountingClient>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        tenants: Arc<dyn TenantRepository>,
        gateway: Arc<dyn PaymentGateway>,
        accounting: Arc<dyn AccountingClient>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            payments,
            tenants,
            gateway,
            accounting,
            event_sender,
            config,
        }
    }

    async fn tenant_gateways(&self, tenant_id: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .tenants
            .find(tenant_id)
            .await?
            .map(|tenant| tenant.gateways)
            .unwrap_or_default())
    }

    #[instrument(skip(self, input), fields(amount = %input.amount))]
    pub async fn create(
        &self,
        tenant_id: &str,
        input: CreatePaymentInput,
    ) -> Result<Payment, ServiceError> {
        input.validate()?;
        let amount = decimal_amount(input.amount);
        if amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must not be negative".to_string(),
            ));
        }

        let wallet_id = match (&input.wallet_id, &input.user_id) {
            (Some(wallet_id), _) => wallet_id.clone(),
            (None, Some(user_id)) => {
                self.accounting
                    .get_or_create_user_wallet(tenant_id, user_id)
                    .await?
                    .id
            }
            (None, None) => {
                return Err(ServiceError::ValidationError(
                    "user_id or wallet_id must be set".to_string(),
                ))
            }
        };

        let available_gateways = match input.available_gateways {
            Some(gateways) if !gateways.is_empty() => gateways,
            _ => self.tenant_gateways(tenant_id).await?,
        };

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::now_v7(),
            tenant_id: tenant_id.to_string(),
            user_id: input.user_id,
            wallet_id: Some(wallet_id),
            basket_id: input.basket_id,
            amount,
            original_amount: input
                .original_amount
                .map(decimal_amount)
                .filter(|original| !original.is_zero())
                .unwrap_or(amount),
            currency: input.currency.unwrap_or_else(|| self.config.currency()),
            description: input.description,
            callback_url: input.callback_url,
            status: PaymentStatus::Init,
            tries: BTreeMap::new(),
            verified_at: None,
            failure_reason: None,
            duration_secs: input
                .duration_secs
                .unwrap_or(self.config.payment_duration_secs),
            available_gateways,
            accept_wallet: input.accept_wallet.unwrap_or(true),
            voucher_code: input.voucher_code,
            proposal_id: None,
            meta_data: input.meta_data,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        };
        self.payments.save(&payment).await?;

        self.event_sender
            .send_or_log(Event::PaymentCreated(payment.id))
            .await;
        counter!("basket_api.payments.created", 1);
        info!(payment_id = %payment.id, "Created payment");
        Ok(payment)
    }

    pub async fn get(&self, tenant_id: &str, payment_id: Uuid) -> Result<Payment, ServiceError> {
        self.payments
            .find(tenant_id, payment_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
    }

    /// The payment with the tenant's gateways and, for a known user, their wallets.
    pub async fn get_detail(
        &self,
        tenant_id: &str,
        payment_id: Uuid,
        user_id: Option<&str>,
    ) -> Result<PaymentDetail, ServiceError> {
        let payment = self.get(tenant_id, payment_id).await?;
        let gateways = if payment.available_gateways.is_empty() {
            self.tenant_gateways(tenant_id).await?
        } else {
            payment.available_gateways.clone()
        };
        let wallets = match user_id {
            Some(user_id) => Some(self.accounting.user_wallets(tenant_id, user_id).await?),
            None => None,
        };
        Ok(PaymentDetail {
            payment,
            gateways,
            wallets,
        })
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &PaymentFilter,
        page: Page,
    ) -> Result<(Vec<Payment>, u64), ServiceError> {
        self.payments.list(tenant_id, filter, page).await
    }

    /// URL the gateway sends the payer back to.
    pub fn verify_url(&self, payment_id: Uuid) -> String {
        format!(
            "{}/payments/{}/verify",
            self.config.public_base_url(),
            payment_id
        )
    }

    /// Link that (re)starts a payment through this service.
    pub fn start_link(&self, payment_id: Uuid) -> String {
        format!(
            "{}/payments/{}/start",
            self.config.public_base_url(),
            payment_id
        )
    }

    async fn resolve_gateway(
        &self,
        payment: &Payment,
        requested: Option<String>,
    ) -> Result<String, ServiceError> {
        if let Some(gateway) = requested {
            if !payment.available_gateways.is_empty()
                && !payment.available_gateways.contains(&gateway)
            {
                return Err(ServiceError::ValidationError(format!(
                    "Gateway {} is not available for this payment",
                    gateway
                )));
            }
            return Ok(gateway);
        }
        if let Some(gateway) = payment.available_gateways.first() {
            return Ok(gateway.clone());
        }
        self.tenant_gateways(&payment.tenant_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ServiceError::InvalidInput("No payment gateway is configured".to_string())
            })
    }

    #[instrument(skip(self, input))]
    pub async fn start(
        &self,
        tenant_id: &str,
        payment_id: Uuid,
        user_id: Option<&str>,
        input: StartPaymentInput,
    ) -> Result<StartOutcome, ServiceError> {
        let mut payment = self.get(tenant_id, payment_id).await?;
        self.start_payment(&mut payment, user_id, input).await
    }

    /// Opens a gateway attempt for the payment and returns the payer's redirect.
    pub async fn start_payment(
        &self,
        payment: &mut Payment,
        user_id: Option<&str>,
        input: StartPaymentInput,
    ) -> Result<StartOutcome, ServiceError> {
        if payment.is_overdue() {
            if payment.mark_failed("Payment is overdue") {
                self.payments.save(payment).await?;
                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        payment_id: payment.id,
                        reason: "Payment is overdue".to_string(),
                    })
                    .await;
            }
            return Err(ServiceError::PaymentOverdue);
        }
        if !payment.is_open() {
            return Err(ServiceError::InvalidPayment(payment.status.to_string()));
        }

        let amount = input
            .amount
            .map(decimal_amount)
            .unwrap_or(payment.amount);
        let verify_url = self.verify_url(payment.id);
        if amount.is_zero() {
            return Ok(StartOutcome {
                payment_id: payment.id,
                redirect_url: verify_url,
            });
        }

        let gateway = self.resolve_gateway(payment, input.gateway).await?;
        let payer = user_id
            .map(str::to_string)
            .or_else(|| payment.user_id.clone());
        let request = GatewayPurchaseRequest {
            user_id: payer.clone(),
            wallet_id: payment.wallet_id.clone(),
            amount,
            phone: input.phone.clone(),
            description: payment.description.clone(),
            callback_url: verify_url,
        };
        let purchase = self
            .gateway
            .create_purchase(&payment.tenant_id, &gateway, &request)
            .await?;

        let now = Utc::now();
        payment.tries.insert(
            purchase.id.clone(),
            PaymentAttempt {
                id: purchase.id.clone(),
                gateway: gateway.clone(),
                user_id: payer,
                phone: input.phone,
                status: purchase.status,
                failure_reason: None,
                created_at: now,
                verified_at: None,
            },
        );
        payment.status = PaymentStatus::Pending;
        payment.updated_at = now;
        self.payments.save(payment).await?;

        self.event_sender
            .send_or_log(Event::PaymentStarted {
                payment_id: payment.id,
                attempt_id: purchase.id.clone(),
                gateway: gateway.clone(),
            })
            .await;
        counter!("basket_api.payments.started", 1);
        info!(payment_id = %payment.id, %gateway, attempt_id = %purchase.id, "Started payment");

        Ok(StartOutcome {
            payment_id: payment.id,
            redirect_url: self.gateway.start_url(&gateway, &purchase.id),
        })
    }

    #[instrument(skip(self))]
    pub async fn verify(&self, tenant_id: &str, payment_id: Uuid) -> Result<Payment, ServiceError> {
        let mut payment = self.get(tenant_id, payment_id).await?;
        self.verify_payment(&mut payment).await?;
        Ok(payment)
    }

    /// Polls every open attempt and folds the results into the payment.
    pub async fn verify_payment(&self, payment: &mut Payment) -> Result<(), ServiceError> {
        let before = payment.status;
        let now = Utc::now();

        if payment.amount.is_zero() {
            if payment.is_open() && payment.mark_success(now) {
                self.payments.save(payment).await?;
                self.announce_transition(payment, before).await;
            }
            return Ok(());
        }

        let open: Vec<(String, String)> = payment
            .open_attempts()
            .map(|attempt| (attempt.id.clone(), attempt.gateway.clone()))
            .collect();
        if open.is_empty() {
            return Ok(());
        }

        let tenant_id = payment.tenant_id.clone();
        let results = join_all(open.iter().map(|(attempt_id, gateway)| {
            self.gateway
                .purchase_status(&tenant_id, gateway, attempt_id)
        }))
        .await;

        for ((attempt_id, gateway), result) in open.iter().zip(results) {
            match result {
                Ok(purchase) => match purchase.status {
                    PaymentStatus::Success => {
                        payment.succeed_attempt(attempt_id, now);
                    }
                    PaymentStatus::Failed => {
                        payment.fail_attempt(attempt_id, purchase.failure_reason, now)
                    }
                    _ => {}
                },
                Err(e) => {
                    warn!(%attempt_id, %gateway, error = %e, "could not verify attempt");
                }
            }
        }

        payment.updated_at = now;
        self.payments.save(payment).await?;
        self.announce_transition(payment, before).await;
        Ok(())
    }

    async fn announce_transition(&self, payment: &Payment, before: PaymentStatus) {
        if payment.status == before {
            return;
        }
        match payment.status {
            PaymentStatus::Success => {
                counter!("basket_api.payments.succeeded", 1);
                info!(payment_id = %payment.id, "Payment succeeded");
                self.event_sender
                    .send_or_log(Event::PaymentSucceeded(payment.id))
                    .await;
            }
            PaymentStatus::Failed => {
                counter!("basket_api.payments.failed", 1);
                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        payment_id: payment.id,
                        reason: payment.failure_reason.clone().unwrap_or_default(),
                    })
                    .await;
            }
            _ => {}
        }
    }

    /// Verifies the payment and, once it succeeded, moves the funds exactly once.
    #[instrument(skip(self))]
    pub async fn settle(&self, tenant_id: &str, payment_id: Uuid) -> Result<Payment, ServiceError> {
        let mut payment = self.get(tenant_id, payment_id).await?;
        self.settle_payment(&mut payment).await?;
        Ok(payment)
    }

    pub async fn settle_payment(&self, payment: &mut Payment) -> Result<(), ServiceError> {
        self.verify_payment(payment).await?;
        if payment.status == PaymentStatus::Success
            && payment.amount > Decimal::ZERO
            && payment.proposal_id.is_none()
        {
            self.create_proposal(payment).await?;
        }
        Ok(())
    }

    /// Transfers the payment amount from the payer's wallet to the tenant's wallet.
    pub async fn create_proposal(&self, payment: &mut Payment) -> Result<(), ServiceError> {
        let tenant_id = payment.tenant_id.clone();
        let wallet_id = payment.wallet_id.clone().ok_or_else(|| {
            ServiceError::InvalidInput(format!("Payment {} has no wallet", payment.id))
        })?;

        let wallet = self.accounting.get_wallet(&tenant_id, &wallet_id).await?;
        let available = wallet.available(payment.currency);
        if available < payment.amount {
            error!(
                payment_id = %payment.id,
                needed = %payment.amount,
                %available,
                "insufficient funds"
            );
            counter!("basket_api.payments.insufficient_funds", 1);
            return Err(ServiceError::InsufficientFunds {
                needed: payment.amount,
                available,
            });
        }

        let tenant_wallet = self
            .tenants
            .find(&tenant_id)
            .await?
            .and_then(|tenant| tenant.wallet_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Wallet of tenant {} not found", tenant_id))
            })?;

        let request = ProposalRequest::transfer(
            wallet_id,
            tenant_wallet,
            payment.amount,
            payment.currency,
            payment.description.clone(),
        );
        let proposal = self.accounting.create_proposal(&tenant_id, &request).await?;

        payment.proposal_id = Some(proposal.id.clone());
        payment.updated_at = Utc::now();
        self.payments.save(payment).await?;

        self.event_sender
            .send_or_log(Event::ProposalCreated {
                payment_id: payment.id,
                proposal_id: proposal.id,
                amount: payment.amount,
            })
            .await;
        Ok(())
    }

    /// Marks the payment failed; a successful payment is left untouched.
    #[instrument(skip(self))]
    pub async fn fail(
        &self,
        tenant_id: &str,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Payment, ServiceError> {
        let mut payment = self.get(tenant_id, payment_id).await?;
        let before = payment.status;
        if payment.mark_failed(reason) {
            self.payments.save(&payment).await?;
            self.announce_transition(&payment, before).await;
        }
        Ok(payment)
    }

    /// Creates a payment for a wallet and starts it immediately.
    pub async fn start_direct(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        input: CreatePaymentInput,
    ) -> Result<StartOutcome, ServiceError> {
        let mut payment = self.create(tenant_id, input).await?;
        self.start_payment(&mut payment, user_id, StartPaymentInput::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{GatewayPurchase, Proposal};
    use crate::models::Tenant;
    use crate::repositories::{InMemoryPaymentRepository, InMemoryTenantRepository};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use mockall::mock;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    mock! {
        pub Gateway {}
        #[async_trait]
        impl PaymentGateway for Gateway {
            async fn create_purchase(
                &self,
                tenant_id: &str,
                gateway: &str,
                request: &GatewayPurchaseRequest,
            ) -> Result<GatewayPurchase, ServiceError>;
            async fn purchase_status(
                &self,
                tenant_id: &str,
                gateway: &str,
                attempt_id: &str,
            ) -> Result<GatewayPurchase, ServiceError>;
            fn start_url(&self, gateway: &str, attempt_id: &str) -> String;
        }
    }

    mock! {
        pub Accounting {}
        #[async_trait]
        impl AccountingClient for Accounting {
            async fn get_wallet(&self, tenant_id: &str, wallet_id: &str) -> Result<Wallet, ServiceError>;
            async fn user_wallets(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Wallet>, ServiceError>;
            async fn create_wallet(&self, tenant_id: &str, user_id: &str) -> Result<Wallet, ServiceError>;
            async fn create_proposal(&self, tenant_id: &str, request: &ProposalRequest) -> Result<Proposal, ServiceError>;
        }
    }

    fn purchase(id: &str, status: PaymentStatus) -> GatewayPurchase {
        GatewayPurchase {
            id: id.to_string(),
            status,
            failure_reason: None,
        }
    }

    fn wallet(available: Decimal) -> Wallet {
        let mut balance = HashMap::new();
        balance.insert(
            "IRR".to_string(),
            crate::clients::WalletBalance {
                available,
                total: available,
            },
        );
        Wallet {
            id: "payer-wallet".into(),
            user_id: Some("u1".into()),
            is_default: true,
            balance,
        }
    }

    async fn service(gateway: MockGateway, accounting: MockAccounting) -> PaymentService {
        let tenants = Arc::new(InMemoryTenantRepository::new());
        let mut tenant = Tenant::new("t1", "Shop");
        tenant.gateways = vec!["zarinpal".into()];
        tenant.wallet_id = Some("tenant-wallet".into());
        tenants.save(&tenant).await.unwrap();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(crate::events::process_events(rx));
        let config = Arc::new(AppConfig::new(
            "sqlite::memory:".into(),
            "https://core.example.com".into(),
            "test".into(),
        ));
        PaymentService::new(
            Arc::new(InMemoryPaymentRepository::new()),
            tenants,
            Arc::new(gateway),
            Arc::new(accounting),
            Arc::new(EventSender::new(tx)),
            config,
        )
    }

    fn input(amount: Decimal) -> CreatePaymentInput {
        CreatePaymentInput {
            user_id: Some("u1".into()),
            wallet_id: Some("payer-wallet".into()),
            basket_id: None,
            amount,
            original_amount: None,
            currency: None,
            description: "basket".into(),
            callback_url: "https://shop.example.com/done".into(),
            duration_secs: None,
            available_gateways: None,
            accept_wallet: None,
            voucher_code: None,
            meta_data: None,
        }
    }

    #[tokio::test]
    async fn create_defaults_gateways_and_original_amount() {
        let svc = service(MockGateway::new(), MockAccounting::new()).await;
        let payment = svc.create("t1", input(dec!(100))).await.unwrap();

        assert_eq!(payment.available_gateways, vec!["zarinpal".to_string()]);
        assert_eq!(payment.original_amount, dec!(100));
        assert_eq!(payment.currency, Currency::Irr);
        assert_eq!(payment.duration_secs, 3600);
    }

    #[tokio::test]
    async fn create_requires_user_or_wallet_and_non_negative_amount() {
        let svc = service(MockGateway::new(), MockAccounting::new()).await;
        let mut anonymous = input(dec!(10));
        anonymous.user_id = None;
        anonymous.wallet_id = None;
        assert_matches!(
            svc.create("t1", anonymous).await,
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            svc.create("t1", input(dec!(-1))).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn start_opens_attempt_on_first_gateway() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_purchase()
            .withf(|_, gw, req| gw == "zarinpal" && req.callback_url.ends_with("/verify"))
            .times(1)
            .returning(|_, _, _| Ok(purchase("att-1", PaymentStatus::Init)));
        gateway
            .expect_start_url()
            .returning(|gw, id| format!("https://core.example.com/api/{}/v1/payments/{}/start", gw, id));
        let svc = service(gateway, MockAccounting::new()).await;
        let payment = svc.create("t1", input(dec!(100))).await.unwrap();

        let outcome = svc
            .start("t1", payment.id, None, StartPaymentInput::default())
            .await
            .unwrap();
        assert!(outcome.redirect_url.ends_with("/att-1/start"));

        let stored = svc.get("t1", payment.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(stored.tries.contains_key("att-1"));
    }

    #[tokio::test]
    async fn zero_amount_start_goes_straight_to_verify() {
        let svc = service(MockGateway::new(), MockAccounting::new()).await;
        let payment = svc.create("t1", input(dec!(0))).await.unwrap();

        let outcome = svc
            .start("t1", payment.id, None, StartPaymentInput::default())
            .await
            .unwrap();
        assert_eq!(outcome.redirect_url, svc.verify_url(payment.id));

        let verified = svc.verify("t1", payment.id).await.unwrap();
        assert_eq!(verified.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn overdue_start_fails_the_payment() {
        let svc = service(MockGateway::new(), MockAccounting::new()).await;
        let mut overdue = input(dec!(10));
        overdue.duration_secs = Some(1);
        let mut payment = svc.create("t1", overdue).await.unwrap();
        payment.created_at = Utc::now() - chrono::Duration::seconds(5);
        svc.payments.save(&payment).await.unwrap();

        assert_matches!(
            svc.start("t1", payment.id, None, StartPaymentInput::default()).await,
            Err(ServiceError::PaymentOverdue)
        );
        assert_eq!(
            svc.get("t1", payment.id).await.unwrap().status,
            PaymentStatus::Failed
        );
        assert_matches!(
            svc.start("t1", payment.id, None, StartPaymentInput::default()).await,
            Err(ServiceError::PaymentOverdue)
        );
    }

    #[tokio::test]
    async fn closed_payment_cannot_start() {
        let svc = service(MockGateway::new(), MockAccounting::new()).await;
        let payment = svc.create("t1", input(dec!(10))).await.unwrap();
        svc.fail("t1", payment.id, "cancelled by user").await.unwrap();

        assert_matches!(
            svc.start("t1", payment.id, None, StartPaymentInput::default()).await,
            Err(ServiceError::InvalidPayment(_))
        );
    }

    #[tokio::test]
    async fn verify_isolates_attempt_errors_and_promotes_on_success() {
        let mut gateway = MockGateway::new();
        let mut seq = 0;
        gateway.expect_create_purchase().times(2).returning(move |_, _, _| {
            seq += 1;
            Ok(purchase(&format!("att-{}", seq), PaymentStatus::Init))
        });
        gateway.expect_start_url().returning(|_, id| id.to_string());
        gateway
            .expect_purchase_status()
            .returning(|_, _, id| match id {
                "att-1" => Err(ServiceError::ExternalServiceError("timeout".into())),
                _ => Ok(purchase(id, PaymentStatus::Success)),
            });
        let svc = service(gateway, MockAccounting::new()).await;
        let payment = svc.create("t1", input(dec!(10))).await.unwrap();
        svc.start("t1", payment.id, None, StartPaymentInput::default())
            .await
            .unwrap();
        svc.start("t1", payment.id, None, StartPaymentInput::default())
            .await
            .unwrap();

        let verified = svc.verify("t1", payment.id).await.unwrap();
        assert_eq!(verified.status, PaymentStatus::Success);
        assert_eq!(verified.tries["att-1"].status, PaymentStatus::Init);
        assert_eq!(verified.tries["att-2"].status, PaymentStatus::Success);

        // fail never downgrades a success
        let after = svc.fail("t1", payment.id, "late").await.unwrap();
        assert_eq!(after.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn create_rejects_window_beyond_a_year() {
        let svc = service(MockGateway::new(), MockAccounting::new()).await;
        let mut endless = input(dec!(10));
        endless.duration_secs = Some(i64::MAX);
        assert_matches!(
            svc.create("t1", endless).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn late_failed_attempt_does_not_undo_success() {
        let mut gateway = MockGateway::new();
        let mut seq = 0;
        gateway.expect_create_purchase().times(2).returning(move |_, _, _| {
            seq += 1;
            Ok(purchase(&format!("att-{}", seq), PaymentStatus::Init))
        });
        gateway.expect_start_url().returning(|_, id| id.to_string());
        let mut second_polls = 0;
        gateway
            .expect_purchase_status()
            .returning(move |_, _, id| match id {
                "att-1" => Ok(purchase(id, PaymentStatus::Success)),
                _ => {
                    second_polls += 1;
                    let status = if second_polls == 1 {
                        PaymentStatus::Pending
                    } else {
                        PaymentStatus::Failed
                    };
                    Ok(purchase(id, status))
                }
            });
        let svc = service(gateway, MockAccounting::new()).await;
        let payment = svc.create("t1", input(dec!(10))).await.unwrap();
        for _ in 0..2 {
            svc.start("t1", payment.id, None, StartPaymentInput::default())
                .await
                .unwrap();
        }

        let first = svc.verify("t1", payment.id).await.unwrap();
        assert_eq!(first.status, PaymentStatus::Success);
        assert_eq!(first.tries["att-2"].status, PaymentStatus::Pending);

        // past the window, so a failed attempt would fail an open payment
        let mut stored = svc.get("t1", payment.id).await.unwrap();
        stored.created_at = Utc::now() - chrono::Duration::hours(2);
        svc.payments.save(&stored).await.unwrap();

        let second = svc.verify("t1", payment.id).await.unwrap();
        assert_eq!(second.status, PaymentStatus::Success);
        assert_eq!(second.tries["att-2"].status, PaymentStatus::Failed);
        assert!(second.tries["att-2"].verified_at.is_some());
        assert!(second.failure_reason.is_none());
    }

    #[tokio::test]
    async fn settle_creates_one_proposal() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_purchase()
            .returning(|_, _, _| Ok(purchase("att-1", PaymentStatus::Init)));
        gateway.expect_start_url().returning(|_, id| id.to_string());
        gateway
            .expect_purchase_status()
            .returning(|_, _, id| Ok(purchase(id, PaymentStatus::Success)));
        let mut accounting = MockAccounting::new();
        accounting
            .expect_get_wallet()
            .returning(|_, _| Ok(wallet(dec!(500))));
        accounting
            .expect_create_proposal()
            .withf(|_, req| {
                req.participants[0].wallet_id == "payer-wallet"
                    && req.participants[1].wallet_id == "tenant-wallet"
                    && req.amount == dec!(100)
            })
            .times(1)
            .returning(|_, _| {
                Ok(Proposal {
                    id: "prop-1".into(),
                    status: None,
                })
            });
        let svc = service(gateway, accounting).await;
        let payment = svc.create("t1", input(dec!(100))).await.unwrap();
        svc.start("t1", payment.id, None, StartPaymentInput::default())
            .await
            .unwrap();

        let settled = svc.settle("t1", payment.id).await.unwrap();
        assert_eq!(settled.proposal_id.as_deref(), Some("prop-1"));
        let again = svc.settle("t1", payment.id).await.unwrap();
        assert_eq!(again.proposal_id.as_deref(), Some("prop-1"));
    }

    #[tokio::test]
    async fn settle_blocks_on_insufficient_funds() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_purchase()
            .returning(|_, _, _| Ok(purchase("att-1", PaymentStatus::Init)));
        gateway.expect_start_url().returning(|_, id| id.to_string());
        gateway
            .expect_purchase_status()
            .returning(|_, _, id| Ok(purchase(id, PaymentStatus::Success)));
        let mut accounting = MockAccounting::new();
        accounting
            .expect_get_wallet()
            .returning(|_, _| Ok(wallet(dec!(40))));
        accounting.expect_create_proposal().never();
        let svc = service(gateway, accounting).await;
        let payment = svc.create("t1", input(dec!(100))).await.unwrap();
        svc.start("t1", payment.id, None, StartPaymentInput::default())
            .await
            .unwrap();

        let result = svc.settle("t1", payment.id).await;
        assert_matches!(
            result,
            Err(ServiceError::InsufficientFunds { needed, available })
                if needed == dec!(100) && available == dec!(40)
        );
        let stored = svc.get("t1", payment.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
        assert!(stored.proposal_id.is_none());
    }
}
