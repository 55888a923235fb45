//! Contracts with the services this backend depends on.
//!
//! Each collaborator is a trait so the services can be driven by fakes in tests;
//! the `reqwest` implementations live in the submodules.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::ServiceError;
use crate::models::{BasketItem, Bundle, ItemKind, PaymentStatus};
use crate::money::{deserialize_amount, deserialize_optional_amount, Currency};

pub mod accounting;
pub mod catalog;
pub mod enrollment;
pub mod gateway;

pub use accounting::HttpAccountingClient;
pub use catalog::HttpProductCatalog;
pub use enrollment::HttpEnrollmentClient;
pub use gateway::HttpPaymentGateway;

/// Header carrying the service credential on calls to internal collaborators.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header naming the tenant a collaborator call acts for.
pub const TENANT_HEADER: &str = "x-tenant-id";

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ServiceError::InternalError(format!("HTTP client setup failed: {}", e)))
}

/// Fails with an upstream error naming the collaborator when the status is not 2xx.
pub(crate) async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::ExternalServiceError(format!(
        "{} responded with {}: {}",
        service, status, body
    )))
}

/// Product as published at its product URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetail {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_amount")]
    pub unit_price: Decimal,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub plan_duration: Option<i64>,
    #[serde(default)]
    pub bundles: Option<Vec<Bundle>>,
    #[serde(default)]
    pub variant: Option<String>,
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
    pub meta_data: Option<Value>,
}

impl ProductDetail {
    /// Builds a basket line from the product; the caller's quantity and currency win.
    pub fn into_item(
        self,
        product_url: String,
        quantity: Decimal,
        currency: Option<Currency>,
        fallback_currency: Currency,
    ) -> BasketItem {
        let kind = match self.item_type.as_deref() {
            Some("saas_package") => ItemKind::SaasPackage {
                plan_duration: self.plan_duration,
                bundles: self.bundles.unwrap_or_default(),
            },
            _ => ItemKind::RetailProduct,
        };
        BasketItem {
            id: uuid::Uuid::nil(),
            product_url,
            name: self.name,
            description: self.description,
            unit_price: self.unit_price,
            quantity,
            currency: currency.or(self.currency).unwrap_or(fallback_currency),
            kind,
            discount: None,
            webhook_url: self.webhook_url,
            reserve_url: self.reserve_url,
            validation_url: self.validation_url,
            revenue_share_id: self.revenue_share_id,
            tax_id: self.tax_id,
            merchant: self.merchant,
            variant: self.variant,
            meta_data: self.meta_data,
            enrollment_id: None,
        }
    }
}

/// Live price and stock reported by an item's validation URL.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductValidation {
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub stock_quantity: Option<Decimal>,
}

impl ProductValidation {
    /// The price must still match; stock, when reported, must cover the quantity.
    pub fn accepts(&self, item: &BasketItem) -> bool {
        if self.price != Some(item.unit_price) {
            return false;
        }
        self.stock_quantity
            .map_or(true, |stock| stock >= item.quantity)
    }
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, product_url: &str) -> Result<ProductDetail, ServiceError>;

    /// Checks an item against its `validation_url`; items without one are valid.
    async fn validate_item(&self, item: &BasketItem) -> Result<bool, ServiceError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    #[serde(default)]
    pub available: Decimal,
    #[serde(default)]
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    #[serde(alias = "uid")]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    /// Keyed by currency code
    #[serde(default)]
    pub balance: HashMap<String, WalletBalance>,
}

impl Wallet {
    pub fn available(&self, currency: Currency) -> Decimal {
        self.balance
            .get(&currency.to_string())
            .map(|b| b.available)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalParticipant {
    pub wallet_id: String,
    pub amount: Decimal,
}

/// Transfer request: the payer is debited, the tenant credited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    /// `init` proposals are executed right away; `draft` ones wait for approval
    pub task_status: String,
    pub participants: Vec<ProposalParticipant>,
    #[serde(default)]
    pub meta_data: Option<Value>,
}

impl ProposalRequest {
    pub fn transfer(
        from_wallet_id: impl Into<String>,
        to_wallet_id: impl Into<String>,
        amount: Decimal,
        currency: Currency,
        description: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            currency,
            description: description.into(),
            task_status: "init".to_string(),
            participants: vec![
                ProposalParticipant {
                    wallet_id: from_wallet_id.into(),
                    amount: -amount,
                },
                ProposalParticipant {
                    wallet_id: to_wallet_id.into(),
                    amount,
                },
            ],
            meta_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    #[serde(alias = "uid")]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[async_trait]
pub trait AccountingClient: Send + Sync {
    async fn get_wallet(&self, tenant_id: &str, wallet_id: &str) -> Result<Wallet, ServiceError>;

    async fn user_wallets(&self, tenant_id: &str, user_id: &str)
        -> Result<Vec<Wallet>, ServiceError>;

    async fn create_wallet(&self, tenant_id: &str, user_id: &str) -> Result<Wallet, ServiceError>;

    /// The user's default wallet, created on first use.
    async fn get_or_create_user_wallet(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Wallet, ServiceError> {
        let wallets = self.user_wallets(tenant_id, user_id).await?;
        if let Some(wallet) = wallets.into_iter().find(|w| w.is_default) {
            return Ok(wallet);
        }
        self.create_wallet(tenant_id, user_id).await
    }

    async fn create_proposal(
        &self,
        tenant_id: &str,
        request: &ProposalRequest,
    ) -> Result<Proposal, ServiceError>;
}

/// Purchase request sent to a gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPurchaseRequest {
    pub user_id: Option<String>,
    pub wallet_id: Option<String>,
    pub amount: Decimal,
    pub phone: Option<String>,
    pub description: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPurchase {
    #[serde(alias = "uid")]
    pub id: String,
    #[serde(default = "initial_status")]
    pub status: PaymentStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

fn initial_status() -> PaymentStatus {
    PaymentStatus::Init
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
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

    /// Where the payer is sent to complete an attempt.
    fn start_url(&self, gateway: &str, attempt_id: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub user_id: String,
    pub bundles: Vec<Bundle>,
    pub price: Decimal,
    pub invoice_id: Option<String>,
    /// Days
    pub duration: Option<i64>,
    pub acquisition_type: String,
    pub variant: Option<String>,
    pub meta_data: Option<Value>,
}

impl EnrollmentRequest {
    /// Enrollment for a paid SaaS line; `None` for other item kinds.
    pub fn purchased(user_id: &str, invoice_id: Option<String>, item: &BasketItem) -> Option<Self> {
        let ItemKind::SaasPackage {
            plan_duration,
            bundles,
        } = &item.kind
        else {
            return None;
        };
        Some(Self {
            user_id: user_id.to_string(),
            bundles: bundles.clone(),
            price: item.price(),
            invoice_id,
            duration: *plan_duration,
            acquisition_type: "purchased".to_string(),
            variant: item.variant.clone(),
            meta_data: item.meta_data.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(alias = "uid")]
    pub id: String,
}

#[async_trait]
pub trait EnrollmentClient: Send + Sync {
    async fn create_enrollment(
        &self,
        tenant_id: &str,
        request: &EnrollmentRequest,
    ) -> Result<Enrollment, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn detail(item_type: Option<&str>) -> ProductDetail {
        serde_json::from_value(serde_json::json!({
            "name": "Pro plan",
            "unit_price": "120000",
            "item_type": item_type,
            "plan_duration": 30,
            "bundles": [{"asset": "image", "quota": 50}],
        }))
        .unwrap()
    }

    #[test]
    fn saas_product_becomes_saas_item() {
        let item = detail(Some("saas_package")).into_item(
            "https://catalog.example.com/p/pro".into(),
            dec!(1),
            None,
            Currency::Irr,
        );
        assert!(item.is_subscription());
        assert_eq!(item.currency, Currency::Irr);
        assert_eq!(item.unit_price, dec!(120000));
    }

    #[test]
    fn unknown_item_type_defaults_to_retail() {
        let item = detail(None).into_item("u".into(), dec!(2), Some(Currency::Usd), Currency::Irr);
        assert_eq!(item.kind, ItemKind::RetailProduct);
        assert_eq!(item.currency, Currency::Usd);
        assert!(EnrollmentRequest::purchased("u1", None, &item).is_none());
    }

    #[test]
    fn validation_checks_price_then_stock() {
        let item = detail(None).into_item("u".into(), dec!(3), None, Currency::Irr);
        let check = |price, stock| ProductValidation {
            price,
            stock_quantity: stock,
        };

        assert!(check(Some(dec!(120000)), None).accepts(&item));
        assert!(check(Some(dec!(120000)), Some(dec!(3))).accepts(&item));
        assert!(!check(Some(dec!(120000)), Some(dec!(2))).accepts(&item));
        assert!(!check(Some(dec!(1)), None).accepts(&item));
        assert!(!check(None, None).accepts(&item));
    }

    #[test]
    fn proposal_debits_payer_and_credits_tenant() {
        let proposal = ProposalRequest::transfer("payer", "tenant", dec!(50), Currency::Irr, "b");
        assert_eq!(proposal.participants[0].amount, dec!(-50));
        assert_eq!(proposal.participants[1].wallet_id, "tenant");
        assert_eq!(proposal.participants[1].amount, dec!(50));
    }

    #[test]
    fn wallet_available_balance_by_currency() {
        let wallet: Wallet = serde_json::from_value(serde_json::json!({
            "uid": "w1",
            "balance": {"IRR": {"available": "100", "total": "150"}},
        }))
        .unwrap();
        assert_eq!(wallet.id, "w1");
        assert_eq!(wallet.available(Currency::Irr), dec!(100));
        assert_eq!(wallet.available(Currency::Usd), Decimal::ZERO);
    }
}
