pub mod baskets;
pub mod common;
pub mod health;
pub mod payments;
pub mod tenants;
pub mod vouchers;

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use crate::clients::{
    AccountingClient, EnrollmentClient, HttpAccountingClient, HttpEnrollmentClient,
    HttpPaymentGateway, HttpProductCatalog, PaymentGateway, ProductCatalog,
};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::repositories::{
    BasketRepository, InMemoryBasketRepository, InMemoryPaymentRepository,
    InMemoryTenantRepository, InMemoryVoucherRepository, PaymentRepository,
    SeaOrmBasketRepository, SeaOrmPaymentRepository, SeaOrmTenantRepository,
    SeaOrmVoucherRepository, TenantRepository, VoucherRepository,
};
use crate::services::{
    baskets::BasketService, checkout::CheckoutService, payments::PaymentService,
    tenants::TenantService, vouchers::VoucherService,
};
use crate::webhooks::{HttpItemNotifier, ItemNotifier};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Storage seams the services are built on.
#[derive(Clone)]
pub struct Repositories {
    pub baskets: Arc<dyn BasketRepository>,
    pub vouchers: Arc<dyn VoucherRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub tenants: Arc<dyn TenantRepository>,
}

impl Repositories {
    pub fn database(db: Arc<DatabaseConnection>) -> Self {
        Self {
            baskets: Arc::new(SeaOrmBasketRepository::new(db.clone())),
            vouchers: Arc::new(SeaOrmVoucherRepository::new(db.clone())),
            payments: Arc::new(SeaOrmPaymentRepository::new(db.clone())),
            tenants: Arc::new(SeaOrmTenantRepository::new(db)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            baskets: Arc::new(InMemoryBasketRepository::new()),
            vouchers: Arc::new(InMemoryVoucherRepository::new()),
            payments: Arc::new(InMemoryPaymentRepository::new()),
            tenants: Arc::new(InMemoryTenantRepository::new()),
        }
    }
}

/// External services the basket flow talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn ProductCatalog>,
    pub accounting: Arc<dyn AccountingClient>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub enrollments: Arc<dyn EnrollmentClient>,
    pub notifier: Arc<dyn ItemNotifier>,
}

impl Collaborators {
    /// HTTP clients wired from configuration.
    pub fn http(config: &AppConfig) -> Result<Self, ServiceError> {
        let timeout = config.http_timeout_secs;
        let api_key = config.service_api_key.clone();
        Ok(Self {
            catalog: Arc::new(HttpProductCatalog::new(timeout)?),
            accounting: Arc::new(HttpAccountingClient::new(
                config.accounting_base_url(),
                api_key.clone(),
                timeout,
            )?),
            gateway: Arc::new(HttpPaymentGateway::new(
                config.core_url.clone(),
                api_key.clone(),
                timeout,
            )?),
            enrollments: Arc::new(HttpEnrollmentClient::new(
                config.enrollment_endpoint(),
                api_key,
                timeout,
            )?),
            notifier: Arc::new(
                HttpItemNotifier::new(
                    config.webhook_secret.clone(),
                    config.webhook_max_retries,
                    timeout,
                )?
                .with_backoff(Duration::from_secs(1)),
            ),
        })
    }
}

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub baskets: Arc<BasketService>,
    pub vouchers: Arc<VoucherService>,
    pub payments: Arc<PaymentService>,
    pub checkout: Arc<CheckoutService>,
    pub tenants: Arc<TenantService>,
}

impl AppServices {
    pub fn new(
        repositories: Repositories,
        collaborators: Collaborators,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let vouchers = Arc::new(VoucherService::new(
            repositories.vouchers,
            event_sender.clone(),
            config.clone(),
        ));
        let baskets = Arc::new(BasketService::new(
            repositories.baskets,
            vouchers.clone(),
            collaborators.catalog.clone(),
            collaborators.notifier.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let tenants = Arc::new(TenantService::new(repositories.tenants.clone()));
        let payments = Arc::new(PaymentService::new(
            repositories.payments,
            repositories.tenants,
            collaborators.gateway,
            collaborators.accounting.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            baskets.clone(),
            payments.clone(),
            collaborators.catalog,
            collaborators.accounting,
            collaborators.enrollments,
            collaborators.notifier,
            event_sender,
            config,
        ));

        Self {
            baskets,
            vouchers,
            payments,
            checkout,
            tenants,
        }
    }
}
