#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use basket_api::{
    clients::{
        AccountingClient, Enrollment, EnrollmentClient, EnrollmentRequest, GatewayPurchase,
        GatewayPurchaseRequest, PaymentGateway, ProductCatalog, ProductDetail, Proposal,
        ProposalRequest, Wallet, WalletBalance,
    },
    config::AppConfig,
    errors::ServiceError,
    events::{self, EventSender},
    handlers::{AppServices, Collaborators, Repositories},
    models::{BasketItem, PaymentStatus, Tenant},
    repositories::TenantRepository,
    webhooks::{ItemNotification, ItemNotifier},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const TENANT: &str = "shop";
pub const USER: &str = "user-1";
pub const BASE: &str = "/api/v1/apps/basket";

/// Catalog serving products registered by the test.
#[derive(Default)]
pub struct FakeCatalog {
    pub products: Mutex<HashMap<String, ProductDetail>>,
    /// Validation answer per product URL; missing means valid
    pub valid: Mutex<HashMap<String, bool>>,
}

#[async_trait]
impl ProductCatalog for FakeCatalog {
    async fn get_product(&self, product_url: &str) -> Result<ProductDetail, ServiceError> {
        self.products
            .lock()
            .unwrap()
            .get(product_url)
            .cloned()
            .ok_or_else(|| ServiceError::ExternalServiceError(format!("no product {}", product_url)))
    }

    async fn validate_item(&self, item: &BasketItem) -> Result<bool, ServiceError> {
        Ok(*self
            .valid
            .lock()
            .unwrap()
            .get(&item.product_url)
            .unwrap_or(&true))
    }
}

pub struct FakeAccounting {
    pub available: Mutex<Decimal>,
    pub proposals: Mutex<Vec<ProposalRequest>>,
}

impl FakeAccounting {
    fn wallet(&self, id: &str) -> Wallet {
        let available = *self.available.lock().unwrap();
        let mut balance = HashMap::new();
        balance.insert(
            "IRR".to_string(),
            WalletBalance {
                available,
                total: available,
            },
        );
        Wallet {
            id: id.to_string(),
            user_id: Some(USER.to_string()),
            is_default: true,
            balance,
        }
    }
}

#[async_trait]
impl AccountingClient for FakeAccounting {
    async fn get_wallet(&self, _tenant_id: &str, wallet_id: &str) -> Result<Wallet, ServiceError> {
        Ok(self.wallet(wallet_id))
    }

    async fn user_wallets(&self, _tenant_id: &str, _user_id: &str) -> Result<Vec<Wallet>, ServiceError> {
        Ok(vec![self.wallet("user-wallet")])
    }

    async fn create_wallet(&self, _tenant_id: &str, _user_id: &str) -> Result<Wallet, ServiceError> {
        Ok(self.wallet("user-wallet"))
    }

    async fn create_proposal(
        &self,
        _tenant_id: &str,
        request: &ProposalRequest,
    ) -> Result<Proposal, ServiceError> {
        let mut proposals = self.proposals.lock().unwrap();
        proposals.push(request.clone());
        Ok(Proposal {
            id: format!("prop-{}", proposals.len()),
            status: Some("init".into()),
        })
    }
}

/// Gateway whose attempts report whatever status the test sets.
pub struct FakeGateway {
    pub status: Mutex<PaymentStatus>,
    pub purchases: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_purchase(
        &self,
        _tenant_id: &str,
        _gateway: &str,
        _request: &GatewayPurchaseRequest,
    ) -> Result<GatewayPurchase, ServiceError> {
        let n = self.purchases.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayPurchase {
            id: format!("att-{}", n),
            status: PaymentStatus::Init,
            failure_reason: None,
        })
    }

    async fn purchase_status(
        &self,
        _tenant_id: &str,
        _gateway: &str,
        attempt_id: &str,
    ) -> Result<GatewayPurchase, ServiceError> {
        Ok(GatewayPurchase {
            id: attempt_id.to_string(),
            status: *self.status.lock().unwrap(),
            failure_reason: None,
        })
    }

    fn start_url(&self, gateway: &str, attempt_id: &str) -> String {
        format!("https://pay.example.com/{}/{}/start", gateway, attempt_id)
    }
}

#[derive(Default)]
pub struct FakeEnrollments {
    pub created: Mutex<Vec<EnrollmentRequest>>,
}

#[async_trait]
impl EnrollmentClient for FakeEnrollments {
    async fn create_enrollment(
        &self,
        _tenant_id: &str,
        request: &EnrollmentRequest,
    ) -> Result<Enrollment, ServiceError> {
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        Ok(Enrollment {
            id: format!("enr-{}", created.len()),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<ItemNotification>>,
}

impl ItemNotifier for RecordingNotifier {
    fn dispatch(&self, notification: ItemNotification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

/// Router on in-memory storage with fake collaborators and one seeded tenant.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub catalog: Arc<FakeCatalog>,
    pub accounting: Arc<FakeAccounting>,
    pub gateway: Arc<FakeGateway>,
    pub enrollments: Arc<FakeEnrollments>,
    pub notifier: Arc<RecordingNotifier>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "https://core.example.com".to_string(),
            "test".to_string(),
        );
        cfg.storage_backend = "memory".to_string();
        let cfg = Arc::new(cfg);

        let repositories = Repositories::in_memory();
        let mut tenant = Tenant::new(TENANT, "Test shop");
        tenant.gateways = vec!["zarinpal".to_string()];
        tenant.wallet_id = Some("tenant-wallet".to_string());
        repositories.tenants.save(&tenant).await.expect("seed tenant");

        let catalog = Arc::new(FakeCatalog::default());
        let accounting = Arc::new(FakeAccounting {
            available: Mutex::new(Decimal::from(1_000_000)),
            proposals: Mutex::new(Vec::new()),
        });
        let gateway = Arc::new(FakeGateway {
            status: Mutex::new(PaymentStatus::Pending),
            purchases: AtomicUsize::new(0),
        });
        let enrollments = Arc::new(FakeEnrollments::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let collaborators = Collaborators {
            catalog: catalog.clone(),
            accounting: accounting.clone(),
            gateway: gateway.clone(),
            enrollments: enrollments.clone(),
            notifier: notifier.clone(),
        };

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(repositories, collaborators, event_sender.clone(), cfg.clone());
        let state = AppState::new(None, cfg, event_sender, services);
        let router = basket_api::build_router(state.clone());

        Self {
            router,
            state,
            catalog,
            accounting,
            gateway,
            enrollments,
            notifier,
            _event_task: event_task,
        }
    }

    pub fn add_product(&self, url: &str, product: Value) {
        let product: ProductDetail = serde_json::from_value(product).expect("valid product");
        self.catalog
            .products
            .lock()
            .unwrap()
            .insert(url.to_string(), product);
    }

    pub fn set_gateway_status(&self, status: PaymentStatus) {
        *self.gateway.status.lock().unwrap() = status;
    }

    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> TestResponse {
        self.request_with_headers(method, path, body, &[("x-tenant-id", TENANT), ("x-user-id", USER)])
            .await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("{}{}", BASE, path));
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Follows a redirect that points back into this service.
    pub async fn follow(&self, location: &str) -> TestResponse {
        let path = location
            .strip_prefix(&format!("https://core.example.com{}", BASE))
            .expect("redirect stays inside the service");
        self.request(Method::GET, path, None).await
    }
}
