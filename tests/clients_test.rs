use assert_matches::assert_matches;
use basket_api::clients::{
    AccountingClient, EnrollmentClient, EnrollmentRequest, GatewayPurchaseRequest,
    HttpAccountingClient, HttpEnrollmentClient, HttpPaymentGateway, HttpProductCatalog,
    PaymentGateway, ProductCatalog, ProposalRequest,
};
use basket_api::errors::ServiceError;
use basket_api::models::{ItemKind, PaymentStatus};
use basket_api::money::Currency;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn catalog_fetches_product_and_validates_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products/pro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Pro plan",
            "unit_price": "120",
            "item_type": "saas_package",
            "plan_duration": 30,
            "bundles": [{"asset": "credits", "quota": 1000}],
            "validation_url": format!("{}/validate/pro", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/validate/pro"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"price": 120, "stock_quantity": 1})),
        )
        .mount(&server)
        .await;

    let catalog = HttpProductCatalog::new(5).unwrap();
    let url = format!("{}/products/pro", server.uri());
    let product = catalog.get_product(&url).await.unwrap();
    let item = product.into_item(url, dec!(2), None, Currency::Irr);
    assert_matches!(item.kind, ItemKind::SaasPackage { plan_duration: Some(30), .. });

    // two requested, one in stock
    assert!(!catalog.validate_item(&item).await.unwrap());
}

#[tokio::test]
async fn catalog_surfaces_upstream_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let catalog = HttpProductCatalog::new(5).unwrap();
    assert_matches!(
        catalog.get_product(&format!("{}/products/x", server.uri())).await,
        Err(ServiceError::ExternalServiceError(_))
    );
}

#[tokio::test]
async fn accounting_picks_default_wallet_or_creates_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wallets"))
        .and(query_param("user_id", "u1"))
        .and(header("x-tenant-id", "t1"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"uid": "w-other", "is_default": false},
                {"uid": "w-main", "is_default": true,
                 "balance": {"IRR": {"available": "50", "total": "80"}}}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wallets"))
        .and(query_param("user_id", "u2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/wallets"))
        .and(body_partial_json(json!({"user_id": "u2"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"uid": "w-new", "is_default": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpAccountingClient::new(server.uri(), Some("secret".into()), 5).unwrap();
    let wallet = client.get_or_create_user_wallet("t1", "u1").await.unwrap();
    assert_eq!(wallet.id, "w-main");
    assert_eq!(wallet.available(Currency::Irr), dec!(50));

    let created = client.get_or_create_user_wallet("t1", "u2").await.unwrap();
    assert_eq!(created.id, "w-new");
}

#[tokio::test]
async fn accounting_maps_missing_wallet_and_posts_proposals() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wallets/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/proposals"))
        .and(body_partial_json(json!({
            "task_status": "init",
            "participants": [
                {"wallet_id": "payer", "amount": "-100"},
                {"wallet_id": "tenant", "amount": "100"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uid": "prop-9"})))
        .mount(&server)
        .await;

    let client = HttpAccountingClient::new(server.uri(), None, 5).unwrap();
    assert_matches!(
        client.get_wallet("t1", "missing").await,
        Err(ServiceError::NotFound(_))
    );

    let request = ProposalRequest::transfer("payer", "tenant", dec!(100), Currency::Irr, "basket");
    let proposal = client.create_proposal("t1", &request).await.unwrap();
    assert_eq!(proposal.id, "prop-9");
}

#[tokio::test]
async fn gateway_creates_and_polls_purchases() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/zarinpal/v1/payments"))
        .and(body_partial_json(json!({"amount": "250", "phone": "+98912"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uid": "att-7"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/zarinpal/v1/payments/att-7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"uid": "att-7", "status": "SUCCESS"})),
        )
        .mount(&server)
        .await;

    let gateway = HttpPaymentGateway::new(server.uri(), None, 5).unwrap();
    let request = GatewayPurchaseRequest {
        user_id: Some("u1".into()),
        wallet_id: Some("w1".into()),
        amount: dec!(250),
        phone: Some("+98912".into()),
        description: "basket".into(),
        callback_url: "https://core.example.com/verify".into(),
    };
    let purchase = gateway.create_purchase("t1", "zarinpal", &request).await.unwrap();
    assert_eq!(purchase.id, "att-7");
    assert_eq!(purchase.status, PaymentStatus::Init);

    let polled = gateway.purchase_status("t1", "zarinpal", "att-7").await.unwrap();
    assert_eq!(polled.status, PaymentStatus::Success);
    assert_eq!(
        gateway.start_url("zarinpal", "att-7"),
        format!("{}/api/zarinpal/v1/payments/att-7/start", server.uri())
    );
}

#[tokio::test]
async fn enrollment_client_posts_purchased_enrollment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/enrollments"))
        .and(body_partial_json(json!({"user_id": "u1", "acquisition_type": "purchased"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"uid": "enr-3"})))
        .expect(1)
        .mount(&server)
        .await;

    let client =
        HttpEnrollmentClient::new(format!("{}/enrollments", server.uri()), None, 5).unwrap();
    let request = EnrollmentRequest {
        user_id: "u1".into(),
        bundles: vec![],
        price: dec!(120),
        invoice_id: None,
        duration: Some(30),
        acquisition_type: "purchased".into(),
        variant: None,
        meta_data: None,
    };
    let enrollment = client.create_enrollment("t1", &request).await.unwrap();
    assert_eq!(enrollment.id, "enr-3");
}
