mod common;

use axum::http::{Method, StatusCode};
use basket_api::models::{BasketStatus, PaymentStatus};
use basket_api::webhooks::ItemEvent;
use common::TestApp;
use serde_json::{json, Value};

const MUG: &str = "https://shop.example.com/products/mug";
const PLAN: &str = "https://shop.example.com/products/pro";

fn seed_catalog(app: &TestApp) {
    app.add_product(
        MUG,
        json!({
            "name": "Mug",
            "unit_price": "50",
            "reserve_url": "https://shop.example.com/hooks/reserve",
            "webhook_url": "https://shop.example.com/hooks/purchased",
        }),
    );
    app.add_product(
        PLAN,
        json!({
            "name": "Pro plan",
            "unit_price": "200",
            "item_type": "saas_package",
            "plan_duration": 30,
            "bundles": [{"asset": "credits", "quota": "1000"}],
        }),
    );
}

async fn add(app: &TestApp, product_url: &str, quantity: &str) -> Value {
    let response = app
        .request(
            Method::POST,
            "/baskets/items",
            Some(json!({"product_url": product_url, "quantity": quantity})),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    response.body
}

async fn create_voucher(app: &TestApp, body: Value) -> Value {
    let response = app.request(Method::POST, "/vouchers", Some(body)).await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    response.body
}

#[tokio::test]
async fn adding_items_builds_one_active_basket() {
    let app = TestApp::new().await;
    seed_catalog(&app);

    let first = add(&app, MUG, "1").await;
    let second = add(&app, MUG, "2").await;
    let third = add(&app, PLAN, "1").await;

    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["id"], third["id"]);
    let items = third["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["quantity"], "3");
    assert_eq!(third["subtotal"], "350");
    assert_eq!(third["status"], "active");
}

#[tokio::test]
async fn quantity_changes_remove_lines_at_zero() {
    let app = TestApp::new().await;
    seed_catalog(&app);
    let basket = add(&app, MUG, "2").await;
    let id = basket["id"].as_str().unwrap();
    let item_id = basket["items"][0]["id"].as_str().unwrap();

    let both = app
        .request(
            Method::PATCH,
            &format!("/baskets/{}/items/{}", id, item_id),
            Some(json!({"new_quantity": 1, "quantity_change": 1})),
        )
        .await;
    assert_eq!(both.status, StatusCode::BAD_REQUEST);

    let emptied = app
        .request(
            Method::PATCH,
            &format!("/baskets/{}/items/{}", id, item_id),
            Some(json!({"quantity_change": -2})),
        )
        .await;
    assert_eq!(emptied.status, StatusCode::OK);
    assert!(emptied.body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn full_checkout_round_trip_pays_the_basket() {
    let app = TestApp::new().await;
    seed_catalog(&app);
    add(&app, MUG, "2").await;
    let basket = add(&app, PLAN, "1").await;
    let id = basket["id"].as_str().unwrap().to_string();

    create_voucher(&app, json!({"code": "TENOFF", "rate": 10, "cap": "25"})).await;
    let discounted = app
        .request(
            Method::PATCH,
            &format!("/baskets/{}", id),
            Some(json!({
                "voucher": {"code": "TENOFF"},
                "callback_url": "https://shop.example.com/thanks",
            })),
        )
        .await;
    assert_eq!(discounted.status, StatusCode::OK, "{}", discounted.body);
    assert_eq!(discounted.body["discount"]["discount"], "25");
    assert_eq!(discounted.body["amount"], "275");

    let checkout = app
        .request(Method::GET, &format!("/baskets/{}/checkout", id), None)
        .await;
    assert_eq!(checkout.status, StatusCode::SEE_OTHER);
    assert_eq!(checkout.location(), "https://pay.example.com/zarinpal/att-1/start");

    let locked = app.request(Method::GET, &format!("/baskets/{}", id), None).await;
    assert_eq!(locked.body["status"], "locked");
    let payment_id = locked.body["payment_id"].as_str().unwrap().to_string();

    let payment = app
        .request(Method::GET, &format!("/payments/{}", payment_id), None)
        .await;
    assert_eq!(payment.body["amount"], "275");
    assert_eq!(payment.body["status"], "PENDING");
    assert_eq!(payment.body["gateways"], json!(["zarinpal"]));

    // gateway reports success and sends the payer back
    app.set_gateway_status(PaymentStatus::Success);
    let verified = app
        .request(Method::GET, &format!("/payments/{}/verify", payment_id), None)
        .await;
    assert_eq!(verified.status, StatusCode::SEE_OTHER);
    assert!(verified.location().contains(&format!("/baskets/{}/validate", id)));
    assert!(verified.location().contains("status=SUCCESS"));

    let validated = app
        .follow(&format!("{}&ref=newsletter", verified.location()))
        .await;
    assert_eq!(validated.status, StatusCode::SEE_OTHER);
    assert_eq!(
        validated.location(),
        format!(
            "https://shop.example.com/thanks?ref=newsletter&basket_id={}&payment_id={}&status=SUCCESS",
            id, payment_id
        )
    );

    let paid = app.request(Method::GET, &format!("/baskets/{}", id), None).await;
    assert_eq!(paid.body["status"], "paid");
    assert!(paid.body["checkout_at"].is_string());

    let proposals = app.accounting.proposals.lock().unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].participants[0].wallet_id, "user-wallet");
    assert_eq!(proposals[0].participants[1].wallet_id, "tenant-wallet");
    drop(proposals);

    let enrolled = app.enrollments.created.lock().unwrap();
    assert_eq!(enrolled.len(), 1);
    assert_eq!(enrolled[0].duration, Some(30));
    drop(enrolled);

    let events: Vec<ItemEvent> = app
        .notifier
        .sent
        .lock()
        .unwrap()
        .iter()
        .map(|n| n.event)
        .collect();
    assert_eq!(events, vec![ItemEvent::Reserved, ItemEvent::Purchased]);

    let voucher = app.request(Method::GET, "/vouchers/TENOFF", None).await;
    assert_eq!(voucher.body["redeemed"], 1);
}

#[tokio::test]
async fn validate_before_payment_redirects_with_error() {
    let app = TestApp::new().await;
    seed_catalog(&app);
    let basket = add(&app, MUG, "1").await;
    let id = basket["id"].as_str().unwrap();
    app.request(
        Method::PATCH,
        &format!("/baskets/{}", id),
        Some(json!({"callback_url": "https://shop.example.com/thanks"})),
    )
    .await;
    app.request(Method::POST, &format!("/baskets/{}/checkout", id), None)
        .await;

    let response = app
        .request(Method::GET, &format!("/baskets/{}/validate", id), None)
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert!(response.location().contains("status=error"));
    assert!(response.location().contains("error=payment_not_successful"));

    let still_locked = app.request(Method::GET, &format!("/baskets/{}", id), None).await;
    assert_eq!(still_locked.body["status"], "locked");
}

#[tokio::test]
async fn cancelling_releases_voucher_and_items() {
    let app = TestApp::new().await;
    seed_catalog(&app);
    let basket = add(&app, MUG, "1").await;
    let id = basket["id"].as_str().unwrap();
    create_voucher(&app, json!({"code": "ONCE", "rate": 50, "max_uses": 1})).await;

    app.request(
        Method::PATCH,
        &format!("/baskets/{}", id),
        Some(json!({"voucher": {"code": "ONCE"}})),
    )
    .await;
    let used = app.request(Method::GET, "/vouchers/ONCE", None).await;
    assert_eq!(used.body["status"], "used");

    let cancelled = app
        .request(Method::DELETE, &format!("/baskets/{}", id), None)
        .await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.body["status"], "cancelled");

    let released = app.request(Method::GET, "/vouchers/ONCE", None).await;
    assert_eq!(released.body["redeemed"], 0);
    assert_eq!(released.body["status"], "active");

    let events: Vec<ItemEvent> = app.notifier.sent.lock().unwrap().iter().map(|n| n.event).collect();
    assert_eq!(events, vec![ItemEvent::Released]);

    let mutation = app
        .request(
            Method::POST,
            &format!("/baskets/{}/items", id),
            Some(json!({"product_url": MUG})),
        )
        .await;
    assert_eq!(mutation.status, StatusCode::CONFLICT);
    assert_eq!(mutation.body["code"], "invalid_state");
}

#[tokio::test]
async fn insufficient_funds_block_settlement() {
    let app = TestApp::new().await;
    seed_catalog(&app);
    let basket = add(&app, MUG, "1").await;
    let id = basket["id"].as_str().unwrap();
    app.request(Method::POST, &format!("/baskets/{}/checkout", id), None)
        .await;

    *app.accounting.available.lock().unwrap() = rust_decimal::Decimal::from(10);
    app.set_gateway_status(PaymentStatus::Success);
    let response = app
        .request(Method::POST, &format!("/baskets/{}/validate", id), None)
        .await;
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(response.body["code"], "insufficient_funds");

    let basket = app
        .state
        .services
        .baskets
        .get(common::TENANT, id.parse().unwrap())
        .await
        .unwrap();
    assert_eq!(basket.status, BasketStatus::Locked);
}

#[tokio::test]
async fn checkout_without_gateway_keeps_basket_active() {
    let app = TestApp::new().await;
    seed_catalog(&app);
    let headers = [("x-tenant-id", "ghost"), ("x-user-id", common::USER)];

    let created = app
        .request_with_headers(
            Method::POST,
            "/baskets/items",
            Some(json!({"product_url": MUG, "quantity": "1"})),
            &headers,
        )
        .await;
    assert_eq!(created.status, StatusCode::OK, "{}", created.body);
    let id = created.body["id"].as_str().unwrap().to_string();

    let checkout = app
        .request_with_headers(Method::POST, &format!("/baskets/{}/checkout", id), None, &headers)
        .await;
    assert_eq!(checkout.status, StatusCode::BAD_REQUEST, "{}", checkout.body);

    let basket = app
        .request_with_headers(Method::GET, &format!("/baskets/{}", id), None, &headers)
        .await;
    assert_eq!(basket.body["status"], "active");
    assert!(basket.body["payment_id"].is_null());
    assert!(app.notifier.sent.lock().unwrap().is_empty());

    let more = app
        .request_with_headers(
            Method::POST,
            &format!("/baskets/{}/items", id),
            Some(json!({"product_url": PLAN})),
            &headers,
        )
        .await;
    assert_eq!(more.status, StatusCode::OK, "{}", more.body);
}

#[tokio::test]
async fn oversized_quantity_is_rejected() {
    let app = TestApp::new().await;
    seed_catalog(&app);

    let response = app
        .request(
            Method::POST,
            "/baskets/items",
            Some(json!({"product_url": MUG, "quantity": "79228162514264337593543950335"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", response.body);
    assert_eq!(response.body["code"], "validation_error");
}
