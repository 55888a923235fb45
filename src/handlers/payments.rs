use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::common::{
    callback_redirect, created_response, error_redirect, page_of, paginated_response,
    redirect_response, success_response,
};
use crate::auth::RequestUser;
use crate::common::ListQuery;
use crate::errors::ServiceError;
use crate::models::{Payment, PaymentStatus};
use crate::repositories::PaymentFilter;
use crate::services::payments::{CreatePaymentInput, StartPaymentInput};
use crate::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments).post(create_payment))
        .route("/start", get(start_direct))
        .route("/:id", get(get_payment))
        .route("/:id/start", get(start_redirect).post(start_payment))
        .route("/:id/verify", get(verify_redirect).post(verify_payment))
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentQuery {
    pub user_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub basket_id: Option<Uuid>,
}

/// Query string of `GET /payments/start`.
#[derive(Debug, Deserialize)]
pub struct DirectStartQuery {
    pub wallet_id: Option<String>,
    pub amount: Decimal,
    pub description: String,
    pub callback_url: String,
    pub gateway: Option<String>,
}

async fn list_payments(
    State(state): State<AppState>,
    user: RequestUser,
    Query(list): Query<ListQuery>,
    Query(query): Query<PaymentQuery>,
) -> Result<Response, ServiceError> {
    let page = page_of(&list, &state.config);
    let filter = PaymentFilter {
        user_id: query.user_id,
        status: query.status,
        basket_id: query.basket_id,
        created_at_from: list.created_at_from,
        created_at_to: list.created_at_to,
    };
    let (payments, total) = state
        .services
        .payments
        .list(&user.tenant_id, &filter, page)
        .await?;
    Ok(paginated_response(payments, total, page))
}

async fn create_payment(
    State(state): State<AppState>,
    user: RequestUser,
    Json(mut payload): Json<CreatePaymentInput>,
) -> Result<Response, ServiceError> {
    if payload.user_id.is_none() {
        payload.user_id = user.user_id.clone();
    }
    let payment = state
        .services
        .payments
        .create(&user.tenant_id, payload)
        .await?;
    Ok(created_response(payment))
}

async fn get_payment(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let detail = state
        .services
        .payments
        .get_detail(&user.tenant_id, id, user.user_id.as_deref())
        .await?;
    Ok(success_response(detail))
}

fn with_caller_phone(mut input: StartPaymentInput, user: &RequestUser) -> StartPaymentInput {
    if input.phone.is_none() {
        input.phone = user.phone.clone();
    }
    input
}

async fn start_payment(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<StartPaymentInput>>,
) -> Result<Response, ServiceError> {
    let input = payload.map(|Json(body)| body).unwrap_or_default();
    let outcome = state
        .services
        .payments
        .start(
            &user.tenant_id,
            id,
            user.user_id.as_deref(),
            with_caller_phone(input, &user),
        )
        .await?;
    Ok(success_response(outcome))
}

async fn start_redirect(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
    Query(query): Query<StartPaymentInput>,
) -> Response {
    match state
        .services
        .payments
        .start(
            &user.tenant_id,
            id,
            user.user_id.as_deref(),
            with_caller_phone(query, &user),
        )
        .await
    {
        Ok(outcome) => redirect_response(&outcome.redirect_url),
        Err(err) => {
            let callback = payment_callback(&state, &user, id).await;
            error_redirect(callback.as_deref(), err)
        }
    }
}

/// Creates a payment from the query string and starts it in one step.
async fn start_direct(
    State(state): State<AppState>,
    user: RequestUser,
    Query(query): Query<DirectStartQuery>,
) -> Response {
    let callback_url = query.callback_url.clone();
    let input = CreatePaymentInput {
        user_id: user.user_id.clone(),
        wallet_id: query.wallet_id,
        basket_id: None,
        amount: query.amount,
        original_amount: None,
        currency: None,
        description: query.description,
        callback_url: query.callback_url,
        duration_secs: None,
        available_gateways: query.gateway.map(|gateway| vec![gateway]),
        accept_wallet: None,
        voucher_code: None,
        meta_data: None,
    };
    match state
        .services
        .payments
        .start_direct(&user.tenant_id, user.user_id.as_deref(), input)
        .await
    {
        Ok(outcome) => redirect_response(&outcome.redirect_url),
        Err(err) => error_redirect(
            crate::common::is_valid_url(&callback_url).then_some(callback_url.as_str()),
            err,
        ),
    }
}

async fn verify_payment(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let payment = state.services.payments.settle(&user.tenant_id, id).await?;
    Ok(success_response(payment))
}

/// Gateway return URL: settles and hands the payer back to the payment's callback.
async fn verify_redirect(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
) -> Response {
    match state.services.payments.settle(&user.tenant_id, id).await {
        Ok(payment) => outcome_redirect(&payment),
        Err(err) => {
            let callback = payment_callback(&state, &user, id).await;
            error_redirect(callback.as_deref(), err)
        }
    }
}

fn outcome_redirect(payment: &Payment) -> Response {
    let params = [
        ("payment_id", payment.id.to_string()),
        ("status", payment.status.to_string()),
    ];
    callback_redirect(&payment.callback_url, &params)
        .unwrap_or_else(|| success_response(payment))
}

async fn payment_callback(state: &AppState, user: &RequestUser, id: Uuid) -> Option<String> {
    state
        .services
        .payments
        .get(&user.tenant_id, id)
        .await
        .ok()
        .map(|payment| payment.callback_url)
}
