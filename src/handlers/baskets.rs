use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::common::{
    callback_redirect, created_response, error_redirect, page_of, paginated_response,
    redirect_response, success_response, RedirectBody,
};
use crate::auth::RequestUser;
use crate::common::ListQuery;
use crate::errors::ServiceError;
use crate::models::{BasketItemChange, BasketStatus, PaymentStatus};
use crate::repositories::BasketFilter;
use crate::services::baskets::{AddItemInput, CreateBasketInput, UpdateBasketInput};
use crate::AppState;

pub fn basket_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_baskets).post(create_basket))
        .route("/items", post(add_item_to_active))
        .route(
            "/:id",
            get(get_basket).patch(update_basket).delete(cancel_basket),
        )
        .route("/:id/items", post(add_item))
        .route(
            "/:id/items/:item_id",
            patch(update_item).delete(delete_item),
        )
        .route("/:id/checkout", get(checkout_redirect).post(checkout))
        .route("/:id/validate", get(validate_redirect).post(validate))
}

#[derive(Debug, Default, Deserialize)]
pub struct BasketQuery {
    pub user_id: Option<String>,
    pub status: Option<BasketStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub callback_url: Option<String>,
}

async fn list_baskets(
    State(state): State<AppState>,
    user: RequestUser,
    Query(list): Query<ListQuery>,
    Query(query): Query<BasketQuery>,
) -> Result<Response, ServiceError> {
    let page = page_of(&list, &state.config);
    let filter = BasketFilter {
        user_id: query.user_id.or(user.user_id),
        status: query.status,
        created_at_from: list.created_at_from,
        created_at_to: list.created_at_to,
    };
    let (baskets, total) = state
        .services
        .baskets
        .list(&user.tenant_id, &filter, page)
        .await?;
    let items = baskets.iter().map(|b| b.detail()).collect();
    Ok(paginated_response(items, total, page))
}

async fn create_basket(
    State(state): State<AppState>,
    user: RequestUser,
    Json(payload): Json<CreateBasketInput>,
) -> Result<Response, ServiceError> {
    let user_id = user.require_user()?;
    let basket = state
        .services
        .baskets
        .create(&user.tenant_id, user_id, payload)
        .await?;
    Ok(created_response(basket.detail()))
}

async fn get_basket(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let basket = state.services.baskets.get(&user.tenant_id, id).await?;
    Ok(success_response(basket.detail()))
}

async fn update_basket(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBasketInput>,
) -> Result<Response, ServiceError> {
    let basket = state
        .services
        .baskets
        .update(&user.tenant_id, id, payload)
        .await?;
    Ok(success_response(basket.detail()))
}

/// Baskets are never removed; deleting one cancels it.
async fn cancel_basket(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let basket = state.services.baskets.cancel(&user.tenant_id, id).await?;
    Ok(success_response(basket.detail()))
}

/// Adds to the caller's active basket, creating it on first use.
async fn add_item_to_active(
    State(state): State<AppState>,
    user: RequestUser,
    Json(payload): Json<AddItemInput>,
) -> Result<Response, ServiceError> {
    let user_id = user.require_user()?;
    let basket = state
        .services
        .baskets
        .add_item(&user.tenant_id, user_id, None, payload)
        .await?;
    Ok(success_response(basket.detail()))
}

async fn add_item(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddItemInput>,
) -> Result<Response, ServiceError> {
    let user_id = user.require_user()?;
    let basket = state
        .services
        .baskets
        .add_item(&user.tenant_id, user_id, Some(id), payload)
        .await?;
    Ok(success_response(basket.detail()))
}

async fn update_item(
    State(state): State<AppState>,
    user: RequestUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<BasketItemChange>,
) -> Result<Response, ServiceError> {
    let basket = state
        .services
        .baskets
        .update_item(&user.tenant_id, id, item_id, payload)
        .await?;
    Ok(success_response(basket.detail()))
}

async fn delete_item(
    State(state): State<AppState>,
    user: RequestUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ServiceError> {
    let basket = state
        .services
        .baskets
        .delete_item(&user.tenant_id, id, item_id)
        .await?;
    Ok(success_response(basket.detail()))
}

async fn checkout(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<CheckoutRequest>>,
) -> Result<Response, ServiceError> {
    let callback_url = payload.and_then(|Json(body)| body.callback_url);
    let redirect_url = state
        .services
        .checkout
        .checkout(&user.tenant_id, id, callback_url)
        .await?;
    Ok(success_response(RedirectBody { redirect_url }))
}

/// Browser entry point: sends the payer straight to the gateway.
async fn checkout_redirect(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
    Query(query): Query<CheckoutRequest>,
) -> Response {
    let fallback = query.callback_url.clone();
    match state
        .services
        .checkout
        .checkout(&user.tenant_id, id, query.callback_url)
        .await
    {
        Ok(url) => redirect_response(&url),
        Err(err) => {
            let callback = basket_callback(&state, &user, id).await.or(fallback);
            error_redirect(callback.as_deref(), err)
        }
    }
}

async fn validate(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let basket = state.services.checkout.validate(&user.tenant_id, id).await?;
    Ok(success_response(basket.detail()))
}

/// Where the payment verification lands; ends on the basket's callback URL with the
/// incoming query string forwarded.
async fn validate_redirect(
    State(state): State<AppState>,
    user: RequestUser,
    Path(id): Path<Uuid>,
    Query(incoming): Query<BTreeMap<String, String>>,
) -> Response {
    match state.services.checkout.validate(&user.tenant_id, id).await {
        Ok(basket) => {
            let mut own = vec![("basket_id", basket.id.to_string())];
            if let Some(payment_id) = basket.payment_id {
                own.push(("payment_id", payment_id.to_string()));
            }
            own.push(("status", PaymentStatus::Success.to_string()));

            let mut params: Vec<(&str, String)> = incoming
                .iter()
                .filter(|(key, _)| !own.iter().any(|(k, _)| *k == key.as_str()))
                .map(|(key, value)| (key.as_str(), value.clone()))
                .collect();
            params.extend(own);
            basket
                .callback_url
                .as_deref()
                .and_then(|url| callback_redirect(url, &params))
                .unwrap_or_else(|| success_response(basket.detail()))
        }
        Err(err) => {
            let callback = basket_callback(&state, &user, id).await;
            error_redirect(callback.as_deref(), err)
        }
    }
}

async fn basket_callback(state: &AppState, user: &RequestUser, id: Uuid) -> Option<String> {
    state
        .services
        .baskets
        .get(&user.tenant_id, id)
        .await
        .ok()
        .and_then(|basket| basket.callback_url)
}
