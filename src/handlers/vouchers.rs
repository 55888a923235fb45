use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;

use super::common::{created_response, page_of, paginated_response, success_response};
use crate::auth::RequestUser;
use crate::common::ListQuery;
use crate::errors::ServiceError;
use crate::models::VoucherStatus;
use crate::repositories::VoucherFilter;
use crate::services::vouchers::{CreateVoucherInput, UpdateVoucherInput};
use crate::AppState;

pub fn voucher_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_vouchers).post(create_voucher))
        .route("/:code", get(get_voucher).patch(update_voucher))
}

#[derive(Debug, Default, Deserialize)]
pub struct VoucherQuery {
    pub status: Option<VoucherStatus>,
    pub user_id: Option<String>,
}

async fn list_vouchers(
    State(state): State<AppState>,
    user: RequestUser,
    Query(list): Query<ListQuery>,
    Query(query): Query<VoucherQuery>,
) -> Result<Response, ServiceError> {
    let page = page_of(&list, &state.config);
    let filter = VoucherFilter {
        status: query.status,
        user_id: query.user_id,
        created_at_from: list.created_at_from,
        created_at_to: list.created_at_to,
    };
    let (vouchers, total) = state
        .services
        .vouchers
        .list(&user.tenant_id, &filter, page)
        .await?;
    Ok(paginated_response(vouchers, total, page))
}

async fn create_voucher(
    State(state): State<AppState>,
    user: RequestUser,
    Json(payload): Json<CreateVoucherInput>,
) -> Result<Response, ServiceError> {
    let voucher = state
        .services
        .vouchers
        .create(&user.tenant_id, payload)
        .await?;
    Ok(created_response(voucher))
}

async fn get_voucher(
    State(state): State<AppState>,
    user: RequestUser,
    Path(code): Path<String>,
) -> Result<Response, ServiceError> {
    let voucher = state
        .services
        .vouchers
        .get_by_code(&user.tenant_id, &code)
        .await?;
    Ok(success_response(voucher))
}

async fn update_voucher(
    State(state): State<AppState>,
    user: RequestUser,
    Path(code): Path<String>,
    Json(payload): Json<UpdateVoucherInput>,
) -> Result<Response, ServiceError> {
    let voucher = state
        .services
        .vouchers
        .update(&user.tenant_id, &code, payload)
        .await?;
    Ok(success_response(voucher))
}
