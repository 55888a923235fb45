use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::get,
    Router,
};

use super::common::{created_response, page_of, paginated_response, success_response};
use crate::auth::RequestUser;
use crate::common::ListQuery;
use crate::errors::ServiceError;
use crate::services::tenants::CreateTenantInput;
use crate::AppState;

pub fn tenant_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tenants).post(create_tenant))
        .route("/:tenant_id", get(get_tenant))
}

async fn list_tenants(
    State(state): State<AppState>,
    _user: RequestUser,
    Query(list): Query<ListQuery>,
) -> Result<Response, ServiceError> {
    let page = page_of(&list, &state.config);
    let (tenants, total) = state.services.tenants.list(page).await?;
    Ok(paginated_response(tenants, total, page))
}

async fn create_tenant(
    State(state): State<AppState>,
    user: RequestUser,
    Json(payload): Json<CreateTenantInput>,
) -> Result<Response, ServiceError> {
    let tenant = state
        .services
        .tenants
        .create(&user.tenant_id, payload)
        .await?;
    Ok(created_response(tenant))
}

async fn get_tenant(
    State(state): State<AppState>,
    _user: RequestUser,
    Path(tenant_id): Path<String>,
) -> Result<Response, ServiceError> {
    let tenant = state.services.tenants.get(&tenant_id).await?;
    Ok(success_response(tenant))
}
