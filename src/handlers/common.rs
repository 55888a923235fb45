use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::{add_query_params, ListQuery, Page, PaginatedResponse};
use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

pub fn paginated_response<T: Serialize>(items: Vec<T>, total: u64, page: Page) -> Response {
    success_response(PaginatedResponse::new(items, total, page))
}

/// Resolves the pagination window against the configured bounds.
pub fn page_of(query: &ListQuery, config: &AppConfig) -> Page {
    query.page(config.api_default_page_size, config.api_max_page_size)
}

/// Body returned by the JSON variants of redirecting routes.
#[derive(Debug, Serialize, Deserialize)]
pub struct RedirectBody {
    pub redirect_url: String,
}

/// 303 to `url`.
pub fn redirect_response(url: &str) -> Response {
    Redirect::to(url).into_response()
}

/// Redirects back to `callback_url` with the outcome in the query string.
pub fn callback_redirect(callback_url: &str, params: &[(&str, String)]) -> Option<Response> {
    match add_query_params(callback_url, params) {
        Ok(url) => Some(redirect_response(&url)),
        Err(e) => {
            warn!(callback_url, error = %e, "unusable callback url");
            None
        }
    }
}

/// Browser-facing failure: bounce to the callback with `status=error` when there is one,
/// otherwise render the error body.
pub fn error_redirect(callback_url: Option<&str>, err: ServiceError) -> Response {
    let params = [
        ("status", "error".to_string()),
        ("error", err.error_code().to_string()),
        ("message", err.response_message()),
    ];
    callback_url
        .and_then(|url| callback_redirect(url, &params))
        .unwrap_or_else(|| err.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;

    #[test]
    fn error_redirect_carries_error_code() {
        let response = error_redirect(
            Some("https://shop.example.com/done?lang=fa"),
            ServiceError::PaymentNotSuccessful("Payment 1 is PENDING".into()),
        );
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://shop.example.com/done?lang=fa&status=error"));
        assert!(location.contains("error=payment_not_successful"));
    }

    #[test]
    fn error_without_callback_renders_json() {
        let response = error_redirect(None, ServiceError::NotFound("Basket 1 not found".into()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
