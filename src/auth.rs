//! Identity forwarded by the upstream auth gateway.
//!
//! Authentication happens before requests reach this service; handlers only read the
//! tenant and user headers the gateway injects.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::errors::ServiceError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const PHONE_HEADER: &str = "x-user-phone";

/// Caller identity for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUser {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub phone: Option<String>,
}

impl RequestUser {
    /// The user id, for routes that act on behalf of a user.
    pub fn require_user(&self) -> Result<&str, ServiceError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| ServiceError::Unauthorized(format!("Missing {} header", USER_HEADER)))
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header(parts, TENANT_HEADER).ok_or_else(|| {
            ServiceError::Unauthorized(format!("Missing {} header", TENANT_HEADER))
        })?;
        Ok(Self {
            tenant_id,
            user_id: header(parts, USER_HEADER),
            phone: header(parts, PHONE_HEADER),
        })
    }
}
