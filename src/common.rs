/// Common types and utilities shared across handlers and services
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
use validator::ValidationError;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^https?://(localhost|([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}|\d{1,3}(\.\d{1,3}){3}|\[[0-9a-f:]+\])(:\d{1,5})?([/?#]\S*)?$",
    )
    .expect("URL pattern is a valid regex")
});

/// Returns true for absolute http(s) URLs with a host.
pub fn is_valid_url(value: &str) -> bool {
    if !URL_PATTERN.is_match(value) {
        return false;
    }
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Merges `params` into the query string of `url`, replacing keys that already exist.
pub fn add_query_params<K, V>(url: &str, params: &[(K, V)]) -> Result<String, url::ParseError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut parsed = Url::parse(url)?;
    let replaced: Vec<&str> = params.iter().map(|(k, _)| k.as_ref()).collect();
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !replaced.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = parsed.query_pairs_mut();
        query.clear();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        for (k, v) in params {
            query.append_pair(k.as_ref(), v.as_ref());
        }
    }
    Ok(parsed.into())
}

/// `validator` hook for URL fields.
pub fn validate_url(value: &str) -> Result<(), ValidationError> {
    if is_valid_url(value) {
        Ok(())
    } else {
        let mut err = ValidationError::new("url");
        err.message = Some(format!("Invalid URL: {}", value).into());
        Err(err)
    }
}

/// Offset pagination with optional creation-time window.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub created_at_from: Option<DateTime<Utc>>,
    pub created_at_to: Option<DateTime<Utc>>,
}

/// Resolved pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl ListQuery {
    /// Clamps the requested limit to the configured bounds.
    pub fn page(&self, default_limit: u64, max_limit: u64) -> Page {
        let limit = self.limit.unwrap_or(default_limit).clamp(1, max_limit.max(1));
        Page {
            offset: self.offset.unwrap_or(0),
            limit,
        }
    }

    pub fn matches_created_at(&self, created_at: DateTime<Utc>) -> bool {
        self.created_at_from.map_or(true, |from| created_at >= from)
            && self.created_at_to.map_or(true, |to| created_at <= to)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: Page) -> Self {
        Self {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        }
    }
}
