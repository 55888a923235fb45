//! Basket API library
//!
//! Multi-tenant baskets, vouchers and payment settlement behind an axum router.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod clients;
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod money;
pub mod repositories;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{middleware, routing::get, Router};
use chrono::{DateTime, Utc};
use http::HeaderValue;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    /// `None` when running on the in-memory store
    pub db: Option<Arc<DatabaseConnection>>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: Option<Arc<DatabaseConnection>>,
        config: Arc<config::AppConfig>,
        event_sender: Arc<events::EventSender>,
        services: handlers::AppServices,
    ) -> Self {
        Self {
            db,
            config,
            event_sender,
            services,
            started_at: Utc::now(),
        }
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::health::api_status))
        .route("/health", get(handlers::health::health_check))
        .nest("/baskets", handlers::baskets::basket_routes())
        .nest("/vouchers", handlers::vouchers::voucher_routes())
        .nest("/payments", handlers::payments::payment_routes())
        .nest("/tenants", handlers::tenants::tenant_routes())
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Mounts the API under the configured base path with the HTTP layers applied.
pub fn build_router(state: AppState) -> Router {
    let base_path = state.config.base_path.trim_end_matches('/').to_string();
    let api = if base_path.is_empty() {
        api_v1_routes()
    } else {
        Router::new().nest(&base_path, api_v1_routes())
    };

    let timeout = Duration::from_secs(state.config.http_timeout_secs.saturating_mul(3).max(1));
    api.layer(crate::tracing::http_trace_layer())
        .layer(middleware::from_fn(crate::tracing::request_id_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
