//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: backend selection and the type-erased document service
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, DocumentApi, build_services};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: AppServices) -> Router {
    let services = Arc::new(services);

    // Tenant-scoped routes: require the tenant header.
    let scoped = routes::router().layer(
        ServiceBuilder::new()
            .layer(Extension(services))
            .layer(axum::middleware::from_fn(middleware::tenant_middleware)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(scoped)
}
