use axum::Router;

pub mod breakdown;
pub mod documents;
pub mod numbers;
pub mod system;

/// Tenant-scoped routes (the caller adds the tenant middleware).
pub fn router() -> Router {
    Router::new()
        .merge(breakdown::router())
        .nest("/numbers", numbers::router())
        .nest("/documents", documents::router())
}
