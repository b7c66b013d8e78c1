use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, routing::post, Json, Router};

use crate::app::dto;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/breakdown", post(compute))
}

/// Amounts for a subtotal, without issuing anything.
pub async fn compute(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::BreakdownRequest>,
) -> axum::response::Response {
    let breakdown = services
        .documents
        .breakdown(body.subtotal, body.discount, body.vat_rate);
    Json(breakdown).into_response()
}
