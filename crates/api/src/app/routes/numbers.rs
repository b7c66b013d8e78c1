use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use chrono::{Datelike, Utc};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new().route("/allocate", post(allocate))
}

/// Reserve the next number of a sequence. The number is consumed even if no document
/// is ever stored under it.
pub async fn allocate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::AllocateNumberRequest>,
) -> axum::response::Response {
    let document_type = match dto::parse_document_type(&body.document_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let year = body.year.unwrap_or_else(|| Utc::now().year());
    if !(1000..=9999).contains(&year) {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_year", "year must have four digits");
    }

    match services
        .documents
        .allocate_number(tenant.tenant_id(), document_type, year)
        .await
    {
        Ok(number) => (StatusCode::CREATED, Json(number)).into_response(),
        Err(e) => errors::document_error_to_response(e),
    }
}
