use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use compta_infra::CreateDocument;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_document).get(list_documents))
        .route("/:id", get(get_document))
        .route("/:id/paid", post(mark_paid))
        .route("/:id/cancel", post(cancel_document))
}

pub async fn create_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateDocumentRequest>,
) -> axum::response::Response {
    let document_type = match dto::parse_document_type(&body.document_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let client_id = match dto::parse_client_id(&body.client_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let cmd = CreateDocument {
        tenant_id: tenant.tenant_id(),
        client_id,
        document_type,
        lines: body.lines,
        discount: body.discount,
        vat_rate: body.vat_rate,
    };

    match services.documents.create_document(cmd).await {
        Ok(document) => (StatusCode::CREATED, Json(document)).into_response(),
        Err(e) => errors::document_error_to_response(e),
    }
}

pub async fn list_documents(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::ListDocumentsQuery>,
) -> axum::response::Response {
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services.documents.list(tenant.tenant_id(), &filter).await {
        Ok(documents) => Json(documents).into_response(),
        Err(e) => errors::document_error_to_response(e),
    }
}

pub async fn get_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_document_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.documents.get(tenant.tenant_id(), id).await {
        Ok(document) => Json(document).into_response(),
        Err(e) => errors::document_error_to_response(e),
    }
}

pub async fn mark_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_document_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.documents.mark_paid(tenant.tenant_id(), id).await {
        Ok(document) => Json(document).into_response(),
        Err(e) => errors::document_error_to_response(e),
    }
}

/// Documents are never deleted; cancelling keeps the number accounted for.
pub async fn cancel_document(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_document_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.documents.cancel(tenant.tenant_id(), id).await {
        Ok(document) => Json(document).into_response(),
        Err(e) => errors::document_error_to_response(e),
    }
}
