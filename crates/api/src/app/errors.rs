use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use compta_core::DomainError;
use compta_infra::store::StoreError;
use compta_infra::{AllocationError, DocumentError};

pub fn document_error_to_response(err: DocumentError) -> axum::response::Response {
    match err {
        DocumentError::Domain(e) => domain_error_to_response(e),
        DocumentError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "document not found"),
        DocumentError::Allocation(AllocationError::AllocationConflict { scope, attempts }) => {
            tracing::warn!(%scope, attempts, "allocation gave up under contention");
            json_error(
                StatusCode::CONFLICT,
                "allocation_conflict",
                format!("could not allocate a number for {scope}; retry the request"),
            )
        }
        DocumentError::Allocation(AllocationError::Store(e)) | DocumentError::Store(e) => {
            store_error_to_response(e)
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::DuplicateNumber(number) => json_error(
            StatusCode::CONFLICT,
            "duplicate_number",
            format!("document number {number} is already used"),
        ),
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::Storage(msg) => {
            tracing::error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", "storage failure")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
