use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use mercora_core::DomainError;

/// One mapping for every domain failure that reaches the HTTP boundary.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::Validation(_) | DomainError::InvalidId(_) | DomainError::TenantAmbiguous => {
            StatusCode::BAD_REQUEST
        }
        DomainError::TenantUnresolved => StatusCode::UNAUTHORIZED,
        DomainError::NotFound => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) | DomainError::StateConflict(_) => StatusCode::CONFLICT,
        DomainError::Unauthorized => StatusCode::FORBIDDEN,
        DomainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.kind(), err.to_string())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_stable() {
        let cases = [
            (DomainError::TenantUnresolved, StatusCode::UNAUTHORIZED),
            (DomainError::TenantAmbiguous, StatusCode::BAD_REQUEST),
            (DomainError::NotFound, StatusCode::NOT_FOUND),
            (DomainError::conflict("dup"), StatusCode::CONFLICT),
            (DomainError::state_conflict("late"), StatusCode::CONFLICT),
            (DomainError::validation("bad"), StatusCode::BAD_REQUEST),
            (DomainError::Unauthorized, StatusCode::FORBIDDEN),
            (DomainError::storage("db"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = domain_error_to_response(err);
            assert_eq!(response.status(), expected);
        }
    }
}
