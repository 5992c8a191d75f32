use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use mercora_catalog::AvailabilityOutcome;
use mercora_core::ProductId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new().route("/public/:slug", post(create_request))
}

/// Public "tell me when it's back" request. A repeat from the same visitor
/// on the same day answers 200 instead of 201; neither is an error.
pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(_slug): Path<String>,
    Json(body): Json<dto::AvailabilityRequestBody>,
) -> axum::response::Response {
    let product_id = match ProductId::from_raw(body.product_id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .catalog
        .request_availability(tenant.tenant_id(), product_id, &body.visitor_id)
        .await
    {
        Ok(AvailabilityOutcome::Created(request)) => (
            StatusCode::CREATED,
            Json(dto::availability_to_json(&request, false)),
        )
            .into_response(),
        Ok(AvailabilityOutcome::AlreadyRequestedToday(request)) => (
            StatusCode::OK,
            Json(dto::availability_to_json(&request, true)),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
