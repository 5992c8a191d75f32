use std::sync::Arc;

use axum::{
    Json, Router, extract::Extension, http::StatusCode, response::IntoResponse, routing::get,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::{Identity, TenantContext};

pub fn router() -> Router {
    Router::new().route("/", get(list_customers))
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    identity: Option<Extension<Identity>>,
) -> axum::response::Response {
    if let Err(response) = authz::require_merchant(identity.as_deref(), tenant.tenant_id()) {
        return response;
    }

    match services.customers.list().await {
        Ok(customers) => {
            let items = customers
                .iter()
                .map(dto::customer_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}
