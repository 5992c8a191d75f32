use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    // Storefront clients use both verbs; the response is the same listing.
    Router::new().route("/public/:slug", get(list_public).post(list_public))
}

/// Public storefront listing. The slug already resolved the tenant in the
/// wrapper; the read below is filtered by the bound transaction.
pub async fn list_public(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(_tenant): Extension<TenantContext>,
    Path(_slug): Path<String>,
) -> axum::response::Response {
    match services.catalog.list_available().await {
        Ok(products) => {
            let items = products.iter().map(dto::product_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}
