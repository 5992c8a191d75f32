use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};

use mercora_core::{OrderItemId, ProductId};
use mercora_orders::{NewOrder, OrderStatus, ReplacementDecision};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::{ActiveTokens, Identity, TenantContext};

pub fn router() -> Router {
    Router::new()
        // Public tracking surface (token is the only credential).
        .route("/tracking", get(track_batch))
        .route("/tracking/:token", get(track_one))
        .route("/tracking/:token/reject", post(reject_order))
        .route(
            "/tracking/:token/items/:item_id/approve",
            post(approve_replacement),
        )
        .route(
            "/tracking/:token/items/:item_id/reject",
            post(reject_replacement),
        )
        // Public storefront checkout; the dynamic segment is the tenant
        // slug here (matchit requires one name per position, so it is
        // registered as `:id` like the merchant routes below).
        .route("/:id", post(create_order))
        // Merchant surface.
        .route("/:id/status", post(set_status))
        .route("/:id/total", patch(set_manual_total))
        .route("/:id/items/:item_id/price", patch(set_line_price))
        .route("/:id/items/:item_id/replacement", post(propose_replacement))
        .route(
            "/:id/items/:item_id/replacement/withdraw",
            delete(withdraw_replacement),
        )
        .route(
            "/:id/items/:item_id/replacement/reset",
            post(reset_replacement),
        )
}

/// `POST /orders/{slug}` — public checkout for the slug-resolved tenant.
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(_slug): Path<String>,
    Json(body): Json<NewOrder>,
) -> axum::response::Response {
    match services.orders.create(tenant.tenant_id(), body).await {
        Ok((order, items)) => (
            StatusCode::CREATED,
            Json(dto::order_to_json(&order, &items)),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `GET /orders/tracking/{token}` — single order by its public token.
pub async fn track_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
) -> axum::response::Response {
    match services.orders.get_by_token(&token).await {
        Ok((order, items)) => {
            (StatusCode::OK, Json(dto::order_to_json(&order, &items))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `GET /orders/tracking?token=...` — batch lookup. The wrapper already
/// narrowed the token set to the ones that resolved; anything else simply
/// does not appear in the result.
pub async fn track_batch(
    Extension(services): Extension<Arc<AppServices>>,
    tokens: Option<Extension<ActiveTokens>>,
) -> axum::response::Response {
    let tokens = tokens.map(|Extension(t)| t.0).unwrap_or_default();

    match services.orders.list_by_tokens(&tokens).await {
        Ok(results) => {
            let items = results
                .iter()
                .map(|(order, items)| dto::order_to_json(order, items))
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `POST /orders/tracking/{token}/reject` — customer rejects the order.
pub async fn reject_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
) -> axum::response::Response {
    match services.orders.reject_by_token(&token).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order, &[]))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `POST /orders/{id}/status` — merchant lifecycle transition.
pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    identity: Option<Extension<Identity>>,
    Path(id): Path<i64>,
    Json(body): Json<dto::StatusRequest>,
) -> axum::response::Response {
    if let Err(response) = authz::require_merchant(identity.as_deref(), tenant.tenant_id()) {
        return response;
    }
    let target = match OrderStatus::parse(&body.status) {
        Ok(target) => target,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.transition(id, target).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order, &[]))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `PATCH /orders/{id}/total` — merchant sets an explicit total (Manual).
pub async fn set_manual_total(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    identity: Option<Extension<Identity>>,
    Path(id): Path<i64>,
    Json(body): Json<dto::ManualTotalRequest>,
) -> axum::response::Response {
    if let Err(response) = authz::require_merchant(identity.as_deref(), tenant.tenant_id()) {
        return response;
    }

    match services.orders.set_manual_total(id, body.total).await {
        Ok(order) => (StatusCode::OK, Json(dto::order_to_json(&order, &[]))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `PATCH /orders/{id}/items/{item_id}/price` — merchant edits a line price.
pub async fn set_line_price(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    identity: Option<Extension<Identity>>,
    Path((id, item_id)): Path<(i64, i64)>,
    Json(body): Json<dto::LinePriceRequest>,
) -> axum::response::Response {
    if let Err(response) = authz::require_merchant(identity.as_deref(), tenant.tenant_id()) {
        return response;
    }
    let item_id = match OrderItemId::from_raw(item_id) {
        Ok(item_id) => item_id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .orders
        .set_line_price(id, item_id, body.unit_price)
        .await
    {
        Ok((order, item)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "order": dto::order_to_json(&order, &[]),
                "item": dto::item_to_json(&item),
            })),
        )
            .into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `POST /orders/{id}/items/{item_id}/replacement` — merchant proposes.
pub async fn propose_replacement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    identity: Option<Extension<Identity>>,
    Path((id, item_id)): Path<(i64, i64)>,
    Json(body): Json<dto::ProposeReplacementRequest>,
) -> axum::response::Response {
    if let Err(response) = authz::require_merchant(identity.as_deref(), tenant.tenant_id()) {
        return response;
    }
    let (item_id, candidate) =
        match (OrderItemId::from_raw(item_id), ProductId::from_raw(body.product_id)) {
            (Ok(item_id), Ok(candidate)) => (item_id, candidate),
            (Err(e), _) | (_, Err(e)) => return errors::domain_error_to_response(e),
        };

    match services
        .orders
        .propose_replacement(id, item_id, candidate)
        .await
    {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `DELETE /orders/{id}/items/{item_id}/replacement/withdraw`.
pub async fn withdraw_replacement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    identity: Option<Extension<Identity>>,
    Path((id, item_id)): Path<(i64, i64)>,
) -> axum::response::Response {
    if let Err(response) = authz::require_merchant(identity.as_deref(), tenant.tenant_id()) {
        return response;
    }
    let item_id = match OrderItemId::from_raw(item_id) {
        Ok(item_id) => item_id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.withdraw_replacement(id, item_id).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `POST /orders/{id}/items/{item_id}/replacement/reset` — merchant clears
/// a decided line so negotiation can start over.
pub async fn reset_replacement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    identity: Option<Extension<Identity>>,
    Path((id, item_id)): Path<(i64, i64)>,
) -> axum::response::Response {
    if let Err(response) = authz::require_merchant(identity.as_deref(), tenant.tenant_id()) {
        return response;
    }
    let item_id = match OrderItemId::from_raw(item_id) {
        Ok(item_id) => item_id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.reset_replacement(id, item_id).await {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}

/// `POST /orders/tracking/{token}/items/{item_id}/approve`.
pub async fn approve_replacement(
    Extension(services): Extension<Arc<AppServices>>,
    Path((token, item_id)): Path<(String, i64)>,
) -> axum::response::Response {
    decide(services, token, item_id, ReplacementDecision::Approve).await
}

/// `POST /orders/tracking/{token}/items/{item_id}/reject`.
pub async fn reject_replacement(
    Extension(services): Extension<Arc<AppServices>>,
    Path((token, item_id)): Path<(String, i64)>,
    body: Option<Json<dto::RejectReplacementRequest>>,
) -> axum::response::Response {
    let reason = body.and_then(|Json(b)| b.reason);
    decide(services, token, item_id, ReplacementDecision::Reject { reason }).await
}

async fn decide(
    services: Arc<AppServices>,
    token: String,
    item_id: i64,
    decision: ReplacementDecision,
) -> axum::response::Response {
    let item_id = match OrderItemId::from_raw(item_id) {
        Ok(item_id) => item_id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .orders
        .decide_replacement_by_token(&token, item_id, decision)
        .await
    {
        Ok(item) => (StatusCode::OK, Json(dto::item_to_json(&item))).into_response(),
        Err(e) => errors::domain_error_to_response(e),
    }
}
