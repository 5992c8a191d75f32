//! Request bodies and JSON response mapping.

use serde::Deserialize;
use serde_json::{Value, json};

use mercora_catalog::{AvailabilityRequest, Product};
use mercora_customers::Customer;
use mercora_orders::{Order, OrderItem};

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct LinePriceRequest {
    pub unit_price: i64,
}

#[derive(Debug, Deserialize)]
pub struct ManualTotalRequest {
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProposeReplacementRequest {
    pub product_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RejectReplacementRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequestBody {
    pub product_id: i64,
    pub visitor_id: String,
}

pub fn order_to_json(order: &Order, items: &[OrderItem]) -> Value {
    json!({
        "id": order.id.as_i64(),
        "public_token": order.public_token,
        "status": order.status.as_str(),
        "pricing_mode": order.pricing_mode.as_str(),
        "subtotal": order.subtotal,
        "delivery_fee": order.delivery_fee,
        "total": order.total,
        "created_at": order.created_at,
        "updated_at": order.updated_at,
        "items": items.iter().map(item_to_json).collect::<Vec<_>>(),
    })
}

pub fn item_to_json(item: &OrderItem) -> Value {
    json!({
        "id": item.id.as_i64(),
        "product_id": item.product_id.as_i64(),
        "effective_product_id": item.effective_product().as_i64(),
        "quantity": item.quantity,
        "unit_price": item.unit_price,
        "replacement": {
            "status": item.replacement.status.as_str(),
            "candidate_product_id": item.replacement.candidate.map(|p| p.as_i64()),
            "replaced_by_product_id": item.replacement.replaced_by.map(|p| p.as_i64()),
            "decision_reason": item.replacement.decision_reason,
            "decided_at": item.replacement.decided_at,
        },
    })
}

pub fn product_to_json(product: &Product) -> Value {
    json!({
        "id": product.id.as_i64(),
        "name": product.name,
        "unit_price": product.unit_price,
        "available": product.available,
    })
}

pub fn customer_to_json(customer: &Customer) -> Value {
    json!({
        "id": customer.id.as_i64(),
        "code": customer.code.as_i64(),
        "phone": customer.phone,
        "name": customer.name,
        "address": customer.address,
    })
}

pub fn availability_to_json(request: &AvailabilityRequest, already_requested: bool) -> Value {
    json!({
        "id": request.id,
        "product_id": request.product_id.as_i64(),
        "requested_on": request.requested_on,
        "already_requested": already_requested,
    })
}
