use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercora_core::{
    CustomerId, DomainError, DomainResult, OrderId, OrderItemId, ProductId, TenantId,
};
use mercora_customers::CustomerProfile;

use crate::replacement::{ReplacementState, ReplacementStatus};
use crate::status::{OrderStatus, PricingMode};

/// An order as stored. Money columns are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    /// Unguessable tracking identifier; the only handle exposed to
    /// unauthenticated customers. Generated once, immutable.
    pub public_token: String,
    pub status: OrderStatus,
    pub pricing_mode: PricingMode,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One order line with its replacement-negotiation columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: i64,
    pub replacement: ReplacementState,
}

impl OrderItem {
    /// The product this line materially resolves to.
    pub fn effective_product(&self) -> ProductId {
        self.replacement.effective_product(self.product_id)
    }
}

/// Checkout input for order creation (public storefront or staff entry).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewOrder {
    pub customer: CustomerProfile,
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub delivery_fee: i64,
    /// Supplying a total switches the order to Manual pricing permanently.
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: i64,
}

impl NewOrder {
    pub fn validate(&self) -> DomainResult<()> {
        self.customer.validate()?;
        if self.items.is_empty() {
            return Err(DomainError::validation("order must have at least one item"));
        }
        Ok(())
    }

    pub fn pricing_lines(&self) -> Vec<(i64, i64)> {
        self.items
            .iter()
            .map(|i| (i.quantity, i.unit_price))
            .collect()
    }
}

/// 32 random bytes, hex-encoded. Never derived from the sequential id.
pub fn generate_public_token() -> String {
    let bytes: [u8; 32] = rand::random();
    let mut token = String::with_capacity(64);
    for b in bytes {
        use core::fmt::Write;
        let _ = write!(token, "{b:02x}");
    }
    token
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub id: i64,
    pub tenant_id: i64,
    pub customer_id: i64,
    pub public_token: String,
    pub status: String,
    pub pricing_mode: String,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> DomainResult<Order> {
        Ok(Order {
            id: OrderId::from_raw(row.id)?,
            tenant_id: TenantId::from_raw(row.tenant_id)?,
            customer_id: CustomerId::from_raw(row.customer_id)?,
            public_token: row.public_token,
            status: OrderStatus::parse(&row.status)?,
            pricing_mode: PricingMode::parse(&row.pricing_mode)?,
            subtotal: row.subtotal,
            delivery_fee: row.delivery_fee,
            total: row.total,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: i64,
    pub pending_replacement_product_id: Option<i64>,
    pub replaced_by_product_id: Option<i64>,
    pub replacement_decision_status: String,
    pub replacement_decision_reason: Option<String>,
    pub replacement_decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = DomainError;

    fn try_from(row: OrderItemRow) -> DomainResult<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::from_raw(row.id)?,
            order_id: OrderId::from_raw(row.order_id)?,
            product_id: ProductId::from_raw(row.product_id)?,
            quantity: row.quantity,
            unit_price: row.unit_price,
            replacement: ReplacementState {
                status: ReplacementStatus::parse(&row.replacement_decision_status)?,
                candidate: row
                    .pending_replacement_product_id
                    .map(ProductId::from_raw)
                    .transpose()?,
                replaced_by: row
                    .replaced_by_product_id
                    .map(ProductId::from_raw)
                    .transpose()?,
                decision_reason: row.replacement_decision_reason,
                decided_at: row.replacement_decided_at,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_tokens_are_long_hex_and_unique() {
        let a = generate_public_token();
        let b = generate_public_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn new_order_requires_items_and_valid_customer() {
        let order = NewOrder {
            customer: CustomerProfile {
                phone: "+15550001".into(),
                name: "Ada".into(),
                address: None,
            },
            items: vec![],
            delivery_fee: 0,
            total: None,
        };
        assert!(order.validate().is_err());

        let order = NewOrder {
            items: vec![NewOrderItem {
                product_id: ProductId::from_raw(1).unwrap(),
                quantity: 2,
                unit_price: 100,
            }],
            ..order
        };
        assert!(order.validate().is_ok());
        assert_eq!(order.pricing_lines(), vec![(2, 100)]);
    }

    #[test]
    fn effective_product_follows_replacement_state() {
        let original = ProductId::from_raw(1).unwrap();
        let candidate = ProductId::from_raw(9).unwrap();

        let mut item = OrderItem {
            id: OrderItemId::from_raw(1).unwrap(),
            order_id: OrderId::from_raw(1).unwrap(),
            product_id: original,
            quantity: 1,
            unit_price: 100,
            replacement: ReplacementState::none(),
        };
        assert_eq!(item.effective_product(), original);

        item.replacement = item.replacement.propose(candidate).unwrap();
        assert_eq!(item.effective_product(), original, "pending is not effective");

        item.replacement = item
            .replacement
            .approve(OrderStatus::Draft, Utc::now())
            .unwrap();
        assert_eq!(item.effective_product(), candidate);
    }
}
