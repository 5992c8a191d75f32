//! `mercora-orders` — order lifecycle, pricing, and replacement
//! negotiation.

pub mod order;
pub mod replacement;
pub mod service;
pub mod status;

pub use order::{NewOrder, NewOrderItem, Order, OrderItem};
pub use replacement::{ReplacementState, ReplacementStatus};
pub use service::{OrderService, ReplacementDecision};
pub use status::{OrderStatus, Pricing, PricingMode, price_order};
