//! Order lifecycle state machine and pricing rules.

use serde::{Deserialize, Serialize};

use mercora_core::{DomainError, DomainResult};

/// Order status lifecycle.
///
/// Draft → Confirmed → OutForDelivery → Completed, forward-only; Cancelled
/// (merchant) and RejectedByCustomer (customer, via the tracking surface)
/// are terminal exits available while the order is still Draft/Confirmed.
/// There is no path back to Draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Confirmed,
    OutForDelivery,
    Completed,
    Cancelled,
    RejectedByCustomer,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Confirmed => "confirmed",
            Self::OutForDelivery => "out_for_delivery",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::RejectedByCustomer => "rejected_by_customer",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "confirmed" => Ok(Self::Confirmed),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "rejected_by_customer" => Ok(Self::RejectedByCustomer),
            other => Err(DomainError::validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::RejectedByCustomer
        )
    }

    /// Line prices may only change while the order is Draft or Confirmed;
    /// once out for delivery (or terminal) they are frozen.
    pub fn allows_price_edits(&self) -> bool {
        matches!(self, Self::Draft | Self::Confirmed)
    }

    /// Window in which customer decisions (replacement approve/reject,
    /// order rejection) are accepted.
    pub fn negotiation_open(&self) -> bool {
        matches!(self, Self::Draft | Self::Confirmed)
    }

    /// Validate a merchant-initiated transition.
    pub fn transition(self, target: OrderStatus) -> DomainResult<OrderStatus> {
        use OrderStatus::*;
        let allowed = matches!(
            (self, target),
            (Draft, Confirmed)
                | (Confirmed, OutForDelivery)
                | (OutForDelivery, Completed)
                | (Draft, Cancelled)
                | (Confirmed, Cancelled)
        );
        if allowed {
            Ok(target)
        } else {
            Err(DomainError::state_conflict(format!(
                "cannot move order from {} to {}",
                self.as_str(),
                target.as_str()
            )))
        }
    }

    /// Validate the customer-initiated rejection from the public tracking
    /// surface.
    pub fn reject_by_customer(self) -> DomainResult<OrderStatus> {
        if self.negotiation_open() {
            Ok(Self::RejectedByCustomer)
        } else {
            Err(DomainError::state_conflict(format!(
                "order in status {} can no longer be rejected by the customer",
                self.as_str()
            )))
        }
    }
}

/// Auto: total computed from lines; Manual: caller-supplied total is
/// authoritative. Manual is sticky — there is no automatic reversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    Auto,
    Manual,
}

impl PricingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(DomainError::validation(format!(
                "unknown pricing mode: {other}"
            ))),
        }
    }
}

/// Computed money columns for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub mode: PricingMode,
    /// Always the line sum, even under Manual (display only there).
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
}

/// Price an order from its lines. `explicit_total` forces Manual mode and
/// is stored verbatim regardless of what the lines sum to.
pub fn price_order(
    lines: &[(i64, i64)], // (quantity, unit_price)
    delivery_fee: i64,
    explicit_total: Option<i64>,
) -> DomainResult<Pricing> {
    if delivery_fee < 0 {
        return Err(DomainError::validation("delivery_fee must not be negative"));
    }
    let mut subtotal: i64 = 0;
    for &(quantity, unit_price) in lines {
        if quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if unit_price < 0 {
            return Err(DomainError::validation("unit_price must not be negative"));
        }
        subtotal = subtotal
            .checked_add(
                quantity
                    .checked_mul(unit_price)
                    .ok_or_else(|| DomainError::validation("line total overflows"))?,
            )
            .ok_or_else(|| DomainError::validation("subtotal overflows"))?;
    }

    match explicit_total {
        Some(total) => {
            if total < 0 {
                return Err(DomainError::validation("total must not be negative"));
            }
            Ok(Pricing {
                mode: PricingMode::Manual,
                subtotal,
                delivery_fee,
                total,
            })
        }
        None => Ok(Pricing {
            mode: PricingMode::Auto,
            subtotal,
            delivery_fee,
            total: subtotal
                .checked_add(delivery_fee)
                .ok_or_else(|| DomainError::validation("total overflows"))?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for s in [
            OrderStatus::Draft,
            OrderStatus::Confirmed,
            OrderStatus::OutForDelivery,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::RejectedByCustomer,
        ] {
            assert_eq!(OrderStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(OrderStatus::parse("shipped").is_err());
    }

    #[test]
    fn happy_path_is_forward_only() {
        let s = OrderStatus::Draft;
        let s = s.transition(OrderStatus::Confirmed).unwrap();
        let s = s.transition(OrderStatus::OutForDelivery).unwrap();
        let s = s.transition(OrderStatus::Completed).unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn no_path_back_to_draft() {
        for s in [
            OrderStatus::Confirmed,
            OrderStatus::OutForDelivery,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::RejectedByCustomer,
        ] {
            assert!(s.transition(OrderStatus::Draft).is_err(), "{s:?} -> draft");
        }
    }

    #[test]
    fn cancel_only_from_draft_or_confirmed() {
        assert!(OrderStatus::Draft.transition(OrderStatus::Cancelled).is_ok());
        assert!(
            OrderStatus::Confirmed
                .transition(OrderStatus::Cancelled)
                .is_ok()
        );
        for s in [
            OrderStatus::OutForDelivery,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::RejectedByCustomer,
        ] {
            assert!(s.transition(OrderStatus::Cancelled).is_err(), "{s:?}");
        }
    }

    #[test]
    fn customer_rejection_window() {
        assert_eq!(
            OrderStatus::Draft.reject_by_customer().unwrap(),
            OrderStatus::RejectedByCustomer
        );
        assert_eq!(
            OrderStatus::Confirmed.reject_by_customer().unwrap(),
            OrderStatus::RejectedByCustomer
        );
        for s in [
            OrderStatus::OutForDelivery,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::RejectedByCustomer,
        ] {
            let err = s.reject_by_customer().unwrap_err();
            assert!(matches!(err, DomainError::StateConflict(_)), "{s:?}");
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for s in [
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::RejectedByCustomer,
        ] {
            for t in [
                OrderStatus::Draft,
                OrderStatus::Confirmed,
                OrderStatus::OutForDelivery,
                OrderStatus::Completed,
            ] {
                assert!(s.transition(t).is_err(), "{s:?} -> {t:?}");
            }
        }
    }

    #[test]
    fn price_edit_window_matches_negotiation_window() {
        for s in [OrderStatus::Draft, OrderStatus::Confirmed] {
            assert!(s.allows_price_edits());
            assert!(s.negotiation_open());
        }
        for s in [
            OrderStatus::OutForDelivery,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::RejectedByCustomer,
        ] {
            assert!(!s.allows_price_edits());
            assert!(!s.negotiation_open());
        }
    }

    #[test]
    fn auto_pricing_sums_lines_plus_delivery() {
        let p = price_order(&[(2, 100), (1, 50)], 30, None).unwrap();
        assert_eq!(p.mode, PricingMode::Auto);
        assert_eq!(p.subtotal, 250);
        assert_eq!(p.total, 280);
    }

    #[test]
    fn explicit_total_is_authoritative_and_subtotal_still_computed() {
        // Items sum to 250 but the caller says 999: Manual wins, subtotal is
        // display-only.
        let p = price_order(&[(2, 100), (1, 50)], 30, Some(999)).unwrap();
        assert_eq!(p.mode, PricingMode::Manual);
        assert_eq!(p.subtotal, 250);
        assert_eq!(p.total, 999);
    }

    #[test]
    fn invalid_lines_are_rejected() {
        assert!(price_order(&[(0, 100)], 0, None).is_err());
        assert!(price_order(&[(-1, 100)], 0, None).is_err());
        assert!(price_order(&[(1, -5)], 0, None).is_err());
        assert!(price_order(&[], -1, None).is_err());
        assert!(price_order(&[], 0, Some(-10)).is_err());
    }

    #[test]
    fn empty_order_prices_to_delivery_fee() {
        let p = price_order(&[], 40, None).unwrap();
        assert_eq!(p.subtotal, 0);
        assert_eq!(p.total, 40);
    }

    #[test]
    fn overflow_is_a_validation_error() {
        assert!(price_order(&[(i64::MAX, 2)], 0, None).is_err());
    }
}
