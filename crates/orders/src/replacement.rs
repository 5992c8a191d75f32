//! Replacement negotiation: per-line nested state machine.
//!
//! None → Pending → {Approved, Rejected}; a decided line returns to None
//! only through an explicit merchant reset. A line has at most one
//! materially effective outcome at a time: an unresolved candidate
//! (Pending) or an approved replacement (Approved). A Rejected line's
//! effective product is always the original.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercora_core::{DomainError, DomainResult, ProductId};

use crate::status::OrderStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

impl ReplacementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "none" => Ok(Self::None),
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown replacement status: {other}"
            ))),
        }
    }
}

/// The replacement-negotiation columns of one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementState {
    pub status: ReplacementStatus,
    /// Candidate under negotiation (Pending), or the candidate a decision
    /// was recorded against (Rejected, until reset).
    pub candidate: Option<ProductId>,
    /// The approved replacement; set only in Approved.
    pub replaced_by: Option<ProductId>,
    pub decision_reason: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ReplacementState {
    pub fn none() -> Self {
        Self {
            status: ReplacementStatus::None,
            candidate: None,
            replaced_by: None,
            decision_reason: None,
            decided_at: None,
        }
    }

    /// Merchant proposes a candidate. Allowed from None, or from Pending as
    /// a re-proposal that supersedes the previous candidate. Clears any
    /// prior decision fields.
    pub fn propose(&self, candidate: ProductId) -> DomainResult<Self> {
        match self.status {
            ReplacementStatus::None | ReplacementStatus::Pending => Ok(Self {
                status: ReplacementStatus::Pending,
                candidate: Some(candidate),
                replaced_by: None,
                decision_reason: None,
                decided_at: None,
            }),
            ReplacementStatus::Approved | ReplacementStatus::Rejected => {
                Err(DomainError::state_conflict(
                    "line already has a decision; reset it before proposing again",
                ))
            }
        }
    }

    /// Merchant withdraws the pending candidate. No decision is recorded.
    pub fn withdraw(&self) -> DomainResult<Self> {
        match self.status {
            ReplacementStatus::Pending => Ok(Self::none()),
            _ => Err(DomainError::state_conflict(
                "no pending replacement to withdraw",
            )),
        }
    }

    /// Customer approves the pending candidate; it becomes the line's
    /// effective replacement.
    pub fn approve(&self, order_status: OrderStatus, now: DateTime<Utc>) -> DomainResult<Self> {
        self.ensure_decidable(order_status)?;
        Ok(Self {
            status: ReplacementStatus::Approved,
            candidate: None,
            replaced_by: self.candidate,
            decision_reason: None,
            decided_at: Some(now),
        })
    }

    /// Customer rejects the pending candidate; the effective product stays
    /// the original. The rejected candidate remains recorded until reset.
    pub fn reject(
        &self,
        order_status: OrderStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        self.ensure_decidable(order_status)?;
        Ok(Self {
            status: ReplacementStatus::Rejected,
            candidate: self.candidate,
            replaced_by: None,
            decision_reason: reason,
            decided_at: Some(now),
        })
    }

    /// Merchant reset: silently discards the prior candidate and decision.
    pub fn reset(&self) -> DomainResult<Self> {
        match self.status {
            ReplacementStatus::Approved | ReplacementStatus::Rejected => Ok(Self::none()),
            _ => Err(DomainError::state_conflict(
                "only a decided line can be reset",
            )),
        }
    }

    /// The product the line materially resolves to.
    pub fn effective_product(&self, original: ProductId) -> ProductId {
        match self.status {
            ReplacementStatus::Approved => self.replaced_by.unwrap_or(original),
            _ => original,
        }
    }

    fn ensure_decidable(&self, order_status: OrderStatus) -> DomainResult<()> {
        if !order_status.negotiation_open() {
            return Err(DomainError::state_conflict(format!(
                "order in status {} no longer accepts replacement decisions",
                order_status.as_str()
            )));
        }
        if self.status != ReplacementStatus::Pending {
            return Err(DomainError::state_conflict(format!(
                "line is {}, not pending",
                self.status.as_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(raw: i64) -> ProductId {
        ProductId::from_raw(raw).unwrap()
    }

    #[test]
    fn propose_then_repropose_keeps_exactly_one_pending_candidate() {
        let s = ReplacementState::none();
        let s = s.propose(product(10)).unwrap();
        let s = s.propose(product(20)).unwrap();

        assert_eq!(s.status, ReplacementStatus::Pending);
        assert_eq!(s.candidate, Some(product(20)));
        assert_eq!(s.replaced_by, None);
        assert_eq!(s.decision_reason, None);
        assert_eq!(s.decided_at, None);
    }

    #[test]
    fn withdraw_clears_without_recording_a_decision() {
        let s = ReplacementState::none().propose(product(10)).unwrap();
        let s = s.withdraw().unwrap();
        assert_eq!(s, ReplacementState::none());

        assert!(ReplacementState::none().withdraw().is_err());
    }

    #[test]
    fn approve_makes_candidate_effective() {
        let original = product(1);
        let s = ReplacementState::none().propose(product(10)).unwrap();
        let now = Utc::now();
        let s = s.approve(OrderStatus::Confirmed, now).unwrap();

        assert_eq!(s.status, ReplacementStatus::Approved);
        assert_eq!(s.replaced_by, Some(product(10)));
        assert_eq!(s.candidate, None);
        assert_eq!(s.decided_at, Some(now));
        assert_eq!(s.effective_product(original), product(10));
    }

    #[test]
    fn reject_records_reason_and_keeps_original_effective() {
        let original = product(1);
        let s = ReplacementState::none().propose(product(10)).unwrap();
        let now = Utc::now();
        let s = s
            .reject(OrderStatus::Draft, Some("too expensive".into()), now)
            .unwrap();

        assert_eq!(s.status, ReplacementStatus::Rejected);
        assert_eq!(s.decision_reason.as_deref(), Some("too expensive"));
        assert_eq!(s.decided_at, Some(now));
        assert_eq!(s.replaced_by, None);
        assert_eq!(s.effective_product(original), original);
    }

    #[test]
    fn decisions_outside_the_order_window_are_state_conflicts() {
        let s = ReplacementState::none().propose(product(10)).unwrap();
        for status in [
            OrderStatus::OutForDelivery,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::RejectedByCustomer,
        ] {
            assert!(s.approve(status, Utc::now()).is_err(), "{status:?}");
            assert!(s.reject(status, None, Utc::now()).is_err(), "{status:?}");
        }
    }

    #[test]
    fn decisions_against_non_pending_lines_are_state_conflicts() {
        let none = ReplacementState::none();
        assert!(none.approve(OrderStatus::Draft, Utc::now()).is_err());
        assert!(none.reject(OrderStatus::Draft, None, Utc::now()).is_err());

        let approved = none
            .propose(product(10))
            .unwrap()
            .approve(OrderStatus::Draft, Utc::now())
            .unwrap();
        assert!(approved.approve(OrderStatus::Draft, Utc::now()).is_err());
    }

    #[test]
    fn decided_lines_are_locked_until_reset() {
        let rejected = ReplacementState::none()
            .propose(product(10))
            .unwrap()
            .reject(OrderStatus::Draft, Some("no".into()), Utc::now())
            .unwrap();

        // No new proposal while decision-locked.
        assert!(rejected.propose(product(11)).is_err());

        // Reset discards candidate and decision fields entirely.
        let reset = rejected.reset().unwrap();
        assert_eq!(reset, ReplacementState::none());

        // And the line accepts proposals again.
        assert!(reset.propose(product(11)).is_ok());
    }

    #[test]
    fn reset_requires_a_decision() {
        assert!(ReplacementState::none().reset().is_err());
        let pending = ReplacementState::none().propose(product(10)).unwrap();
        assert!(pending.reset().is_err());
    }

    #[test]
    fn at_most_one_effective_outcome() {
        // Pending: candidate set, no replacement.
        let pending = ReplacementState::none().propose(product(10)).unwrap();
        assert!(pending.candidate.is_some() && pending.replaced_by.is_none());

        // Approved: replacement set, candidate cleared.
        let approved = pending.approve(OrderStatus::Draft, Utc::now()).unwrap();
        assert!(approved.replaced_by.is_some() && approved.candidate.is_none());
    }
}
