//! `mercora-notify` — the notification collaborator seam.
//!
//! Delivery is an external concern (SMS/WhatsApp gateway). From the order
//! and negotiation state machines' perspective every send is fire-and-forget:
//! a delivery failure must never roll back the transition that triggered it.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification rejected: {0}")]
    Rejected(String),

    #[error("notification transport failure: {0}")]
    Transport(String),
}

/// External notification collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `payload` rendered under `template` to `phone`.
    async fn send(
        &self,
        template: &str,
        phone: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Development/test notifier: logs instead of delivering.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        template: &str,
        phone: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        tracing::info!(template, phone, %payload, "notification");
        Ok(())
    }
}

/// Best-effort send: failures are logged, never propagated.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    template: &str,
    phone: &str,
    payload: serde_json::Value,
) {
    if let Err(e) = notifier.send(template, phone, payload).await {
        tracing::warn!(template, phone, error = %e, "notification failed; continuing");
    }
}
