use crate::application::reconciliation::{NotificationOutcome, PaymentReconciler};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// How the intake answers a gateway delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    /// Processed; the gateway should not redeliver.
    Accepted,
    /// Not a payment notification, or unreadable. Also final.
    Ignored,
    /// A transient failure; the gateway should redeliver later.
    Retry,
}

/// Public intake for gateway notifications of the form
/// `{"type": "payment", "data": {"id": <gateway ref>}}`.
///
/// The payload only names the payment. Its status is always read back from
/// the gateway, so a forged body cannot approve anything.
#[derive(Clone)]
pub struct WebhookHandler {
    reconciler: Arc<PaymentReconciler>,
}

impl WebhookHandler {
    pub fn new(reconciler: Arc<PaymentReconciler>) -> Self {
        Self { reconciler }
    }

    #[instrument(skip_all)]
    pub async fn handle(&self, payload: &[u8]) -> WebhookAck {
        let Some(gateway_ref) = payment_reference(payload) else {
            return WebhookAck::Ignored;
        };

        match self.reconciler.refresh_from_gateway(&gateway_ref).await {
            Ok(NotificationOutcome::Applied { from, to }) => {
                info!(%gateway_ref, %from, %to, "webhook applied");
                WebhookAck::Accepted
            }
            Ok(outcome) => {
                debug!(%gateway_ref, ?outcome, "webhook changed nothing");
                WebhookAck::Accepted
            }
            Err(e) if e.is_retryable() => {
                error!(%gateway_ref, error = %e, "webhook failed, asking for redelivery");
                WebhookAck::Retry
            }
            Err(e) => {
                warn!(%gateway_ref, error = %e, "webhook rejected");
                WebhookAck::Accepted
            }
        }
    }
}

fn payment_reference(payload: &[u8]) -> Option<String> {
    let body: Value = match serde_json::from_slice(payload) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "malformed webhook payload");
            return None;
        }
    };

    let kind = body.get("type").and_then(Value::as_str);
    if kind != Some("payment") {
        debug!(?kind, "webhook type ignored");
        return None;
    }

    match body.pointer("/data/id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Some(Value::Number(id)) => Some(id.to_string()),
        other => {
            warn!(?other, "payment webhook without a usable data.id");
            None
        }
    }
}
