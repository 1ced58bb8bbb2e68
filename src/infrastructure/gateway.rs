use crate::domain::ports::{Checkout, CheckoutRequest, GatewayError, PaymentGateway};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

const SANDBOX_CHECKOUT_BASE: &str = "https://sandbox.checkout.local/pay";

/// Development gateway that issues sequential `sbx-N` references.
///
/// Nothing leaves the process. [`SandboxGateway::settle`] decides what a
/// later status query for a reference returns; unsettled references report
/// `"pending"`.
#[derive(Default, Clone)]
pub struct SandboxGateway {
    namespace: Option<String>,
    next_ref: Arc<AtomicU64>,
    statuses: Arc<RwLock<HashMap<String, String>>>,
}

impl SandboxGateway {
    /// Creates a sandbox that issues `sbx-1`, `sbx-2`, ... and has nothing settled.
    pub fn new() -> Self {
        Self::default()
    }

    /// References become `sbx-{namespace}-N`, keeping them unique across
    /// processes that share a persistent store.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    pub async fn settle(&self, gateway_ref: &str, status: &str) {
        self.statuses
            .write()
            .await
            .insert(gateway_ref.to_string(), status.to_string());
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<Checkout, GatewayError> {
        if request.access_token.trim().is_empty() {
            return Err(GatewayError::Rejected("missing access token".to_string()));
        }
        let n = self.next_ref.fetch_add(1, Ordering::SeqCst) + 1;
        let gateway_ref = match &self.namespace {
            Some(namespace) => format!("sbx-{namespace}-{n}"),
            None => format!("sbx-{n}"),
        };
        debug!(
            %gateway_ref,
            external_reference = %request.external_reference,
            amount = %request.amount,
            "sandbox checkout created"
        );
        Ok(Checkout {
            checkout_url: format!("{SANDBOX_CHECKOUT_BASE}/{gateway_ref}"),
            gateway_ref,
        })
    }

    async fn payment_status(
        &self,
        _access_token: &str,
        gateway_ref: &str,
    ) -> Result<String, GatewayError> {
        Ok(self
            .statuses
            .read()
            .await
            .get(gateway_ref)
            .cloned()
            .unwrap_or_else(|| "pending".to_string()))
    }
}
