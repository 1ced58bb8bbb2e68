use super::appointment::AppointmentId;
use super::money::Amount;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type PaymentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
    InProcess,
}

impl PaymentStatus {
    /// Maps a gateway status string. Unknown strings, "pending" included, yield
    /// `None` and leave the payment where it is.
    pub fn from_gateway(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" | "accredited" => Some(PaymentStatus::Approved),
            "rejected" | "cancelled" => Some(PaymentStatus::Rejected),
            "refunded" => Some(PaymentStatus::Refunded),
            "in_process" | "in_mediation" => Some(PaymentStatus::InProcess),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved
                | PaymentStatus::Rejected
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Rejected => "REJECTED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::InProcess => "IN_PROCESS",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub appointment_id: AppointmentId,
    pub gateway_ref: String,
    amount: Amount,
    pub currency: String,
    pub status: PaymentStatus,
    pub checkout_url: String,
    pub payer_email: String,
    pub created_at: NaiveDateTime,
    /// Position among the checkouts of the same appointment, from 0.
    /// Assigned by the store when the payment is reserved.
    #[serde(default)]
    pub attempt: u32,
    pub paid_at: Option<NaiveDateTime>,
    /// Set once the confirmation for this payment has been handed to the dispatcher.
    pub confirmation_dispatched: bool,
}

/// Outcome of applying one gateway status to a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTransition {
    pub previous: PaymentStatus,
    pub payment: Payment,
    /// True only for the call that first moved the payment to approved and
    /// claimed the confirmation.
    pub confirm: bool,
}

impl PaymentTransition {
    pub fn changed(&self) -> bool {
        self.previous != self.payment.status
    }
}

impl Payment {
    pub fn pending(
        appointment_id: AppointmentId,
        gateway_ref: String,
        checkout_url: String,
        amount: Amount,
        currency: String,
        payer_email: String,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id,
            gateway_ref,
            amount,
            currency,
            status: PaymentStatus::Pending,
            checkout_url,
            payer_email,
            created_at,
            attempt: 0,
            paid_at: None,
            confirmation_dispatched: false,
        }
    }

    /// The amount captured at checkout. There is no setter.
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// An approved or still-open payment prevents a new checkout for the same appointment.
    pub fn blocks_new_checkout(&self) -> bool {
        self.status == PaymentStatus::Approved || !self.status.is_terminal()
    }

    /// Sort key among the payments of one appointment; the greatest is the
    /// latest. A blocking payment outranks the rest, then later attempts win.
    pub fn recency(&self) -> (bool, u32, NaiveDateTime, PaymentId) {
        (self.blocks_new_checkout(), self.attempt, self.created_at, self.id)
    }

    /// Applies a gateway status.
    ///
    /// Terminal states absorb every later notification. `paid_at` is set
    /// together with the move to approved.
    pub fn apply(&mut self, incoming: PaymentStatus, at: NaiveDateTime) -> PaymentTransition {
        let previous = self.status;
        if !previous.is_terminal() && incoming != previous {
            self.status = incoming;
            if incoming == PaymentStatus::Approved {
                self.paid_at = Some(at);
            }
        }

        let confirm = self.status == PaymentStatus::Approved && !self.confirmation_dispatched;
        if confirm {
            self.confirmation_dispatched = true;
        }

        PaymentTransition {
            previous,
            payment: self.clone(),
            confirm,
        }
    }
}

/// Read projection of a payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentView {
    pub id: PaymentId,
    pub appointment_id: AppointmentId,
    pub gateway_ref: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub checkout_url: String,
    pub created_at: NaiveDateTime,
}

impl From<&Payment> for PaymentView {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            appointment_id: payment.appointment_id,
            gateway_ref: payment.gateway_ref.clone(),
            amount: payment.amount.value(),
            status: payment.status,
            checkout_url: payment.checkout_url.clone(),
            created_at: payment.created_at,
        }
    }
}
