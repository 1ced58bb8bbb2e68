//! Application services orchestrating the domain over the ports.
//!
//! [`booking::BookingService`] owns the appointment lifecycle and
//! [`reconciliation::PaymentReconciler`] keeps local payments in step with the
//! gateway. Both receive their adapters as `Arc<dyn Port>` at construction.

pub mod booking;
pub mod reconciliation;
