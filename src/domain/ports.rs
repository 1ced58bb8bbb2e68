use super::appointment::{Appointment, AppointmentId, AppointmentStatus};
use super::catalog::{Professional, ProfessionalId, Service, ServiceId, Shop, ShopId, User, UserId};
use super::money::Amount;
use super::payment::{Payment, PaymentStatus, PaymentTransition};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use thiserror::Error;

/// Shop-local wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Read-only access to the tenant catalog and user directory.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn shop(&self, id: ShopId) -> Result<Option<Shop>>;
    async fn professional(&self, id: ProfessionalId) -> Result<Option<Professional>>;
    async fn service(&self, id: ServiceId) -> Result<Option<Service>>;
    async fn user(&self, id: UserId) -> Result<Option<User>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotClaim {
    Claimed,
    Taken(Appointment),
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Inserts the appointment unless an active appointment of the same
    /// professional in the same shop overlaps it. Check and insert are atomic.
    async fn claim_slot(&self, appointment: Appointment) -> Result<SlotClaim>;
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>>;
    /// Sets `next` only if the stored status is still `expected`.
    async fn compare_and_set_status(
        &self,
        id: AppointmentId,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<bool>;
    async fn mark_requires_payment(&self, id: AppointmentId) -> Result<()>;
    async fn remove(&self, id: AppointmentId) -> Result<Option<Appointment>>;
    async fn active_for_professional(
        &self,
        shop_id: ShopId,
        professional_id: ProfessionalId,
    ) -> Result<Vec<Appointment>>;
    async fn by_shop(&self, shop_id: ShopId) -> Result<Vec<Appointment>>;
    async fn by_client(&self, client_id: UserId) -> Result<Vec<Appointment>>;
    async fn all(&self) -> Result<Vec<Appointment>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentReservation {
    Inserted,
    Blocked(Payment),
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts the payment unless the appointment already has one that
    /// blocks a new checkout. Check and insert are atomic.
    async fn reserve(&self, payment: Payment) -> Result<PaymentReservation>;
    async fn blocking_for(&self, appointment_id: AppointmentId) -> Result<Option<Payment>>;
    /// The payment currently blocking a new checkout, otherwise the most
    /// recently created one.
    async fn latest_for_appointment(&self, appointment_id: AppointmentId)
    -> Result<Option<Payment>>;
    async fn by_gateway_ref(&self, gateway_ref: &str) -> Result<Option<Payment>>;
    /// Applies `status` atomically; `None` when the reference is unknown.
    async fn apply_gateway_status(
        &self,
        gateway_ref: &str,
        status: PaymentStatus,
        at: NaiveDateTime,
    ) -> Result<Option<PaymentTransition>>;
    async fn remove_for_appointment(&self, appointment_id: AppointmentId) -> Result<usize>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("gateway unreachable: {0}")]
    Unavailable(String),
}

/// Everything the gateway needs to open a checkout for one appointment.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub access_token: String,
    pub title: String,
    pub description: String,
    pub amount: Amount,
    pub currency: String,
    pub external_reference: String,
    pub payer_name: String,
    pub payer_email: String,
    pub statement_descriptor: String,
    pub success_url: String,
    pub failure_url: String,
    pub pending_url: String,
    pub notification_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    pub gateway_ref: String,
    pub checkout_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, request: CheckoutRequest) -> Result<Checkout, GatewayError>;
    /// The raw status the gateway currently reports for a payment.
    async fn payment_status(
        &self,
        access_token: &str,
        gateway_ref: &str,
    ) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub email: String,
    pub client_name: String,
    pub shop_name: String,
    /// dd/MM/yyyy
    pub date: String,
    /// HH:mm
    pub time: String,
}

impl Confirmation {
    pub fn new(user: &User, shop: &Shop, start: NaiveDateTime) -> Self {
        Self {
            email: user.email.clone(),
            client_name: user.name.clone(),
            shop_name: shop.name.clone(),
            date: start.format("%d/%m/%Y").to_string(),
            time: start.format("%H:%M").to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("notification dispatch failed: {0}")]
pub struct DispatchError(pub String);

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn appointment_confirmed(
        &self,
        confirmation: &Confirmation,
    ) -> std::result::Result<(), DispatchError>;
}

pub type ClockRef = Arc<dyn Clock>;
pub type CatalogRef = Arc<dyn CatalogLookup>;
pub type AppointmentStoreRef = Arc<dyn AppointmentStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type NotificationDispatcherRef = Arc<dyn NotificationDispatcher>;
