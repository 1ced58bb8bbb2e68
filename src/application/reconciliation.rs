use crate::config::PaymentsConfig;
use crate::domain::access::Actor;
use crate::domain::appointment::{AppointmentId, AppointmentStatus};
use crate::domain::payment::{Payment, PaymentStatus, PaymentView};
use crate::domain::ports::{
    AppointmentStoreRef, CatalogRef, CheckoutRequest, ClockRef, Confirmation, GatewayError,
    NotificationDispatcherRef, PaymentGatewayRef, PaymentReservation, PaymentStoreRef,
};
use crate::error::{BookingError, Entity, Result};
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// What a gateway notification did to the local payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// No local payment carries the reference.
    Untracked,
    /// The gateway status has no local meaning.
    Ignored,
    Unchanged(PaymentStatus),
    Applied {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

/// Result of one [`PaymentReconciler::sweep_orphans`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Orphans now recorded as local payments.
    pub recovered: usize,
    /// Orphans dropped because another payment, a cancellation or a delete
    /// got there first.
    pub abandoned: usize,
    /// Orphans kept for the next pass after another store failure.
    pub remaining: usize,
}

/// Opens checkouts and folds gateway notifications into local payment state.
///
/// Gateway calls always happen outside the short store operations that
/// persist their outcome, and each one is bounded by the configured timeout.
///
/// A checkout the gateway opened but the store failed to record is an
/// orphan. Orphans are queued in memory until [`Self::sweep_orphans`]
/// either records or drops them.
pub struct PaymentReconciler {
    catalog: CatalogRef,
    appointments: AppointmentStoreRef,
    payments: PaymentStoreRef,
    gateway: PaymentGatewayRef,
    dispatcher: NotificationDispatcherRef,
    clock: ClockRef,
    settings: PaymentsConfig,
    orphans: Mutex<Vec<Payment>>,
}

impl PaymentReconciler {
    pub fn new(
        catalog: CatalogRef,
        appointments: AppointmentStoreRef,
        payments: PaymentStoreRef,
        gateway: PaymentGatewayRef,
        dispatcher: NotificationDispatcherRef,
        clock: ClockRef,
        settings: PaymentsConfig,
    ) -> Self {
        Self {
            catalog,
            appointments,
            payments,
            gateway,
            dispatcher,
            clock,
            settings,
            orphans: Mutex::new(Vec::new()),
        }
    }

    /// Opens a gateway checkout for an appointment the actor owns.
    #[instrument(skip(self))]
    pub async fn create_checkout(
        &self,
        appointment_id: AppointmentId,
        actor: &Actor,
    ) -> Result<PaymentView> {
        let appointment = self
            .appointments
            .get(appointment_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Appointment))?;
        if appointment.client_id != actor.user_id {
            return Err(BookingError::Unauthorized);
        }
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(BookingError::AppointmentCancelled);
        }

        let shop = self
            .catalog
            .shop(appointment.shop_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Shop))?;
        if !shop.accepts_payments() {
            return Err(BookingError::PaymentsDisabled);
        }
        if let Some(existing) = self.payments.blocking_for(appointment_id).await? {
            return Err(already_open(&existing));
        }

        let service = self
            .catalog
            .service(appointment.service_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Service))?;
        let client = self
            .catalog
            .user(appointment.client_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::User))?;

        let reference = appointment_id.to_string();
        let request = CheckoutRequest {
            access_token: shop.gateway_access_token.clone().unwrap_or_default(),
            title: format!("{} - {}", service.name, shop.name),
            description: format!(
                "Appointment on {} at {}",
                appointment.start.format("%d/%m/%Y"),
                appointment.start.format("%H:%M")
            ),
            amount: service.price,
            currency: self.settings.currency.clone(),
            external_reference: reference.clone(),
            payer_name: client.name.clone(),
            payer_email: client.email.clone(),
            statement_descriptor: shop.name.clone(),
            success_url: self.settings.return_url("success", &reference),
            failure_url: self.settings.return_url("failure", &reference),
            pending_url: self.settings.return_url("pending", &reference),
            notification_url: self.settings.webhook_url(),
        };

        let checkout = self.call_gateway(self.gateway.create_checkout(request)).await?;
        let payment = Payment::pending(
            appointment_id,
            checkout.gateway_ref,
            checkout.checkout_url,
            service.price,
            self.settings.currency.clone(),
            client.email,
            self.clock.now(),
        );

        match self.payments.reserve(payment.clone()).await {
            Ok(PaymentReservation::Inserted) => {}
            Ok(PaymentReservation::Blocked(existing)) => {
                warn!(
                    gateway_ref = %payment.gateway_ref,
                    existing_ref = %existing.gateway_ref,
                    "orphan checkout: another payment was recorded first"
                );
                self.orphans.lock().await.push(payment);
                return Err(already_open(&existing));
            }
            Err(e) => {
                error!(gateway_ref = %payment.gateway_ref, error = %e, "orphan checkout: payment not recorded");
                self.orphans.lock().await.push(payment);
                return Err(e);
            }
        }
        self.appointments
            .mark_requires_payment(appointment_id)
            .await?;

        info!(gateway_ref = %payment.gateway_ref, amount = %payment.amount(), "checkout opened");
        Ok(PaymentView::from(&payment))
    }

    /// Applies a raw gateway status to the payment with `gateway_ref`.
    ///
    /// Safe to call any number of times with the same input; the
    /// confirmation goes out at most once per payment.
    #[instrument(skip(self))]
    pub async fn apply_notification(
        &self,
        gateway_ref: &str,
        raw_status: &str,
    ) -> Result<NotificationOutcome> {
        let Some(status) = PaymentStatus::from_gateway(raw_status) else {
            debug!("gateway status has no local mapping");
            return Ok(NotificationOutcome::Ignored);
        };

        let Some(transition) = self
            .payments
            .apply_gateway_status(gateway_ref, status, self.clock.now())
            .await?
        else {
            warn!("notification for unknown payment reference");
            return Ok(NotificationOutcome::Untracked);
        };

        if transition.confirm {
            self.confirm(&transition.payment).await;
        }

        if transition.changed() {
            info!(from = %transition.previous, to = %transition.payment.status, "payment status changed");
            Ok(NotificationOutcome::Applied {
                from: transition.previous,
                to: transition.payment.status,
            })
        } else {
            Ok(NotificationOutcome::Unchanged(transition.payment.status))
        }
    }

    /// Asks the gateway for the current status of a payment and applies it.
    #[instrument(skip(self))]
    pub async fn refresh_from_gateway(&self, gateway_ref: &str) -> Result<NotificationOutcome> {
        let Some(payment) = self.payments.by_gateway_ref(gateway_ref).await? else {
            warn!("notification for unknown payment reference");
            return Ok(NotificationOutcome::Untracked);
        };
        let Some(appointment) = self.appointments.get(payment.appointment_id).await? else {
            warn!(appointment_id = %payment.appointment_id, "payment outlived its appointment");
            return Ok(NotificationOutcome::Untracked);
        };
        let shop = self
            .catalog
            .shop(appointment.shop_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Shop))?;
        let token = shop.gateway_access_token.unwrap_or_default();

        let raw = self
            .call_gateway(self.gateway.payment_status(&token, gateway_ref))
            .await?;
        self.apply_notification(gateway_ref, &raw).await
    }

    /// Gateway references of the checkouts waiting for a sweep.
    pub async fn orphaned_refs(&self) -> Vec<String> {
        self.orphans
            .lock()
            .await
            .iter()
            .map(|payment| payment.gateway_ref.clone())
            .collect()
    }

    /// Retries every queued orphan checkout.
    ///
    /// An orphan is recorded when its appointment is still live and nothing
    /// else blocks it, then refreshed from the gateway. It is dropped when the
    /// appointment is gone or cancelled, or another payment now blocks it.
    /// Store failures keep it queued.
    #[instrument(skip(self))]
    pub async fn sweep_orphans(&self) -> SweepReport {
        let queued = std::mem::take(&mut *self.orphans.lock().await);
        let mut report = SweepReport::default();
        let mut retained = Vec::new();

        for payment in queued {
            match self.adopt(&payment).await {
                Ok(true) => report.recovered += 1,
                Ok(false) => report.abandoned += 1,
                Err(e) => {
                    warn!(gateway_ref = %payment.gateway_ref, error = %e, "orphan checkout still unrecorded");
                    retained.push(payment);
                }
            }
        }

        report.remaining = retained.len();
        self.orphans.lock().await.extend(retained);
        if report != SweepReport::default() {
            info!(?report, "orphan sweep finished");
        }
        report
    }

    /// Latest payment of an appointment the actor may view.
    pub async fn get_by_appointment(
        &self,
        appointment_id: AppointmentId,
        actor: &Actor,
    ) -> Result<PaymentView> {
        let appointment = self
            .appointments
            .get(appointment_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Appointment))?;
        if !actor.capabilities_for(&appointment).view {
            return Err(BookingError::Unauthorized);
        }
        self.payments
            .latest_for_appointment(appointment_id)
            .await?
            .map(|payment| PaymentView::from(&payment))
            .ok_or(BookingError::NotFound(Entity::Payment))
    }

    async fn call_gateway<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, GatewayError>>,
    ) -> Result<T> {
        let timeout = self.settings.gateway_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(GatewayError::Rejected(reason))) => Err(BookingError::Gateway(reason)),
            Ok(Err(GatewayError::Unavailable(reason))) => {
                Err(BookingError::GatewayUnavailable(reason))
            }
            Err(_) => Err(BookingError::GatewayUnavailable(format!(
                "no answer within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Records one orphan; `Ok(false)` when it should be dropped instead.
    async fn adopt(&self, payment: &Payment) -> Result<bool> {
        let live = self
            .appointments
            .get(payment.appointment_id)
            .await?
            .is_some_and(|appointment| appointment.status != AppointmentStatus::Cancelled);
        if !live {
            info!(gateway_ref = %payment.gateway_ref, "orphan checkout dropped: appointment gone or cancelled");
            return Ok(false);
        }

        match self.payments.reserve(payment.clone()).await? {
            PaymentReservation::Blocked(existing)
                if existing.gateway_ref != payment.gateway_ref =>
            {
                info!(
                    gateway_ref = %payment.gateway_ref,
                    existing_ref = %existing.gateway_ref,
                    "orphan checkout dropped: superseded"
                );
                return Ok(false);
            }
            PaymentReservation::Blocked(_) | PaymentReservation::Inserted => {}
        }
        self.appointments
            .mark_requires_payment(payment.appointment_id)
            .await?;
        info!(gateway_ref = %payment.gateway_ref, "orphan checkout recorded");

        if let Err(e) = self.refresh_from_gateway(&payment.gateway_ref).await {
            warn!(gateway_ref = %payment.gateway_ref, error = %e, "recovered checkout not refreshed");
        }
        Ok(true)
    }

    /// Sends the booking confirmation for a freshly approved payment.
    ///
    /// The dispatch slot is already claimed at this point, so failures are
    /// logged and never surfaced to the notification sender.
    async fn confirm(&self, payment: &Payment) {
        let appointment = match self.appointments.get(payment.appointment_id).await {
            Ok(Some(appointment)) => appointment,
            Ok(None) => {
                warn!(appointment_id = %payment.appointment_id, "approved payment has no appointment");
                return;
            }
            Err(e) => {
                error!(error = %e, "could not load appointment for confirmation");
                return;
            }
        };
        if appointment.status == AppointmentStatus::Cancelled {
            warn!(appointment_id = %appointment.id, "payment approved for a cancelled appointment");
            return;
        }

        let client = self.catalog.user(appointment.client_id).await;
        let shop = self.catalog.shop(appointment.shop_id).await;
        let (client, shop) = match (client, shop) {
            (Ok(Some(client)), Ok(Some(shop))) => (client, shop),
            _ => {
                error!(appointment_id = %appointment.id, "confirmation recipient could not be resolved");
                return;
            }
        };

        let confirmation = Confirmation::new(&client, &shop, appointment.start);
        if let Err(e) = self.dispatcher.appointment_confirmed(&confirmation).await {
            warn!(appointment_id = %appointment.id, error = %e, "confirmation not delivered");
        }
    }
}

fn already_open(existing: &Payment) -> BookingError {
    if existing.status == PaymentStatus::Approved {
        BookingError::PaymentAlreadyApproved
    } else {
        BookingError::PaymentAlreadyPending
    }
}
