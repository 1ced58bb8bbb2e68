use crate::application::booking::{BookingRequest, BookingService};
use crate::application::reconciliation::{PaymentReconciler, SweepReport};
use crate::config::BookingConfig;
use crate::domain::access::Actor;
use crate::domain::appointment::AppointmentId;
use crate::domain::catalog::UserId;
use crate::domain::ports::{AppointmentStoreRef, CatalogRef, ClockRef, PaymentStoreRef};
use crate::error::{BookingError, Entity, Result};
use crate::infrastructure::gateway::SandboxGateway;
use crate::infrastructure::notifier::LogDispatcher;
use crate::interfaces::csv::appointment_writer::AppointmentRow;
use crate::interfaces::csv::command_reader::{Command, CommandKind, missing};
use crate::interfaces::webhook::{WebhookAck, WebhookHandler};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Drives the services from a stream of [`Command`]s.
///
/// Payments go through the [`SandboxGateway`]; a `webhook` row settles the
/// sandbox payment and then delivers the gateway notification through the
/// regular [`WebhookHandler`].
pub struct Replay {
    catalog: CatalogRef,
    payments: PaymentStoreRef,
    booking: BookingService,
    reconciler: Arc<PaymentReconciler>,
    webhook: WebhookHandler,
    sandbox: SandboxGateway,
    labels: HashMap<String, AppointmentId>,
}

impl Replay {
    pub fn new(
        catalog: CatalogRef,
        appointments: AppointmentStoreRef,
        payments: PaymentStoreRef,
        clock: ClockRef,
        sandbox: SandboxGateway,
        config: &BookingConfig,
    ) -> Self {
        let booking = BookingService::new(
            catalog.clone(),
            appointments.clone(),
            payments.clone(),
            clock.clone(),
            config,
        );
        let reconciler = Arc::new(PaymentReconciler::new(
            catalog.clone(),
            appointments,
            payments.clone(),
            Arc::new(sandbox.clone()),
            Arc::new(LogDispatcher),
            clock,
            config.payments.clone(),
        ));
        Self {
            catalog,
            payments,
            booking,
            webhook: WebhookHandler::new(reconciler.clone()),
            reconciler,
            sandbox,
            labels: HashMap::new(),
        }
    }

    pub async fn apply(&mut self, command: Command) -> Result<()> {
        match command.kind {
            CommandKind::Book => self.book(&command).await,
            CommandKind::Cancel => {
                let actor = self.actor(command.actor()?).await?;
                let id = self.resolve(command.reference()?)?;
                self.booking.cancel(id, &actor).await
            }
            CommandKind::Status => {
                let actor = self.actor(command.actor()?).await?;
                let id = self.resolve(command.reference()?)?;
                self.booking
                    .update_status(id, command.value()?, &actor)
                    .await
            }
            CommandKind::Delete => {
                let actor = self.actor(command.actor()?).await?;
                let id = self.resolve(command.reference()?)?;
                self.booking.delete(id, &actor).await
            }
            CommandKind::Checkout => {
                let actor = self.actor(command.actor()?).await?;
                let id = self.resolve(command.reference()?)?;
                let payment = self.reconciler.create_checkout(id, &actor).await?;
                info!(gateway_ref = %payment.gateway_ref, url = %payment.checkout_url, "checkout ready");
                Ok(())
            }
            CommandKind::Webhook => self.deliver(&command).await,
        }
    }

    /// Retries checkouts the gateway opened but the store failed to record.
    pub async fn sweep_orphans(&self) -> SweepReport {
        self.reconciler.sweep_orphans().await
    }

    /// Final state of every stored appointment, in start order.
    pub async fn report(&self) -> Result<Vec<AppointmentRow>> {
        let names: HashMap<AppointmentId, &str> = self
            .labels
            .iter()
            .map(|(label, id)| (*id, label.as_str()))
            .collect();

        let mut rows = Vec::new();
        for appointment in self.booking.snapshot().await? {
            let payment = self
                .payments
                .latest_for_appointment(appointment.id)
                .await?
                .map(|p| p.status);
            let reference = names
                .get(&appointment.id)
                .map(|label| label.to_string())
                .unwrap_or_else(|| appointment.id.to_string());
            rows.push(AppointmentRow {
                reference,
                shop: appointment.shop_id,
                professional: appointment.professional_id,
                service: appointment.service_id,
                client: appointment.client_id,
                date: appointment.start.date(),
                start: appointment.start.time(),
                end: appointment.end.time(),
                status: appointment.status,
                requires_payment: appointment.requires_payment,
                payment,
            });
        }
        Ok(rows)
    }

    async fn book(&mut self, command: &Command) -> Result<()> {
        let client = command.actor()?;
        let label = command.reference()?.to_string();
        if self.labels.contains_key(&label) {
            return Err(BookingError::InvalidInput(format!("duplicate ref {label}")));
        }
        let request = BookingRequest {
            shop_id: command.shop.ok_or_else(|| missing("shop"))?,
            professional_id: command.professional.ok_or_else(|| missing("professional"))?,
            service_id: command.service.ok_or_else(|| missing("service"))?,
            date: command.date.ok_or_else(|| missing("date"))?,
            time: command.time.ok_or_else(|| missing("time"))?,
            notes: command.value.clone(),
            requires_payment: false,
        };

        let view = self.booking.create(client, request).await?;
        self.labels.insert(label, view.id);
        Ok(())
    }

    async fn deliver(&self, command: &Command) -> Result<()> {
        let id = self.resolve(command.reference()?)?;
        let status = command.value()?;
        let payment = self
            .payments
            .latest_for_appointment(id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Payment))?;

        self.sandbox.settle(&payment.gateway_ref, status).await;
        let body = serde_json::json!({ "type": "payment", "data": { "id": payment.gateway_ref } });
        match self.webhook.handle(body.to_string().as_bytes()).await {
            WebhookAck::Retry => Err(BookingError::GatewayUnavailable(format!(
                "delivery for {} deferred",
                payment.gateway_ref
            ))),
            WebhookAck::Accepted | WebhookAck::Ignored => Ok(()),
        }
    }

    async fn actor(&self, user_id: UserId) -> Result<Actor> {
        let user = self
            .catalog
            .user(user_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::User))?;
        Ok(Actor::from(&user))
    }

    fn resolve(&self, reference: &str) -> Result<AppointmentId> {
        if let Some(id) = self.labels.get(reference) {
            return Ok(*id);
        }
        Uuid::parse_str(reference).map_err(|_| BookingError::NotFound(Entity::Appointment))
    }
}
