use crate::config::BookingConfig;
use crate::domain::access::Actor;
use crate::domain::appointment::{Appointment, AppointmentId, AppointmentStatus, AppointmentView};
use crate::domain::catalog::{
    Professional, ProfessionalId, Service, ServiceId, Shop, ShopId, User, UserId,
};
use crate::domain::conflict::find_conflict;
use crate::domain::ports::{
    AppointmentStoreRef, CatalogRef, ClockRef, PaymentStoreRef, SlotClaim,
};
use crate::domain::schedule::{BusinessHours, Slot};
use crate::error::{BookingError, Entity, Result};
use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::{debug, error, info, instrument};

/// Input of a booking request. The client comes from the authenticated caller.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub shop_id: ShopId,
    pub professional_id: ProfessionalId,
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
    pub requires_payment: bool,
}

/// Catalog entities a booking is composed of, already checked to share one shop.
struct Composition {
    shop: Shop,
    professional: Professional,
    service: Service,
}

/// Owns appointment creation and status changes.
///
/// Slot validation and the overlap check happen here; the overlap check is
/// only authoritative inside [`AppointmentStore::claim_slot`](crate::domain::ports::AppointmentStore::claim_slot),
/// which performs it atomically with the insert.
pub struct BookingService {
    catalog: CatalogRef,
    appointments: AppointmentStoreRef,
    payments: PaymentStoreRef,
    clock: ClockRef,
    hours: BusinessHours,
    slot_interval_minutes: u32,
}

impl BookingService {
    pub fn new(
        catalog: CatalogRef,
        appointments: AppointmentStoreRef,
        payments: PaymentStoreRef,
        clock: ClockRef,
        config: &BookingConfig,
    ) -> Self {
        Self {
            catalog,
            appointments,
            payments,
            clock,
            hours: config.hours,
            slot_interval_minutes: config.slot_interval_minutes,
        }
    }

    #[instrument(
        skip(self, request),
        fields(shop_id = request.shop_id, professional_id = request.professional_id)
    )]
    pub async fn create(
        &self,
        client_id: UserId,
        request: BookingRequest,
    ) -> Result<AppointmentView> {
        let client = self
            .catalog
            .user(client_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::User))?;
        let Composition {
            shop,
            professional,
            service,
        } = self
            .compose(request.shop_id, request.professional_id, request.service_id)
            .await?;

        let slot = Slot::new(request.date.and_time(request.time), service.duration_minutes);
        self.hours.validate(&slot, self.clock.now())?;

        let appointment = Appointment::schedule(
            shop.id,
            professional.id,
            service.id,
            client.id,
            slot,
            request.notes,
            request.requires_payment,
        );

        match self.appointments.claim_slot(appointment.clone()).await? {
            SlotClaim::Claimed => {
                info!(appointment_id = %appointment.id, start = %appointment.start, "appointment booked");
                Ok(project(&appointment, &shop, &client, &professional, &service))
            }
            SlotClaim::Taken(existing) => {
                debug!(existing_id = %existing.id, "slot already taken");
                Err(BookingError::DoubleBooked)
            }
        }
    }

    /// Cancels an appointment. Cancelling an already cancelled appointment is a no-op.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: AppointmentId, actor: &Actor) -> Result<()> {
        let appointment = self.load(id).await?;
        if !actor.capabilities_for(&appointment).modify {
            return Err(BookingError::Unauthorized);
        }
        self.transition(appointment, AppointmentStatus::Cancelled).await
    }

    /// Shop-admin status change, restricted to the allowed transitions.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: AppointmentId,
        status: &str,
        actor: &Actor,
    ) -> Result<()> {
        let appointment = self.load(id).await?;
        if !actor.capabilities_for(&appointment).admin {
            return Err(BookingError::Unauthorized);
        }
        let next = status.parse::<AppointmentStatus>()?;
        self.transition(appointment, next).await
    }

    /// Admin-only hard delete. Payments of the appointment go with it.
    ///
    /// Payments are removed first, so a failed delete never leaves payments
    /// pointing at a missing appointment and can simply be retried.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: AppointmentId, actor: &Actor) -> Result<()> {
        let appointment = self.load(id).await?;
        if !actor.capabilities_for(&appointment).admin {
            return Err(BookingError::Unauthorized);
        }
        let removed = match self.payments.remove_for_appointment(id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(appointment_id = %id, error = %e, "delete aborted, appointment kept");
                return Err(e);
            }
        };
        if self.appointments.remove(id).await?.is_none() {
            return Err(BookingError::NotFound(Entity::Appointment));
        }
        info!(appointment_id = %id, payments = removed, "appointment deleted");
        Ok(())
    }

    pub async fn get(&self, id: AppointmentId, actor: &Actor) -> Result<AppointmentView> {
        let appointment = self.load(id).await?;
        if !actor.capabilities_for(&appointment).view {
            return Err(BookingError::Unauthorized);
        }
        self.view(&appointment).await
    }

    pub async fn list_by_shop(
        &self,
        shop_id: ShopId,
        actor: &Actor,
    ) -> Result<Vec<AppointmentView>> {
        if !actor.can_admin_shop(shop_id) {
            return Err(BookingError::Unauthorized);
        }
        let appointments = self.appointments.by_shop(shop_id).await?;
        self.views(&appointments).await
    }

    pub async fn list_by_client(&self, actor: &Actor) -> Result<Vec<AppointmentView>> {
        let appointments = self.appointments.by_client(actor.user_id).await?;
        self.views(&appointments).await
    }

    /// Start times on `date` at which the service could still be booked with
    /// the professional.
    pub async fn available_slots(
        &self,
        shop_id: ShopId,
        professional_id: ProfessionalId,
        service_id: ServiceId,
        date: NaiveDate,
    ) -> Result<Vec<NaiveTime>> {
        let Composition {
            shop,
            professional,
            service,
        } = self.compose(shop_id, professional_id, service_id).await?;
        let existing = self
            .appointments
            .active_for_professional(shop.id, professional.id)
            .await?;
        let now = self.clock.now();
        let step = Duration::minutes(i64::from(self.slot_interval_minutes));

        let mut free = Vec::new();
        let mut start = date.and_time(self.hours.opening);
        while start.date() == date && start.time() < self.hours.closing {
            let slot = Slot::new(start, service.duration_minutes);
            if self.hours.validate(&slot, now).is_ok()
                && find_conflict(&existing, shop.id, professional.id, &slot).is_none()
            {
                free.push(start.time());
            }
            start += step;
        }
        Ok(free)
    }

    /// Every stored appointment, unscoped. For reporting.
    pub async fn snapshot(&self) -> Result<Vec<Appointment>> {
        self.appointments.all().await
    }

    async fn load(&self, id: AppointmentId) -> Result<Appointment> {
        self.appointments
            .get(id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Appointment))
    }

    async fn compose(
        &self,
        shop_id: ShopId,
        professional_id: ProfessionalId,
        service_id: ServiceId,
    ) -> Result<Composition> {
        let shop = self
            .catalog
            .shop(shop_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Shop))?;
        let professional = self
            .catalog
            .professional(professional_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Professional))?;
        let service = self
            .catalog
            .service(service_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Service))?;

        if professional.shop_id != shop.id || service.shop_id != shop.id {
            return Err(BookingError::CrossTenantMismatch);
        }
        Ok(Composition {
            shop,
            professional,
            service,
        })
    }

    /// Moves `appointment` to `next`, retrying if another writer changed the
    /// status between our read and our write.
    async fn transition(
        &self,
        mut appointment: Appointment,
        next: AppointmentStatus,
    ) -> Result<()> {
        loop {
            let current = appointment.status;
            if current == next {
                return Ok(());
            }
            if !current.can_transition_to(next) {
                return Err(BookingError::InvalidTransition { from: current, to: next });
            }
            if self
                .appointments
                .compare_and_set_status(appointment.id, current, next)
                .await?
            {
                info!(appointment_id = %appointment.id, from = %current, to = %next, "appointment status changed");
                return Ok(());
            }
            appointment = self.load(appointment.id).await?;
        }
    }

    async fn view(&self, appointment: &Appointment) -> Result<AppointmentView> {
        let shop = self
            .catalog
            .shop(appointment.shop_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Shop))?;
        let client = self
            .catalog
            .user(appointment.client_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::User))?;
        let professional = self
            .catalog
            .professional(appointment.professional_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Professional))?;
        let service = self
            .catalog
            .service(appointment.service_id)
            .await?
            .ok_or(BookingError::NotFound(Entity::Service))?;
        Ok(project(appointment, &shop, &client, &professional, &service))
    }

    async fn views(&self, appointments: &[Appointment]) -> Result<Vec<AppointmentView>> {
        let mut views = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            views.push(self.view(appointment).await?);
        }
        Ok(views)
    }
}

fn project(
    appointment: &Appointment,
    shop: &Shop,
    client: &User,
    professional: &Professional,
    service: &Service,
) -> AppointmentView {
    AppointmentView {
        id: appointment.id,
        date: appointment.start.date(),
        start_time: appointment.start.time(),
        end_time: appointment.end.time(),
        status: appointment.status,
        client_name: client.name.clone(),
        professional_name: professional.name.clone(),
        service_name: service.name.clone(),
        service_price: service.price.value(),
        service_duration: service.duration_minutes.get(),
        shop_id: shop.id,
        shop_name: shop.name.clone(),
        notes: appointment.notes.clone(),
        requires_payment: appointment.requires_payment,
    }
}
