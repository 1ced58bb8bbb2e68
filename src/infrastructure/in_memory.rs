use crate::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use crate::domain::catalog::{
    Professional, ProfessionalId, Service, ServiceId, Shop, ShopId, User, UserId,
};
use crate::domain::conflict::find_conflict;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus, PaymentTransition};
use crate::domain::ports::{
    AppointmentStore, CatalogLookup, PaymentReservation, PaymentStore, SlotClaim,
};
use crate::error::{BookingError, Entity, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Catalog snapshot as loaded from JSON.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub shops: Vec<Shop>,
    #[serde(default)]
    pub professionals: Vec<Professional>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Default)]
struct CatalogTables {
    shops: HashMap<ShopId, Shop>,
    professionals: HashMap<ProfessionalId, Professional>,
    services: HashMap<ServiceId, Service>,
    users: HashMap<UserId, User>,
}

/// A thread-safe in-memory catalog.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    tables: Arc<RwLock<CatalogTables>>,
}

impl InMemoryCatalog {
    /// Creates a new, empty in-memory catalog.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let tables = CatalogTables {
            shops: seed.shops.into_iter().map(|s| (s.id, s)).collect(),
            professionals: seed.professionals.into_iter().map(|p| (p.id, p)).collect(),
            services: seed.services.into_iter().map(|s| (s.id, s)).collect(),
            users: seed.users.into_iter().map(|u| (u.id, u)).collect(),
        };
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Loads a catalog from a JSON document with `shops`, `professionals`,
    /// `services` and `users` arrays.
    pub fn from_json<R: Read>(source: R) -> Result<Self> {
        let seed: CatalogSeed = serde_json::from_reader(source)?;
        Ok(Self::from_seed(seed))
    }

    pub async fn add_shop(&self, shop: Shop) {
        self.tables.write().await.shops.insert(shop.id, shop);
    }

    pub async fn add_professional(&self, professional: Professional) {
        self.tables
            .write()
            .await
            .professionals
            .insert(professional.id, professional);
    }

    pub async fn add_service(&self, service: Service) {
        self.tables.write().await.services.insert(service.id, service);
    }

    pub async fn add_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn shop(&self, id: ShopId) -> Result<Option<Shop>> {
        Ok(self.tables.read().await.shops.get(&id).cloned())
    }

    async fn professional(&self, id: ProfessionalId) -> Result<Option<Professional>> {
        Ok(self.tables.read().await.professionals.get(&id).cloned())
    }

    async fn service(&self, id: ServiceId) -> Result<Option<Service>> {
        Ok(self.tables.read().await.services.get(&id).cloned())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }
}

/// A thread-safe in-memory appointment store.
///
/// Every write goes through the single `RwLock` write guard, which is what
/// makes `claim_slot` an atomic check-and-insert.
#[derive(Default, Clone)]
pub struct InMemoryAppointmentStore {
    appointments: Arc<RwLock<HashMap<AppointmentId, Appointment>>>,
}

impl InMemoryAppointmentStore {
    /// Creates a new, empty in-memory appointment store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn filtered<F>(&self, keep: F) -> Vec<Appointment>
    where
        F: Fn(&Appointment) -> bool,
    {
        let appointments = self.appointments.read().await;
        let mut found: Vec<Appointment> =
            appointments.values().filter(|a| keep(a)).cloned().collect();
        found.sort_by_key(|a| (a.start, a.id));
        found
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn claim_slot(&self, appointment: Appointment) -> Result<SlotClaim> {
        let mut appointments = self.appointments.write().await;
        if let Some(existing) = find_conflict(
            appointments.values(),
            appointment.shop_id,
            appointment.professional_id,
            &appointment.slot(),
        ) {
            return Ok(SlotClaim::Taken(existing.clone()));
        }
        appointments.insert(appointment.id, appointment);
        Ok(SlotClaim::Claimed)
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: AppointmentId,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<bool> {
        let mut appointments = self.appointments.write().await;
        match appointments.get_mut(&id) {
            Some(appointment) if appointment.status == expected => {
                appointment.status = next;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(BookingError::NotFound(Entity::Appointment)),
        }
    }

    async fn mark_requires_payment(&self, id: AppointmentId) -> Result<()> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&id)
            .ok_or(BookingError::NotFound(Entity::Appointment))?;
        appointment.requires_payment = true;
        Ok(())
    }

    async fn remove(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        Ok(self.appointments.write().await.remove(&id))
    }

    async fn active_for_professional(
        &self,
        shop_id: ShopId,
        professional_id: ProfessionalId,
    ) -> Result<Vec<Appointment>> {
        Ok(self
            .filtered(|a| {
                a.shop_id == shop_id && a.professional_id == professional_id && a.is_active()
            })
            .await)
    }

    async fn by_shop(&self, shop_id: ShopId) -> Result<Vec<Appointment>> {
        Ok(self.filtered(|a| a.shop_id == shop_id).await)
    }

    async fn by_client(&self, client_id: UserId) -> Result<Vec<Appointment>> {
        Ok(self.filtered(|a| a.client_id == client_id).await)
    }

    async fn all(&self) -> Result<Vec<Appointment>> {
        Ok(self.filtered(|_| true).await)
    }
}

#[derive(Default)]
struct PaymentTables {
    payments: HashMap<PaymentId, Payment>,
    by_ref: HashMap<String, PaymentId>,
}

impl PaymentTables {
    fn for_appointment(&self, appointment_id: AppointmentId) -> impl Iterator<Item = &Payment> {
        self.payments
            .values()
            .filter(move |p| p.appointment_id == appointment_id)
    }
}

/// A thread-safe in-memory payment store, indexed by gateway reference.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<PaymentTables>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty in-memory payment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn reserve(&self, mut payment: Payment) -> Result<PaymentReservation> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .for_appointment(payment.appointment_id)
            .find(|p| p.blocks_new_checkout())
        {
            return Ok(PaymentReservation::Blocked(existing.clone()));
        }
        payment.attempt = tables
            .for_appointment(payment.appointment_id)
            .map(|p| p.attempt + 1)
            .max()
            .unwrap_or(0);
        tables.by_ref.insert(payment.gateway_ref.clone(), payment.id);
        tables.payments.insert(payment.id, payment);
        Ok(PaymentReservation::Inserted)
    }

    async fn blocking_for(&self, appointment_id: AppointmentId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .for_appointment(appointment_id)
            .find(|p| p.blocks_new_checkout())
            .cloned())
    }

    async fn latest_for_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .for_appointment(appointment_id)
            .max_by_key(|p| p.recency())
            .cloned())
    }

    async fn by_gateway_ref(&self, gateway_ref: &str) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_ref
            .get(gateway_ref)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn apply_gateway_status(
        &self,
        gateway_ref: &str,
        status: PaymentStatus,
        at: NaiveDateTime,
    ) -> Result<Option<PaymentTransition>> {
        let mut tables = self.tables.write().await;
        let Some(id) = tables.by_ref.get(gateway_ref).copied() else {
            return Ok(None);
        };
        Ok(tables
            .payments
            .get_mut(&id)
            .map(|payment| payment.apply(status, at)))
    }

    async fn remove_for_appointment(&self, appointment_id: AppointmentId) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let doomed: Vec<(PaymentId, String)> = tables
            .for_appointment(appointment_id)
            .map(|p| (p.id, p.gateway_ref.clone()))
            .collect();
        for (id, gateway_ref) in &doomed {
            tables.payments.remove(id);
            tables.by_ref.remove(gateway_ref);
        }
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use crate::domain::schedule::Slot;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::num::NonZeroU32;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 17)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn appointment(professional: u64, hour: u32, minute: u32) -> Appointment {
        Appointment::schedule(
            1,
            professional,
            1,
            7,
            Slot::new(at(hour, minute), NonZeroU32::new(30).unwrap()),
            None,
            false,
        )
    }

    fn payment(appointment_id: AppointmentId, gateway_ref: &str) -> Payment {
        Payment::pending(
            appointment_id,
            gateway_ref.to_string(),
            format!("https://checkout/{gateway_ref}"),
            Amount::new(dec!(20)).unwrap(),
            "ARS".to_string(),
            "ana@example.com".to_string(),
            at(8, 0),
        )
    }

    #[tokio::test]
    async fn test_catalog_from_json() {
        let json = r#"{
            "shops": [{"id": 1, "name": "Corte Fino", "payments_enabled": true, "gateway_access_token": "tok"}],
            "professionals": [{"id": 10, "shop_id": 1, "name": "Pablo"}],
            "services": [{"id": 100, "shop_id": 1, "name": "Haircut", "price": 20, "duration_minutes": 30}],
            "users": [{"id": 7, "name": "Ana", "email": "ana@example.com", "role": "client"}]
        }"#;
        let catalog = InMemoryCatalog::from_json(json.as_bytes()).unwrap();

        assert!(catalog.shop(1).await.unwrap().unwrap().accepts_payments());
        assert_eq!(catalog.professional(10).await.unwrap().unwrap().shop_id, 1);
        assert_eq!(
            catalog.service(100).await.unwrap().unwrap().price.value(),
            dec!(20)
        );
        assert!(catalog.user(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_slot_rejects_overlap() {
        let store = InMemoryAppointmentStore::new();
        let first = appointment(1, 10, 0);
        assert_eq!(
            store.claim_slot(first.clone()).await.unwrap(),
            SlotClaim::Claimed
        );
        assert_eq!(
            store.claim_slot(appointment(1, 10, 15)).await.unwrap(),
            SlotClaim::Taken(first)
        );
        assert_eq!(
            store.claim_slot(appointment(2, 10, 15)).await.unwrap(),
            SlotClaim::Claimed
        );
        assert_eq!(store.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_compare_and_set_status() {
        let store = InMemoryAppointmentStore::new();
        let a = appointment(1, 10, 0);
        store.claim_slot(a.clone()).await.unwrap();

        assert!(
            store
                .compare_and_set_status(a.id, AppointmentStatus::Scheduled, AppointmentStatus::Done)
                .await
                .unwrap()
        );
        assert!(
            !store
                .compare_and_set_status(
                    a.id,
                    AppointmentStatus::Scheduled,
                    AppointmentStatus::Cancelled
                )
                .await
                .unwrap()
        );
        assert_eq!(
            store.get(a.id).await.unwrap().unwrap().status,
            AppointmentStatus::Done
        );
    }

    #[tokio::test]
    async fn test_cancelled_appointment_frees_slot() {
        let store = InMemoryAppointmentStore::new();
        let a = appointment(1, 10, 0);
        store.claim_slot(a.clone()).await.unwrap();
        store
            .compare_and_set_status(
                a.id,
                AppointmentStatus::Scheduled,
                AppointmentStatus::Cancelled,
            )
            .await
            .unwrap();

        assert_eq!(
            store.claim_slot(appointment(1, 10, 0)).await.unwrap(),
            SlotClaim::Claimed
        );
        assert_eq!(store.active_for_professional(1, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_payment_reserve_blocks_open_payment() {
        let store = InMemoryPaymentStore::new();
        let appointment_id = AppointmentId::new_v4();
        let first = payment(appointment_id, "pref-1");

        assert_eq!(
            store.reserve(first.clone()).await.unwrap(),
            PaymentReservation::Inserted
        );
        assert_eq!(
            store.reserve(payment(appointment_id, "pref-2")).await.unwrap(),
            PaymentReservation::Blocked(first)
        );

        store
            .apply_gateway_status("pref-1", PaymentStatus::Rejected, at(9, 0))
            .await
            .unwrap();
        assert_eq!(
            store.reserve(payment(appointment_id, "pref-3")).await.unwrap(),
            PaymentReservation::Inserted
        );
    }

    #[tokio::test]
    async fn test_latest_payment_with_equal_timestamps() {
        let store = InMemoryPaymentStore::new();
        let appointment_id = AppointmentId::new_v4();
        for (gateway_ref, status) in [
            ("pref-1", PaymentStatus::Refunded),
            ("pref-2", PaymentStatus::Rejected),
            ("pref-3", PaymentStatus::Refunded),
            ("pref-4", PaymentStatus::Rejected),
        ] {
            store.reserve(payment(appointment_id, gateway_ref)).await.unwrap();
            store
                .apply_gateway_status(gateway_ref, status, at(8, 0))
                .await
                .unwrap();
        }

        let latest = store
            .latest_for_appointment(appointment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.gateway_ref, "pref-4");
        assert_eq!(latest.attempt, 3);
    }

    #[tokio::test]
    async fn test_apply_gateway_status_unknown_ref() {
        let store = InMemoryPaymentStore::new();
        assert!(
            store
                .apply_gateway_status("missing", PaymentStatus::Approved, at(9, 0))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_remove_for_appointment_drops_ref_index() {
        let store = InMemoryPaymentStore::new();
        let appointment_id = AppointmentId::new_v4();
        store.reserve(payment(appointment_id, "pref-1")).await.unwrap();

        assert_eq!(store.remove_for_appointment(appointment_id).await.unwrap(), 1);
        assert!(store.by_gateway_ref("pref-1").await.unwrap().is_none());
    }
}
