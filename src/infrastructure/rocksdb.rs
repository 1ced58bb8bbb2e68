use crate::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use crate::domain::catalog::{ProfessionalId, ShopId, UserId};
use crate::domain::conflict::find_conflict;
use crate::domain::payment::{Payment, PaymentStatus, PaymentTransition};
use crate::domain::ports::{AppointmentStore, PaymentReservation, PaymentStore, SlotClaim};
use crate::error::{BookingError, Entity, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for appointments, keyed by appointment id.
pub const CF_APPOINTMENTS: &str = "appointments";
/// Column Family for payments, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping gateway references to payment ids.
pub const CF_PAYMENT_REFS: &str = "payment_refs";

/// A persistent store for appointments and payments backed by RocksDB.
///
/// Every read-modify-write runs under `write_gate`, which serialises the
/// conflict check with the insert that depends on it. Multi-key writes go
/// through a `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_gate: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating the
    /// column families on first use.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_APPOINTMENTS, CF_PAYMENTS, CF_PAYMENT_REFS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| BookingError::internal(format!("{name} column family not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn appointments_where<F>(&self, keep: F) -> Result<Vec<Appointment>>
    where
        F: Fn(&Appointment) -> bool,
    {
        let mut found: Vec<Appointment> = self
            .scan::<Appointment>(CF_APPOINTMENTS)?
            .into_iter()
            .filter(|a| keep(a))
            .collect();
        found.sort_by_key(|a| (a.start, a.id));
        Ok(found)
    }

    fn payments_for(&self, appointment_id: AppointmentId) -> Result<Vec<Payment>> {
        Ok(self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.appointment_id == appointment_id)
            .collect())
    }

    fn payment_id_for_ref(&self, gateway_ref: &str) -> Result<Option<Uuid>> {
        let cf = self.cf(CF_PAYMENT_REFS)?;
        match self.db.get_cf(cf, gateway_ref.as_bytes())? {
            Some(bytes) => Uuid::from_slice(&bytes)
                .map(Some)
                .map_err(|e| BookingError::InternalError(Box::new(e))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AppointmentStore for RocksDBStore {
    async fn claim_slot(&self, appointment: Appointment) -> Result<SlotClaim> {
        let _gate = self.write_gate.lock().await;
        let existing = self.appointments_where(|a| {
            a.shop_id == appointment.shop_id && a.professional_id == appointment.professional_id
        })?;
        if let Some(taken) = find_conflict(
            &existing,
            appointment.shop_id,
            appointment.professional_id,
            &appointment.slot(),
        ) {
            return Ok(SlotClaim::Taken(taken.clone()));
        }
        self.write(CF_APPOINTMENTS, appointment.id.as_bytes(), &appointment)?;
        Ok(SlotClaim::Claimed)
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        self.read(CF_APPOINTMENTS, id.as_bytes())
    }

    async fn compare_and_set_status(
        &self,
        id: AppointmentId,
        expected: AppointmentStatus,
        next: AppointmentStatus,
    ) -> Result<bool> {
        let _gate = self.write_gate.lock().await;
        let mut appointment: Appointment = self
            .read(CF_APPOINTMENTS, id.as_bytes())?
            .ok_or(BookingError::NotFound(Entity::Appointment))?;
        if appointment.status != expected {
            return Ok(false);
        }
        appointment.status = next;
        self.write(CF_APPOINTMENTS, id.as_bytes(), &appointment)?;
        Ok(true)
    }

    async fn mark_requires_payment(&self, id: AppointmentId) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let mut appointment: Appointment = self
            .read(CF_APPOINTMENTS, id.as_bytes())?
            .ok_or(BookingError::NotFound(Entity::Appointment))?;
        appointment.requires_payment = true;
        self.write(CF_APPOINTMENTS, id.as_bytes(), &appointment)
    }

    async fn remove(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        let _gate = self.write_gate.lock().await;
        let existing: Option<Appointment> = self.read(CF_APPOINTMENTS, id.as_bytes())?;
        if existing.is_some() {
            self.db.delete_cf(self.cf(CF_APPOINTMENTS)?, id.as_bytes())?;
        }
        Ok(existing)
    }

    async fn active_for_professional(
        &self,
        shop_id: ShopId,
        professional_id: ProfessionalId,
    ) -> Result<Vec<Appointment>> {
        self.appointments_where(|a| {
            a.shop_id == shop_id && a.professional_id == professional_id && a.is_active()
        })
    }

    async fn by_shop(&self, shop_id: ShopId) -> Result<Vec<Appointment>> {
        self.appointments_where(|a| a.shop_id == shop_id)
    }

    async fn by_client(&self, client_id: UserId) -> Result<Vec<Appointment>> {
        self.appointments_where(|a| a.client_id == client_id)
    }

    async fn all(&self) -> Result<Vec<Appointment>> {
        self.appointments_where(|_| true)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn reserve(&self, mut payment: Payment) -> Result<PaymentReservation> {
        let _gate = self.write_gate.lock().await;
        let earlier = self.payments_for(payment.appointment_id)?;
        if let Some(existing) = earlier.iter().find(|p| p.blocks_new_checkout()) {
            return Ok(PaymentReservation::Blocked(existing.clone()));
        }
        payment.attempt = earlier.iter().map(|p| p.attempt + 1).max().unwrap_or(0);

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_PAYMENTS)?,
            payment.id.as_bytes(),
            serde_json::to_vec(&payment)?,
        );
        batch.put_cf(
            self.cf(CF_PAYMENT_REFS)?,
            payment.gateway_ref.as_bytes(),
            payment.id.as_bytes(),
        );
        self.db.write(batch)?;
        Ok(PaymentReservation::Inserted)
    }

    async fn blocking_for(&self, appointment_id: AppointmentId) -> Result<Option<Payment>> {
        Ok(self
            .payments_for(appointment_id)?
            .into_iter()
            .find(|p| p.blocks_new_checkout()))
    }

    async fn latest_for_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<Option<Payment>> {
        Ok(self
            .payments_for(appointment_id)?
            .into_iter()
            .max_by_key(|p| p.recency()))
    }

    async fn by_gateway_ref(&self, gateway_ref: &str) -> Result<Option<Payment>> {
        match self.payment_id_for_ref(gateway_ref)? {
            Some(id) => self.read(CF_PAYMENTS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn apply_gateway_status(
        &self,
        gateway_ref: &str,
        status: PaymentStatus,
        at: NaiveDateTime,
    ) -> Result<Option<PaymentTransition>> {
        let _gate = self.write_gate.lock().await;
        let Some(id) = self.payment_id_for_ref(gateway_ref)? else {
            return Ok(None);
        };
        let Some(mut payment) = self.read::<Payment>(CF_PAYMENTS, id.as_bytes())? else {
            return Ok(None);
        };
        let transition = payment.apply(status, at);
        self.write(CF_PAYMENTS, id.as_bytes(), &payment)?;
        Ok(Some(transition))
    }

    async fn remove_for_appointment(&self, appointment_id: AppointmentId) -> Result<usize> {
        let _gate = self.write_gate.lock().await;
        let doomed = self.payments_for(appointment_id)?;
        let mut batch = WriteBatch::default();
        for payment in &doomed {
            batch.delete_cf(self.cf(CF_PAYMENTS)?, payment.id.as_bytes());
            batch.delete_cf(self.cf(CF_PAYMENT_REFS)?, payment.gateway_ref.as_bytes());
        }
        self.db.write(batch)?;
        Ok(doomed.len())
    }
}
