#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use shopbook::application::booking::{BookingRequest, BookingService};
use shopbook::application::reconciliation::PaymentReconciler;
use shopbook::config::BookingConfig;
use shopbook::domain::ports::{Confirmation, DispatchError, FixedClock, NotificationDispatcher};
use shopbook::infrastructure::gateway::SandboxGateway;
use shopbook::infrastructure::in_memory::{
    InMemoryAppointmentStore, InMemoryCatalog, InMemoryPaymentStore,
};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const HEADER: &str = "command,actor,ref,shop,professional,service,date,time,value";
pub const NOW: &str = "2026-10-16T08:00:00";

pub fn catalog_path() -> PathBuf {
    PathBuf::from("tests/fixtures/catalog.json")
}

/// Writes a commands CSV with the standard header followed by `rows`.
pub fn commands_file(rows: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

pub fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 16)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

pub fn tomorrow() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
}

pub fn haircut(professional: u64, hour: u32, minute: u32) -> BookingRequest {
    BookingRequest {
        shop_id: 1,
        professional_id: professional,
        service_id: 100,
        date: tomorrow(),
        time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
        notes: None,
        requires_payment: false,
    }
}

#[derive(Default)]
pub struct CountingDispatcher {
    sent: AtomicUsize,
}

impl CountingDispatcher {
    pub fn count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationDispatcher for CountingDispatcher {
    async fn appointment_confirmed(&self, _: &Confirmation) -> Result<(), DispatchError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Services {
    pub booking: Arc<BookingService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub sandbox: SandboxGateway,
    pub dispatcher: Arc<CountingDispatcher>,
}

/// In-memory services over the fixture catalog, clock frozen at [`now`].
pub fn services() -> Services {
    let catalog =
        Arc::new(InMemoryCatalog::from_json(File::open(catalog_path()).unwrap()).unwrap());
    let appointments = Arc::new(InMemoryAppointmentStore::new());
    let payments = Arc::new(InMemoryPaymentStore::new());
    let clock = Arc::new(FixedClock(now()));
    let sandbox = SandboxGateway::new();
    let dispatcher = Arc::new(CountingDispatcher::default());
    let config = BookingConfig::default();

    let booking = Arc::new(BookingService::new(
        catalog.clone(),
        appointments.clone(),
        payments.clone(),
        clock.clone(),
        &config,
    ));
    let reconciler = Arc::new(PaymentReconciler::new(
        catalog,
        appointments,
        payments,
        Arc::new(sandbox.clone()),
        dispatcher.clone(),
        clock,
        config.payments,
    ));
    Services {
        booking,
        reconciler,
        sandbox,
        dispatcher,
    }
}
