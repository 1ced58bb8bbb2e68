use crate::domain::appointment::AppointmentStatus;
use crate::domain::catalog::{ProfessionalId, ServiceId, ShopId, UserId};
use crate::domain::payment::PaymentStatus;
use crate::domain::schedule::hhmm;
use crate::error::Result;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::io::Write;

/// One line of the final state report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentRow {
    #[serde(rename = "ref")]
    pub reference: String,
    pub shop: ShopId,
    pub professional: ProfessionalId,
    pub service: ServiceId,
    pub client: UserId,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub status: AppointmentStatus,
    pub requires_payment: bool,
    /// Status of the latest payment, empty when none was opened.
    pub payment: Option<PaymentStatus>,
}

const COLUMNS: [&str; 11] = [
    "ref",
    "shop",
    "professional",
    "service",
    "client",
    "date",
    "start",
    "end",
    "status",
    "requires_payment",
    "payment",
];

/// Writes the report as CSV. The header is written even when there are no rows.
pub struct AppointmentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AppointmentWriter<W> {
    /// Creates a new `AppointmentWriter` over any `Write` sink (e.g., Stdout).
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    pub fn write_rows(&mut self, rows: impl IntoIterator<Item = AppointmentRow>) -> Result<()> {
        self.writer.write_record(COLUMNS)?;
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
