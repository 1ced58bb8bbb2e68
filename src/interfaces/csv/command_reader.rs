use crate::domain::catalog::{ProfessionalId, ServiceId, ShopId, UserId};
use crate::domain::schedule::hhmm;
use crate::error::{BookingError, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, de};
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Book,
    Cancel,
    Status,
    Delete,
    Checkout,
    Webhook,
}

/// One replayed operation.
///
/// `reference` labels the appointment a `book` row creates; later rows use
/// the same label (or the appointment id) to address it. `value` carries the
/// notes for `book`, the target status for `status` and the gateway status
/// for `webhook`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    #[serde(rename = "command")]
    pub kind: CommandKind,
    pub actor: Option<UserId>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub shop: Option<ShopId>,
    pub professional: Option<ProfessionalId>,
    pub service: Option<ServiceId>,
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "optional_time")]
    pub time: Option<NaiveTime>,
    pub value: Option<String>,
}

impl Command {
    pub fn actor(&self) -> Result<UserId> {
        self.actor.ok_or_else(|| missing("actor"))
    }

    pub fn reference(&self) -> Result<&str> {
        self.reference
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| missing("ref"))
    }

    pub fn value(&self) -> Result<&str> {
        self.value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing("value"))
    }
}

pub(crate) fn missing(column: &str) -> BookingError {
    BookingError::InvalidInput(format!("missing {column} column"))
}

fn optional_time<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveTime>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => hhmm::parse(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid time of day: {raw}"))),
    }
}

/// Reads replay commands from a CSV source.
///
/// Fields are trimmed and rows may omit trailing columns.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes commands, one `Result` per row.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BookingError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "command, actor, ref, shop, professional, service, date, time, value\n";

    fn read(rows: &str) -> Vec<Result<Command>> {
        CommandReader::new(format!("{HEADER}{rows}").as_bytes())
            .commands()
            .collect()
    }

    #[test]
    fn test_reads_booking_row() {
        let results = read("book, 7, a1, 1, 10, 100, 2026-10-17, 10:00, bring photo\n");
        let command = results[0].as_ref().unwrap();

        assert_eq!(command.kind, CommandKind::Book);
        assert_eq!(command.actor().unwrap(), 7);
        assert_eq!(command.reference().unwrap(), "a1");
        assert_eq!(command.shop, Some(1));
        assert_eq!(command.date, NaiveDate::from_ymd_opt(2026, 10, 17));
        assert_eq!(command.time, NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(command.value().unwrap(), "bring photo");
    }

    #[test]
    fn test_short_rows_leave_columns_empty() {
        let results = read("cancel, 7, a1\nwebhook, , a1, , , , , , approved\n");

        let cancel = results[0].as_ref().unwrap();
        assert_eq!(cancel.kind, CommandKind::Cancel);
        assert_eq!(cancel.time, None);
        assert!(matches!(cancel.value(), Err(BookingError::InvalidInput(_))));

        let webhook = results[1].as_ref().unwrap();
        assert!(webhook.actor().is_err());
        assert_eq!(webhook.value().unwrap(), "approved");
    }

    #[test]
    fn test_malformed_rows_are_errors() {
        let results = read("refund, 7, a1\nbook, 7, a1, 1, 10, 100, 2026-10-17, 25:00\n");
        assert!(results[0].is_err());
        assert!(results[1].is_err());
    }
}
