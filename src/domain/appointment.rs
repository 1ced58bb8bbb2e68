use super::catalog::{ProfessionalId, ServiceId, ShopId, UserId};
use super::schedule::Slot;
use crate::error::BookingError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type AppointmentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Done,
}

impl AppointmentStatus {
    /// Only a scheduled appointment can move, and only to cancelled or done.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
                | (AppointmentStatus::Scheduled, AppointmentStatus::Done)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => Ok(AppointmentStatus::Scheduled),
            "CANCELLED" => Ok(AppointmentStatus::Cancelled),
            "DONE" => Ok(AppointmentStatus::Done),
            _ => Err(BookingError::InvalidStatus(s.to_string())),
        }
    }
}

/// A booked slot for one client with one professional, for one service, in one shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub shop_id: ShopId,
    pub professional_id: ProfessionalId,
    pub service_id: ServiceId,
    pub client_id: UserId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub requires_payment: bool,
}

impl Appointment {
    pub fn schedule(
        shop_id: ShopId,
        professional_id: ProfessionalId,
        service_id: ServiceId,
        client_id: UserId,
        slot: Slot,
        notes: Option<String>,
        requires_payment: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop_id,
            professional_id,
            service_id,
            client_id,
            start: slot.start,
            end: slot.end,
            status: AppointmentStatus::Scheduled,
            notes: notes.filter(|n| !n.trim().is_empty()),
            requires_payment,
        }
    }

    pub fn slot(&self) -> Slot {
        Slot {
            start: self.start,
            end: self.end,
        }
    }

    /// Whether this appointment still holds its slot.
    pub fn is_active(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }
}

/// Read projection returned to callers, with catalog names resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentView {
    pub id: AppointmentId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub client_name: String,
    pub professional_name: String,
    pub service_name: String,
    pub service_price: Decimal,
    pub service_duration: u32,
    pub shop_id: ShopId,
    pub shop_name: String,
    pub notes: Option<String>,
    pub requires_payment: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            "scheduled".parse::<AppointmentStatus>().unwrap(),
            AppointmentStatus::Scheduled
        );
        assert_eq!(
            " DONE ".parse::<AppointmentStatus>().unwrap(),
            AppointmentStatus::Done
        );
        assert!(matches!(
            "CONFIRMED".parse::<AppointmentStatus>(),
            Err(BookingError::InvalidStatus(s)) if s == "CONFIRMED"
        ));
    }

    #[test]
    fn test_transition_allow_list() {
        use AppointmentStatus::*;
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Scheduled.can_transition_to(Done));
        assert!(!Cancelled.can_transition_to(Scheduled));
        assert!(!Cancelled.can_transition_to(Done));
        assert!(!Done.can_transition_to(Scheduled));
        assert!(!Done.can_transition_to(Cancelled));
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&AppointmentStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
    }
}
