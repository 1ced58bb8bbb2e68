use crate::error::{BookingError, Result};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// A candidate `[start, end)` interval, in shop-local wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Slot {
    pub fn new(start: NaiveDateTime, duration_minutes: NonZeroU32) -> Self {
        let end = start + Duration::minutes(i64::from(duration_minutes.get()));
        Self { start, end }
    }

    /// Half-open overlap: touching endpoints do not collide.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// Opening hours and the daily break, shared by every shop.
///
/// Each field falls back to its own default, so a source may override just one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    #[serde(default = "default_opening", with = "hhmm")]
    pub opening: NaiveTime,
    #[serde(default = "default_closing", with = "hhmm")]
    pub closing: NaiveTime,
    #[serde(default = "default_break_start", with = "hhmm")]
    pub break_start: NaiveTime,
    #[serde(default = "default_break_end", with = "hhmm")]
    pub break_end: NaiveTime,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            opening: default_opening(),
            closing: default_closing(),
            break_start: default_break_start(),
            break_end: default_break_end(),
        }
    }
}

fn default_opening() -> NaiveTime {
    hm(9, 0)
}

fn default_closing() -> NaiveTime {
    hm(20, 0)
}

fn default_break_start() -> NaiveTime {
    hm(13, 0)
}

fn default_break_end() -> NaiveTime {
    hm(16, 0)
}

impl BusinessHours {
    pub fn is_well_formed(&self) -> bool {
        self.opening <= self.break_start
            && self.break_start < self.break_end
            && self.break_end <= self.closing
    }

    /// Checks a slot against "not in the past", opening hours and the break.
    ///
    /// Pure: the caller supplies `now`.
    pub fn validate(&self, slot: &Slot, now: NaiveDateTime) -> Result<()> {
        if slot.start <= now {
            return Err(BookingError::PastBooking);
        }

        let start = slot.start.time();
        let end = slot.end.time();
        let out_of_hours = slot.start.date() != slot.end.date()
            || start < self.opening
            || end > self.closing;
        if out_of_hours {
            return Err(BookingError::OutOfHours {
                opening: self.opening,
                closing: self.closing,
            });
        }

        if start < self.break_end && end > self.break_start {
            return Err(BookingError::BreakConflict {
                start: self.break_start,
                end: self.break_end,
            });
        }

        Ok(())
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Serde support for "HH:MM" wall-clock times (seconds are accepted on input).
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn parse(value: &str) -> Option<NaiveTime> {
        let value = value.trim();
        NaiveTime::parse_from_str(value, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid time of day: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 17)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn slot(hour: u32, minute: u32, minutes: u32) -> Slot {
        Slot::new(at(hour, minute), NonZeroU32::new(minutes).unwrap())
    }

    fn now() -> NaiveDateTime {
        at(0, 0) - Duration::days(1)
    }

    #[test]
    fn test_slot_end_is_start_plus_duration() {
        let s = slot(10, 0, 45);
        assert_eq!(s.end, at(10, 45));
    }

    #[test]
    fn test_overlap_is_half_open() {
        let a = slot(10, 0, 30);
        assert!(a.overlaps(&slot(10, 15, 30)));
        assert!(!a.overlaps(&slot(10, 30, 30)));
        assert!(!slot(10, 30, 30).overlaps(&a));
    }

    #[test]
    fn test_rejects_past_and_present() {
        let hours = BusinessHours::default();
        let s = slot(10, 0, 30);
        assert!(matches!(
            hours.validate(&s, at(10, 0)),
            Err(BookingError::PastBooking)
        ));
        assert!(matches!(
            hours.validate(&s, at(11, 0)),
            Err(BookingError::PastBooking)
        ));
        assert!(hours.validate(&s, at(9, 59)).is_ok());
    }

    #[test]
    fn test_rejects_outside_business_hours() {
        let hours = BusinessHours::default();
        assert!(matches!(
            hours.validate(&slot(8, 45, 30), now()),
            Err(BookingError::OutOfHours { .. })
        ));
        assert!(matches!(
            hours.validate(&slot(19, 45, 30), now()),
            Err(BookingError::OutOfHours { .. })
        ));
        assert!(hours.validate(&slot(19, 30, 30), now()).is_ok());
        assert!(hours.validate(&slot(9, 0, 30), now()).is_ok());
    }

    #[test]
    fn test_rejects_slot_crossing_midnight() {
        let hours = BusinessHours {
            opening: hm(0, 0),
            closing: hm(23, 59),
            break_start: hm(13, 0),
            break_end: hm(16, 0),
        };
        assert!(matches!(
            hours.validate(&slot(23, 50, 30), now()),
            Err(BookingError::OutOfHours { .. })
        ));
    }

    #[test]
    fn test_break_boundaries() {
        let hours = BusinessHours::default();
        assert!(matches!(
            hours.validate(&slot(12, 45, 30), now()),
            Err(BookingError::BreakConflict { .. })
        ));
        assert!(matches!(
            hours.validate(&slot(15, 45, 30), now()),
            Err(BookingError::BreakConflict { .. })
        ));
        // Ends exactly at the break start / starts exactly at the break end.
        assert!(hours.validate(&slot(12, 30, 30), now()).is_ok());
        assert!(hours.validate(&slot(16, 0, 30), now()).is_ok());
    }

    #[test]
    fn test_hhmm_parsing() {
        assert_eq!(hhmm::parse("09:30"), Some(hm(9, 30)));
        assert_eq!(hhmm::parse(" 16:00:00 "), Some(hm(16, 0)));
        assert_eq!(hhmm::parse("25:00"), None);
        assert_eq!(hhmm::parse("noon"), None);
    }

    #[test]
    fn test_default_hours_are_well_formed() {
        assert!(BusinessHours::default().is_well_formed());
        let inverted = BusinessHours {
            break_start: hm(16, 0),
            break_end: hm(13, 0),
            ..BusinessHours::default()
        };
        assert!(!inverted.is_well_formed());
    }
}
