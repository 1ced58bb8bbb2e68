use crate::domain::appointment::AppointmentStatus;
use chrono::NaiveTime;
use std::fmt;
use thiserror::Error;

/// Entities that a lookup can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Shop,
    Professional,
    Service,
    User,
    Appointment,
    Payment,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Shop => "shop",
            Entity::Professional => "professional",
            Entity::Service => "service",
            Entity::User => "user",
            Entity::Appointment => "appointment",
            Entity::Payment => "payment",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("professional or service does not belong to the requested shop")]
    CrossTenantMismatch,
    #[error("cannot book a slot that starts in the past")]
    PastBooking,
    #[error("slot is outside business hours ({opening} - {closing})")]
    OutOfHours { opening: NaiveTime, closing: NaiveTime },
    #[error("slot overlaps the break ({start} - {end})")]
    BreakConflict { start: NaiveTime, end: NaiveTime },
    #[error("professional already has an appointment in that slot")]
    DoubleBooked,
    #[error("invalid appointment status: {0}")]
    InvalidStatus(String),
    #[error("cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("not authorized")]
    Unauthorized,
    #[error("appointment is cancelled")]
    AppointmentCancelled,
    #[error("shop does not accept online payments")]
    PaymentsDisabled,
    #[error("appointment is already paid")]
    PaymentAlreadyApproved,
    #[error("appointment already has a pending payment")]
    PaymentAlreadyPending,
    #[error("payment gateway error: {0}")]
    Gateway(String),
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("amount must be positive, got {0}")]
    InvalidAmount(rust_decimal::Decimal),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl BookingError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into().into())
    }

    /// Whether the failure is transient and the caller may try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::InternalError(_)
                | BookingError::IoError(_)
                | BookingError::GatewayUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(e: serde_json::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for BookingError {
    fn from(e: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}

pub type Result<T, E = BookingError> = std::result::Result<T, E>;
