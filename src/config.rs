use crate::domain::schedule::BusinessHours;
use crate::error::{BookingError, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "SHOPBOOK";
const DEFAULT_SLOT_INTERVAL_MINUTES: u32 = 30;
const DEFAULT_CURRENCY: &str = "ARS";
const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 10_000;

/// Runtime settings for booking and payments.
///
/// Layered from built-in defaults, an optional TOML file, then `SHOPBOOK__*`
/// environment variables (e.g. `SHOPBOOK__PAYMENTS__BASE_URL`).
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    #[serde(default)]
    pub hours: BusinessHours,
    #[serde(default = "default_slot_interval")]
    pub slot_interval_minutes: u32,
    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Public origin used for back URLs and the webhook URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_ms: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            hours: BusinessHours::default(),
            slot_interval_minutes: default_slot_interval(),
            payments: PaymentsConfig::default(),
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            currency: default_currency(),
            gateway_timeout_ms: default_gateway_timeout(),
        }
    }
}

impl PaymentsConfig {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn webhook_url(&self) -> String {
        format!("{}/api/payments/webhook", self.base_url.trim_end_matches('/'))
    }

    pub fn return_url(&self, outcome: &str, appointment: &str) -> String {
        format!(
            "{}/payment-{outcome}?appointmentId={appointment}",
            self.base_url.trim_end_matches('/')
        )
    }
}

impl BookingConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::layered(path, environment())
    }

    fn layered(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: BookingConfig = builder
            .add_source(env)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.hours.is_well_formed() {
            return Err(BookingError::InvalidConfig(
                "hours must satisfy opening <= break_start < break_end <= closing".to_string(),
            ));
        }
        if self.slot_interval_minutes == 0 {
            return Err(BookingError::InvalidConfig(
                "slot_interval_minutes must be greater than 0".to_string(),
            ));
        }
        if self.payments.gateway_timeout_ms == 0 {
            return Err(BookingError::InvalidConfig(
                "payments.gateway_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__")
}

fn default_slot_interval() -> u32 {
    DEFAULT_SLOT_INTERVAL_MINUTES
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_gateway_timeout() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let config = BookingConfig::load(None).unwrap();
        assert_eq!(config.hours, BusinessHours::default());
        assert_eq!(config.slot_interval_minutes, 30);
        assert_eq!(config.payments.currency, "ARS");
        assert_eq!(config.payments.gateway_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "slot_interval_minutes = 15").unwrap();
        writeln!(file, "[hours]").unwrap();
        writeln!(file, "opening = \"08:00\"").unwrap();
        writeln!(file, "closing = \"18:30\"").unwrap();
        writeln!(file, "break_start = \"12:00\"").unwrap();
        writeln!(file, "break_end = \"13:00\"").unwrap();
        writeln!(file, "[payments]").unwrap();
        writeln!(file, "base_url = \"https://shop.example/\"").unwrap();

        let config = BookingConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.slot_interval_minutes, 15);
        assert_eq!(
            config.hours.closing,
            NaiveTime::from_hms_opt(18, 30, 0).unwrap()
        );
        assert_eq!(
            config.payments.webhook_url(),
            "https://shop.example/api/payments/webhook"
        );
    }

    #[test]
    fn test_file_may_set_a_single_hour() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[hours]").unwrap();
        writeln!(file, "closing = \"21:00\"").unwrap();

        let config = BookingConfig::load(Some(file.path())).unwrap();
        assert_eq!(
            config.hours,
            BusinessHours {
                closing: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
                ..BusinessHours::default()
            }
        );
    }

    #[test]
    fn test_environment_may_set_a_single_hour() {
        let vars = HashMap::from([(
            "SHOPBOOK__HOURS__CLOSING".to_string(),
            "21:00".to_string(),
        )]);

        let config = BookingConfig::layered(None, environment().source(Some(vars))).unwrap();
        assert_eq!(
            config.hours.closing,
            NaiveTime::from_hms_opt(21, 0, 0).unwrap()
        );
        assert_eq!(config.hours.opening, BusinessHours::default().opening);
        assert_eq!(config.hours.break_end, BusinessHours::default().break_end);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "slot_interval_minutes = 15").unwrap();
        let vars = HashMap::from([(
            "SHOPBOOK__SLOT_INTERVAL_MINUTES".to_string(),
            "20".to_string(),
        )]);

        let config =
            BookingConfig::layered(Some(file.path()), environment().source(Some(vars))).unwrap();
        assert_eq!(config.slot_interval_minutes, 20);
    }

    #[test]
    fn test_rejects_inverted_break() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[hours]").unwrap();
        writeln!(file, "opening = \"09:00\"").unwrap();
        writeln!(file, "closing = \"20:00\"").unwrap();
        writeln!(file, "break_start = \"16:00\"").unwrap();
        writeln!(file, "break_end = \"13:00\"").unwrap();

        assert!(matches!(
            BookingConfig::load(Some(file.path())),
            Err(BookingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_return_urls() {
        let payments = PaymentsConfig::default();
        assert_eq!(
            payments.return_url("success", "abc"),
            "http://localhost:8080/payment-success?appointmentId=abc"
        );
    }
}
