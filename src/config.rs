use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Months, Utc};
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_FEED_URL: &str =
    "https://meri.digitraffic.fi/api/nautical-warning/v1/warnings/active";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed_url: String,
    pub poller_enabled: bool,
    pub poll_frequency_secs: u64,
    pub poll_initial_delay_secs: u64,
    pub delivery_enabled: bool,
    pub delivery_url: String,
    pub delivery_user: String,
    pub delivery_password: String,
    pub request_timeout_secs: u64,
    pub retention: RetentionWindow,
    pub sea_areas_path: Option<String>,
    pub skip_unbuildable: bool,
    pub database_url: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let feed_url = env::var("NW_FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());
        let poller_enabled = env_flag("NW_POLLER_ENABLED", true);
        let poll_frequency_secs = env_number("NW_POLL_FREQUENCY_SECS", 300);
        let poll_initial_delay_secs = env_number("NW_POLL_INITIAL_DELAY_SECS", 10);

        let delivery_enabled = env_flag("NW_DELIVERY_ENABLED", false);
        let delivery_url = env::var("NW_DELIVERY_URL").unwrap_or_default();
        let delivery_user = env::var("NW_DELIVERY_USER").unwrap_or_default();
        let delivery_password = env::var("NW_DELIVERY_PASSWORD").unwrap_or_default();
        let request_timeout_secs = env_number("NW_REQUEST_TIMEOUT_SECS", 60);

        let retention = env::var("NW_RETENTION")
            .unwrap_or_else(|_| "1M".to_string())
            .parse::<RetentionWindow>()?;
        let sea_areas_path = env::var("NW_SEA_AREAS_PATH").ok().filter(|p| !p.is_empty());
        let skip_unbuildable = env_flag("NW_SKIP_UNBUILDABLE", false);

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let db_name = env::var("DB_DATABASE").unwrap_or_else(|_| "nautical_warnings".to_string());
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "warnings".to_string());
        let db_pwd = env::var("DB_PWD").unwrap_or_else(|_| "warnings".to_string());

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let config = Self {
            feed_url,
            poller_enabled,
            poll_frequency_secs,
            poll_initial_delay_secs,
            delivery_enabled,
            delivery_url,
            delivery_user,
            delivery_password,
            request_timeout_secs,
            retention,
            sea_areas_path,
            skip_unbuildable,
            database_url,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.delivery_enabled && self.delivery_url.trim().is_empty() {
            bail!("NW_DELIVERY_ENABLED is set but NW_DELIVERY_URL is empty");
        }
        if self.poll_frequency_secs == 0 {
            bail!("NW_POLL_FREQUENCY_SECS must be greater than zero");
        }
        Ok(())
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_number(key: &str, default: u64) -> u64 {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}

/// How long an expired warning is kept before it is purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionWindow {
    Months(u32),
    Days(i64),
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid retention window '{0}', expected e.g. '1M' (months) or '30d' (days)")]
pub struct RetentionParseError(String);

impl RetentionWindow {
    /// Records expired strictly before the returned instant are purged.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            RetentionWindow::Months(m) => now
                .checked_sub_months(Months::new(m))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            RetentionWindow::Days(d) => now - Duration::days(d),
        }
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        RetentionWindow::Months(1)
    }
}

impl FromStr for RetentionWindow {
    type Err = RetentionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || RetentionParseError(s.to_string());
        let split = s.len().checked_sub(1).ok_or_else(err)?;
        if !s.is_char_boundary(split) {
            return Err(err());
        }
        let (amount, unit) = s.split_at(split);
        match unit {
            "M" => amount.parse().map(RetentionWindow::Months).map_err(|_| err()),
            "d" | "D" => amount
                .parse::<i64>()
                .ok()
                .filter(|d| *d >= 0)
                .map(RetentionWindow::Days)
                .ok_or_else(err),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for RetentionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionWindow::Months(m) => write!(f, "{} month(s)", m),
            RetentionWindow::Days(d) => write!(f, "{} day(s)", d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_retention_parse() {
        assert_eq!("1M".parse(), Ok(RetentionWindow::Months(1)));
        assert_eq!(" 30d ".parse(), Ok(RetentionWindow::Days(30)));
        assert!("".parse::<RetentionWindow>().is_err());
        assert!("M".parse::<RetentionWindow>().is_err());
        assert!("-3d".parse::<RetentionWindow>().is_err());
        assert!("2w".parse::<RetentionWindow>().is_err());
        assert!("1é".parse::<RetentionWindow>().is_err());
    }

    #[test]
    fn test_month_cutoff_is_calendar_based() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 6, 0, 0).unwrap();
        assert_eq!(
            RetentionWindow::Months(1).cutoff(now),
            Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap()
        );
        assert_eq!(
            RetentionWindow::Days(30).cutoff(now),
            Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
