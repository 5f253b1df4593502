use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::delivery::DeliveryOutcome;

/// A persisted warning, keyed by the feed's own id.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct WarningRecord {
    pub id: i64,
    pub raw_payload: String,
    pub document: String,
    pub created_time: DateTime<Utc>,
    pub updated_time: Option<DateTime<Utc>>,
    pub expired_time: Option<DateTime<Utc>>,
    pub delivery_time: Option<DateTime<Utc>>,
}

impl WarningRecord {
    pub fn new(id: i64, raw_payload: String, document: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            raw_payload,
            document,
            created_time: now,
            updated_time: None,
            expired_time: None,
            delivery_time: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.expired_time.is_none()
    }

    /// Marks the record expired with its expiry-variant document. The new
    /// content has not reached downstream yet, so delivery is reset.
    pub fn expire(self, document: String, now: DateTime<Utc>) -> Self {
        Self {
            document,
            expired_time: self.expired_time.or(Some(now)),
            delivery_time: None,
            ..self
        }
    }

    /// Record state after one delivery attempt: delivered only on success.
    pub fn after_delivery(&self, outcome: DeliveryOutcome, now: DateTime<Utc>) -> Self {
        let delivery_time = match outcome {
            DeliveryOutcome::Delivered => Some(now),
            DeliveryOutcome::Failed => None,
        };
        Self {
            delivery_time,
            ..self.clone()
        }
    }

    pub fn status(&self) -> WarningStatus {
        if self.is_active() {
            WarningStatus::Active
        } else {
            WarningStatus::Expired
        }
    }
}

/// Lifecycle filter accepted by the listing surface. Purged records are gone
/// and have no status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningStatus {
    Active,
    Expired,
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown warning status '{0}', allowed values are [active, expired]")]
pub struct StatusParseError(pub String);

impl WarningStatus {
    pub fn parse(value: &str) -> Result<Self, StatusParseError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(WarningStatus::Active),
            "expired" => Ok(WarningStatus::Expired),
            _ => Err(StatusParseError(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WarningStatus::Active => "active",
            WarningStatus::Expired => "expired",
        }
    }
}

impl FromStr for WarningStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WarningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_delivery_transition_returns_new_value() {
        let record = WarningRecord::new(1, "{}".into(), "<doc/>".into(), at(1));

        let delivered = record.after_delivery(DeliveryOutcome::Delivered, at(2));
        assert_eq!(delivered.delivery_time, Some(at(2)));
        assert_eq!(record.delivery_time, None);

        let failed = delivered.after_delivery(DeliveryOutcome::Failed, at(3));
        assert_eq!(failed.delivery_time, None);
        assert_eq!(delivered.delivery_time, Some(at(2)));
    }

    #[test]
    fn test_expire_is_set_once() {
        let record = WarningRecord::new(1, "{}".into(), "<doc/>".into(), at(1))
            .after_delivery(DeliveryOutcome::Delivered, at(1));

        let expired = record.expire("<expired/>".into(), at(2));
        assert_eq!(expired.expired_time, Some(at(2)));
        assert_eq!(expired.delivery_time, None);
        assert_eq!(expired.created_time, at(1));
        assert_eq!(expired.status(), WarningStatus::Expired);

        let again = expired.expire("<again/>".into(), at(3));
        assert_eq!(again.expired_time, Some(at(2)));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(WarningStatus::parse("active"), Ok(WarningStatus::Active));
        assert_eq!("EXPIRED".parse::<WarningStatus>(), Ok(WarningStatus::Expired));

        let err = WarningStatus::parse("deleted").unwrap_err();
        assert!(err.to_string().contains("allowed values are [active, expired]"));
        assert_eq!(err, StatusParseError("deleted".to_string()));
    }
}
