//! In-memory `WarningStore` with the same upsert rules as the Postgres one.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::WarningStore;
use crate::models::WarningRecord;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<i64, WarningRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: WarningRecord) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    pub fn get(&self, id: i64) -> Option<WarningRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<WarningRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    fn select(&self, keep: impl Fn(&WarningRecord) -> bool) -> Vec<WarningRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl WarningStore for MemoryStore {
    async fn save_all(&self, records: &[WarningRecord], now: DateTime<Utc>) -> Result<()> {
        let mut stored = self.records.lock().unwrap();
        for record in records {
            match stored.get_mut(&record.id) {
                Some(existing) => {
                    existing.raw_payload = record.raw_payload.clone();
                    existing.document = record.document.clone();
                    existing.updated_time = Some(now);
                    existing.expired_time = existing.expired_time.or(record.expired_time);
                    existing.delivery_time = record.delivery_time;
                }
                None => {
                    stored.insert(
                        record.id,
                        WarningRecord {
                            updated_time: None,
                            ..record.clone()
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn find_active(&self) -> Result<Vec<WarningRecord>> {
        Ok(self.select(|r| r.expired_time.is_none()))
    }

    async fn find_expired(&self) -> Result<Vec<WarningRecord>> {
        Ok(self.select(|r| r.expired_time.is_some()))
    }

    async fn find_expired_ids(&self) -> Result<Vec<i64>> {
        Ok(self.select(|r| r.expired_time.is_some()).iter().map(|r| r.id).collect())
    }

    async fn find_undelivered(&self) -> Result<Vec<WarningRecord>> {
        Ok(self.select(|r| r.delivery_time.is_none()))
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut stored = self.records.lock().unwrap();
        let before = stored.len();
        stored.retain(|_, r| !matches!(r.expired_time, Some(t) if t < cutoff));
        Ok((before - stored.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WarningStatus;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_upsert_keeps_created_and_expired_time() {
        let store = MemoryStore::new();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();

        let record = WarningRecord::new(1, "{}".into(), "a".into(), t1);
        store.save_all(&[record.clone()], t1).await.unwrap();

        let expired = record.clone().expire("b".into(), t2);
        store.save_all(&[expired], t2).await.unwrap();

        let reactivated = WarningRecord::new(1, "{}".into(), "c".into(), t2);
        store.save_all(&[reactivated], t2).await.unwrap();

        let stored = store.get(1).unwrap();
        assert_eq!(stored.created_time, t1);
        assert_eq!(stored.updated_time, Some(t2));
        assert_eq!(stored.expired_time, Some(t2));
        assert_eq!(stored.document, "c");
        assert!(store.find_by_status(WarningStatus::Active).await.unwrap().is_empty());
        assert_eq!(store.find_expired_ids().await.unwrap(), vec![1]);
    }
}
