//! One poll cycle: purge, fetch, filter, build, reconcile, notify, persist,
//! then retry undelivered records.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::area::AreaClassifier;
use super::document::{self, BuildError};
use crate::config::RetentionWindow;
use crate::db::WarningStore;
use crate::delivery::WarningDelivery;
use crate::feed::WarningFeed;
use crate::models::{RawWarning, WarningRecord};

/// Warnings of this type are meant for leisure boaters and are not forwarded.
pub const EXCLUDED_WARNING_TYPE: &str = "Navigational warnings for yachtsmen";

#[derive(Debug, Clone, Copy)]
pub struct CycleSettings {
    pub retention: RetentionWindow,
    /// Skip warnings whose document cannot be built instead of aborting the
    /// whole batch.
    pub skip_unbuildable: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PollReport {
    pub fetched: usize,
    pub filtered_out: usize,
    pub new_ids: Vec<i64>,
    pub expired_ids: Vec<i64>,
    pub skipped_ids: Vec<i64>,
    pub failed_deliveries: Vec<i64>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RetryReport {
    pub attempted: usize,
    pub still_failing: Vec<i64>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub purged: Option<u64>,
    pub poll: Option<PollReport>,
    pub retry: Option<RetryReport>,
}

/// Outcome of comparing the stored active set with the incoming snapshot.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Candidates not seen before under their id.
    pub new_items: Vec<WarningRecord>,
    /// Active records whose id is no longer in the feed.
    pub disappeared: Vec<WarningRecord>,
}

/// `incoming_ids` covers every warning that survived filtering, including
/// ones whose document could not be built, so a build failure never expires
/// a warning that is still in the feed.
pub fn reconcile(
    old_active: Vec<WarningRecord>,
    previously_expired: &HashSet<i64>,
    incoming_ids: &HashSet<i64>,
    candidates: Vec<WarningRecord>,
) -> Reconciliation {
    let old_ids: HashSet<i64> = old_active.iter().map(|r| r.id).collect();
    let mut seen = HashSet::new();

    let new_items = candidates
        .into_iter()
        .filter(|c| !old_ids.contains(&c.id))
        .filter(|c| {
            let reappeared = previously_expired.contains(&c.id);
            if reappeared {
                debug!("Warning {} is already expired, not re-adding it", c.id);
            }
            !reappeared
        })
        .filter(|c| seen.insert(c.id))
        .collect();

    let disappeared = old_active
        .into_iter()
        .filter(|r| !incoming_ids.contains(&r.id))
        .collect();

    Reconciliation {
        new_items,
        disappeared,
    }
}

fn is_target_audience(warning: &RawWarning) -> bool {
    let excluded = warning.type_en.trim() == EXCLUDED_WARNING_TYPE;
    if excluded {
        debug!("Skipping warning {} with type '{}'", warning.id, EXCLUDED_WARNING_TYPE);
    }
    !excluded
}

pub struct PollCycle {
    store: Arc<dyn WarningStore>,
    feed: Arc<dyn WarningFeed>,
    /// `None` when downstream delivery is disabled.
    delivery: Option<Arc<dyn WarningDelivery>>,
    classifier: Arc<AreaClassifier>,
    settings: CycleSettings,
}

impl PollCycle {
    pub fn new(
        store: Arc<dyn WarningStore>,
        feed: Arc<dyn WarningFeed>,
        delivery: Option<Arc<dyn WarningDelivery>>,
        classifier: Arc<AreaClassifier>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            store,
            feed,
            delivery,
            classifier,
            settings,
        }
    }

    /// Runs every step. A failing step is logged; the retry sweep runs even
    /// when polling failed.
    pub async fn run(&self, now: DateTime<Utc>) -> CycleReport {
        let purged = match self.purge_expired(now).await {
            Ok(n) => Some(n),
            Err(e) => {
                error!("Purging expired warnings failed: {:#}", e);
                None
            }
        };

        let poll = match self.poll_for_warnings(now).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Polling nautical warnings failed, no changes were stored: {:#}", e);
                None
            }
        };

        let retry = match self.retry_failed_deliveries(now).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Retrying failed deliveries failed: {:#}", e);
                None
            }
        };

        CycleReport {
            purged,
            poll,
            retry,
        }
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = self.settings.retention.cutoff(now);
        info!("Deleting warnings expired before {}", cutoff);
        let deleted = self.store.delete_expired_before(cutoff).await?;
        if deleted > 0 {
            info!("Deleted {} expired warnings", deleted);
        }
        Ok(deleted)
    }

    pub async fn poll_for_warnings(&self, now: DateTime<Utc>) -> Result<PollReport> {
        info!("Polling for nautical warnings");

        // Both reads happen before any write of this cycle.
        let old_active = self.store.find_active().await?;
        let previously_expired: HashSet<i64> =
            self.store.find_expired_ids().await?.into_iter().collect();
        info!("Got {} active warnings from DB", old_active.len());

        let snapshot = self
            .feed
            .fetch_snapshot()
            .await
            .context("fetching nautical warnings feed")?;
        let fetched = snapshot.len();
        let warnings: Vec<RawWarning> = snapshot.into_iter().filter(is_target_audience).collect();
        let filtered_out = fetched - warnings.len();
        info!("Polled {} warnings from feed, {} after filtering", fetched, warnings.len());

        let incoming_ids: HashSet<i64> = warnings.iter().map(|w| w.id).collect();
        let built = warnings
            .iter()
            .map(|w| (w.id, self.build_candidate(w, now)))
            .collect();
        let (candidates, mut skipped_ids) = self.settle(built, "new")?;

        let reconciliation = reconcile(old_active, &previously_expired, &incoming_ids, candidates);
        if !reconciliation.new_items.is_empty() {
            info!(
                "Got {} new warnings that were not yet in database",
                reconciliation.new_items.len()
            );
        }

        let expired_built = reconciliation
            .disappeared
            .into_iter()
            .map(|r| (r.id, self.expire_record(r, now)))
            .collect();
        let (expired, skipped_expired) = self.settle(expired_built, "expired")?;
        skipped_ids.extend(skipped_expired);
        if !expired.is_empty() {
            info!(
                "Got {} warnings that no longer exist in the feed, marking them expired",
                expired.len()
            );
        }

        let new_ids: Vec<i64> = reconciliation.new_items.iter().map(|r| r.id).collect();
        let expired_ids: Vec<i64> = expired.iter().map(|r| r.id).collect();

        let changed: Vec<WarningRecord> = reconciliation.new_items.into_iter().chain(expired).collect();
        let changed = self.notify(changed, now).await;
        let failed_deliveries = match self.delivery {
            Some(_) => changed
                .iter()
                .filter(|r| r.delivery_time.is_none())
                .map(|r| r.id)
                .collect(),
            None => Vec::new(),
        };

        self.store.save_all(&changed, now).await?;

        log_changed("new", &new_ids);
        log_changed("expired", &expired_ids);

        Ok(PollReport {
            fetched,
            filtered_out,
            new_ids,
            expired_ids,
            skipped_ids,
            failed_deliveries,
        })
    }

    pub async fn retry_failed_deliveries(&self, now: DateTime<Utc>) -> Result<RetryReport> {
        if self.delivery.is_none() {
            return Ok(RetryReport::default());
        }

        let failed = self.store.find_undelivered().await?;
        if failed.is_empty() {
            return Ok(RetryReport::default());
        }

        info!("Retrying {} failed warning deliveries", failed.len());
        let attempted = failed.len();
        let retried = self.notify(failed, now).await;
        self.store.save_all(&retried, now).await?;

        let still_failing: Vec<i64> = retried
            .iter()
            .filter(|r| r.delivery_time.is_none())
            .map(|r| r.id)
            .collect();
        info!(
            "Retried {} deliveries, {} still failing",
            attempted,
            still_failing.len()
        );

        Ok(RetryReport {
            attempted,
            still_failing,
        })
    }

    fn build_candidate(&self, warning: &RawWarning, now: DateTime<Utc>) -> Result<WarningRecord, BuildError> {
        let area = self.classifier.classify(&warning.geometry);
        let document = document::build(warning, area, now)?;
        Ok(WarningRecord::new(warning.id, warning.payload.to_string(), document, now))
    }

    fn expire_record(&self, record: WarningRecord, now: DateTime<Utc>) -> Result<WarningRecord, BuildError> {
        let warning = RawWarning::from_stored(&record.raw_payload).map_err(|source| {
            BuildError::StoredPayload {
                id: record.id,
                source,
            }
        })?;
        let area = self.classifier.classify(&warning.geometry);
        let document = document::build_expired(&warning, area, record.created_time, now)?;
        Ok(record.expire(document, now))
    }

    /// Applies the build-failure policy to per-item results: abort the batch,
    /// or drop the failed items and report their ids.
    fn settle(
        &self,
        results: Vec<(i64, Result<WarningRecord, BuildError>)>,
        kind: &str,
    ) -> Result<(Vec<WarningRecord>, Vec<i64>)> {
        let mut built = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(record) => built.push(record),
                Err(e) => {
                    error!(warning_id = id, "Cannot build {} warning document: {}", kind, e);
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() && !self.settings.skip_unbuildable {
            bail!(
                "{} {} warning document(s) could not be built ({:?}), aborting batch",
                failed.len(),
                kind,
                failed
            );
        }
        Ok((built, failed))
    }

    /// Delivers each record in turn. Returns the records with their delivery
    /// outcome applied, unchanged when delivery is disabled.
    async fn notify(&self, records: Vec<WarningRecord>, now: DateTime<Utc>) -> Vec<WarningRecord> {
        let Some(delivery) = &self.delivery else {
            if !records.is_empty() {
                debug!("Delivery disabled, not notifying {} warnings", records.len());
            }
            return records;
        };

        let mut delivered = Vec::with_capacity(records.len());
        for record in records {
            let outcome = delivery.deliver(&record).await;
            delivered.push(record.after_delivery(outcome, now));
        }
        delivered
    }
}

fn log_changed(kind: &str, ids: &[i64]) {
    if ids.is_empty() {
        return;
    }
    let ids = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
    info!("Processed {} warnings: {}", kind, ids);
}
