use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::models::WarningRecord;

const DOCUMENT_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}

/// Pushes rendered documents to the downstream authority. Failures are
/// reported as an outcome, never raised.
#[async_trait]
pub trait WarningDelivery: Send + Sync {
    async fn deliver(&self, record: &WarningRecord) -> DeliveryOutcome;
}

pub struct DeliveryClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

impl DeliveryClient {
    pub fn new(url: &str, username: &str, password: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        info!("Downstream delivery enabled, documents are sent to {}", url);
        Ok(Self {
            http,
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[async_trait]
impl WarningDelivery for DeliveryClient {
    async fn deliver(&self, record: &WarningRecord) -> DeliveryOutcome {
        info!("Sending {} document with warning id {}", record.status(), record.id);

        let started = Instant::now();
        let result = self
            .http
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, DOCUMENT_CONTENT_TYPE)
            .body(record.document.clone())
            .send()
            .await;

        let outcome = match result {
            Ok(resp) if resp.status().is_success() => DeliveryOutcome::Delivered,
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!(
                    warning_id = record.id,
                    "Downstream rejected document. Status: {}, response: {}", status, body
                );
                error!("Offending warning document:\n{}", record.document);
                DeliveryOutcome::Failed
            }
            Err(e) => {
                error!(warning_id = record.id, "Error connecting downstream: {}", e);
                error!("Offending warning document:\n{}", record.document);
                DeliveryOutcome::Failed
            }
        };

        info!(
            "Delivery of warning {} took {:.2}ms",
            record.id,
            started.elapsed().as_secs_f64() * 1000.0
        );
        outcome
    }
}
