use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::RawWarning;

/// Integration failure talking to the warnings feed. Never partial.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("feed returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed feed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[async_trait]
pub trait WarningFeed: Send + Sync {
    /// The full current snapshot, in feed order.
    async fn fetch_snapshot(&self) -> Result<Vec<RawWarning>, FetchError>;
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Value>,
}

pub fn parse_snapshot(body: &[u8]) -> Result<Vec<RawWarning>, FetchError> {
    let collection: FeatureCollection = serde_json::from_slice(body)?;
    let warnings = collection
        .features
        .into_iter()
        .map(RawWarning::from_feature)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(warnings)
}

/// HTTP client for the GeoJSON warnings feed.
pub struct FeedClient {
    http: reqwest::Client,
    url: String,
}

impl FeedClient {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        info!("Preparing to poll nautical warnings from {}", url);
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl WarningFeed for FeedClient {
    async fn fetch_snapshot(&self) -> Result<Vec<RawWarning>, FetchError> {
        let resp = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = resp.bytes().await?;
        let warnings = parse_snapshot(&body)?;
        debug!("Feed returned {} features", warnings.len());
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_stub;

    #[test]
    fn test_parse_snapshot_keeps_feed_order() {
        let body = br#"{
            "type": "FeatureCollection",
            "dataUpdatedTime": "2024-05-02T09:00:00Z",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [24.5, 60.1] },
                    "properties": {
                        "id": 20, "typeEn": "COASTAL", "number": 3,
                        "locationEn": "GULF OF FINLAND", "contentsEn": "Light unlit.",
                        "publishingTime": "2024-05-02T09:00:00Z"
                    }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "LineString", "coordinates": [[21.0, 63.0], [21.5, 63.2]] },
                    "properties": {
                        "id": 10, "typeEn": "NAVIGATIONAL WARNING",
                        "locationEn": "QUARK", "contentsEn": "Cable works.",
                        "creationTime": "2024-05-01T07:00:00Z",
                        "publishingTime": "2024-05-01T08:00:00Z"
                    }
                }
            ]
        }"#;

        let warnings = parse_snapshot(body).unwrap();
        let ids: Vec<i64> = warnings.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![20, 10]);
    }

    #[tokio::test]
    async fn test_fetch_snapshot_over_http() {
        let body = r#"{"type": "FeatureCollection", "features": [
            {"geometry": {"type": "Point", "coordinates": [24.5, 60.1]},
             "properties": {"id": 5, "publishingTime": "2024-05-02T09:00:00Z"}}
        ]}"#;
        let (base, request) = http_stub::respond_once("200 OK", body).await;
        let feed = FeedClient::new(&format!("{}/warnings/active", base), Duration::from_secs(5)).unwrap();

        let warnings = feed.fetch_snapshot().await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].id, 5);
        assert!(request.await.unwrap().starts_with("GET /warnings/active "));
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_fetch_failure() {
        let (base, _request) = http_stub::respond_once("503 Service Unavailable", "down").await;
        let feed = FeedClient::new(&base, Duration::from_secs(5)).unwrap();

        match feed.fetch_snapshot().await {
            Err(FetchError::Status { status, body }) => {
                assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "down");
            }
            other => panic!("expected status error, got {:?}", other.map(|w| w.len())),
        }
    }

    #[tokio::test]
    async fn test_unreachable_feed_is_a_transport_failure() {
        let feed = FeedClient::new(&http_stub::refused_url().await, Duration::from_secs(5)).unwrap();
        assert!(matches!(feed.fetch_snapshot().await, Err(FetchError::Transport(_))));
    }

    #[test]
    fn test_missing_features_is_a_fetch_failure() {
        let err = parse_snapshot(br#"{"type": "FeatureCollection"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)));
    }

    #[test]
    fn test_one_malformed_feature_fails_whole_snapshot() {
        let body = br#"{"features": [
            {"geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
             "properties": {"id": 1, "publishingTime": "2024-01-01T00:00:00Z"}},
            {"geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
             "properties": {"id": "not-a-number", "publishingTime": "2024-01-01T00:00:00Z"}}
        ]}"#;
        assert!(parse_snapshot(body).is_err());
    }
}
